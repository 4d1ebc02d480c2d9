// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory [`WireClient`] for interactor and wrapper tests.

use crate::client::{FailKind, WireClient, WireError};
use crate::message::Message;
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Default)]
pub struct FakeWireClient {
    pub pending_messages: Mutex<Vec<Message>>,
    pub acked: Mutex<Vec<String>>,
    pub failed: Mutex<Vec<(String, FailKind)>>,
    pub replies: Mutex<Vec<serde_json::Value>>,
    pub failed_replies: Mutex<Vec<(String, serde_json::Value)>>,
    pub stopped: Mutex<bool>,
}

impl FakeWireClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_message(&self, message: Message) {
        self.pending_messages.lock().push(message);
    }
}

#[async_trait]
impl WireClient for FakeWireClient {
    async fn get_messages(&self, instance_id: &str) -> Result<(String, Vec<Message>, String), WireError> {
        let messages = std::mem::take(&mut *self.pending_messages.lock());
        Ok((instance_id.to_string(), messages, "req-fake".to_string()))
    }

    async fn acknowledge_message(&self, message_id: &str) -> Result<(), WireError> {
        self.acked.lock().push(message_id.to_string());
        Ok(())
    }

    async fn fail_message(&self, message_id: &str, kind: FailKind) -> Result<(), WireError> {
        self.failed.lock().push((message_id.to_string(), kind));
        Ok(())
    }

    async fn send_reply(&self, _message_id: &str, payload: serde_json::Value) -> Result<(), WireError> {
        self.replies.lock().push(payload);
        Ok(())
    }

    async fn send_reply_with_input(&self, payload: serde_json::Value) -> Result<(), WireError> {
        self.replies.lock().push(payload);
        Ok(())
    }

    async fn load_failed_replies(&self) -> Result<Vec<String>, WireError> {
        Ok(self.failed_replies.lock().iter().map(|(name, _)| name.clone()).collect())
    }

    async fn get_failed_reply(&self, name: &str) -> Result<serde_json::Value, WireError> {
        self.failed_replies
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, payload)| payload.clone())
            .ok_or_else(|| WireError::NotFound(name.to_string()))
    }

    async fn delete_failed_reply(&self, name: &str) -> Result<(), WireError> {
        self.failed_replies.lock().retain(|(n, _)| n != name);
        Ok(())
    }

    async fn stop(&self) {
        *self.stopped.lock() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message {
            topic: "aws.ssm.sendCommand.t".to_string(),
            destination: "i-abc".to_string(),
            message_id: "aws.ssm.11111111-1111-1111-1111-111111111111.i-abc".to_string(),
            created_date: chrono::Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn get_messages_drains_the_pending_queue() {
        let client = FakeWireClient::new();
        client.push_message(message());
        let (_, messages, _) = client.get_messages("i-abc").await.unwrap();
        assert_eq!(messages.len(), 1);
        let (_, messages, _) = client.get_messages("i-abc").await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn acknowledge_and_fail_are_recorded() {
        let client = FakeWireClient::new();
        client.acknowledge_message("m1").await.unwrap();
        client.fail_message("m2", FailKind::InvalidMessage).await.unwrap();
        assert_eq!(client.acked.lock().as_slice(), ["m1".to_string()]);
        assert_eq!(client.failed.lock().len(), 1);
    }
}
