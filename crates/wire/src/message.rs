// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw wire message as delivered by `get_messages`, before it is parsed
//! into a [`cep_core::Document`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SEND_COMMAND_PREFIX: &str = "aws.ssm.sendCommand";
pub const CANCEL_COMMAND_PREFIX: &str = "aws.ssm.cancelCommand";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub destination: String,
    pub message_id: String,
    pub created_date: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Message {
    /// Required-fields check the interactor runs before dispatch.
    pub fn has_required_fields(&self) -> bool {
        !self.topic.is_empty() && !self.destination.is_empty() && !self.message_id.is_empty()
    }

    pub fn is_send_command(&self) -> bool {
        self.topic.starts_with(SEND_COMMAND_PREFIX)
    }

    pub fn is_cancel_command(&self) -> bool {
        self.topic.starts_with(CANCEL_COMMAND_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(topic: &str) -> Message {
        Message {
            topic: topic.to_string(),
            destination: "i-abc".to_string(),
            message_id: "aws.ssm.11111111-1111-1111-1111-111111111111.i-abc".to_string(),
            created_date: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn recognizes_send_command_topic() {
        assert!(msg("aws.ssm.sendCommand.t").is_send_command());
        assert!(!msg("aws.ssm.sendCommand.t").is_cancel_command());
    }

    #[test]
    fn recognizes_cancel_command_topic() {
        assert!(msg("aws.ssm.cancelCommand.t").is_cancel_command());
    }

    #[test]
    fn missing_destination_fails_required_fields_check() {
        let mut m = msg("aws.ssm.sendCommand.t");
        m.destination.clear();
        assert!(!m.has_required_fields());
    }
}
