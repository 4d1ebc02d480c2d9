// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Smoke-test adapters for `cepd --demo`: a parser that builds a minimal
//! document straight from the wire message, and an executor that reports
//! immediate success without running any plugin. Neither defines real
//! plugin semantics — they exist only to drive the control plane
//! end-to-end against a [`cep_wire::test_support::FakeWireClient`].

use crate::docparse::{DocumentParser, ParseError};
use async_trait::async_trait;
use cep_core::{
    command_id_from_message_id, CancelInfo, Document, DocumentId, DocumentStatus, DocumentType, InstanceId, MessageId,
    PluginResult, ResultStatus, UpstreamService, WorkerResult,
};
use cep_engine::DocumentExecutor;
use cep_wire::Message;
use std::collections::HashMap;
use tokio::sync::mpsc;

pub struct PassthroughParser;

#[async_trait]
impl DocumentParser for PassthroughParser {
    async fn parse(&self, message: &Message) -> Result<Document, ParseError> {
        let message_id = MessageId::from(message.message_id.as_str());
        let command_id =
            command_id_from_message_id(&message_id).map_err(|e| ParseError::InvalidMessageId(e.to_string()))?;

        let doc_type = if message.is_cancel_command() {
            let target = message
                .payload
                .get("CancelMessageId")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ParseError::MalformedPayload("missing CancelMessageId".to_string()))?;
            DocumentType::CancelCommand { info: CancelInfo { target_message_id: MessageId::from(target), outcome: None } }
        } else if message.is_send_command() {
            DocumentType::SendCommand
        } else {
            return Err(ParseError::UnrecognizedTopic(message.topic.clone()));
        };

        Ok(Document {
            document_id: DocumentId::from(message.message_id.as_str()),
            command_id,
            message_id,
            destination: InstanceId::from(message.destination.as_str()),
            created_at: message.created_date,
            doc_type,
            upstream_service: UpstreamService::MessageDelivery,
            run_count: 0,
            status: DocumentStatus::Pending,
            plugins: Vec::new(),
        })
    }
}

pub struct EchoExecutor;

#[async_trait]
impl DocumentExecutor for EchoExecutor {
    async fn execute(&self, doc: &Document) -> mpsc::Receiver<WorkerResult> {
        let (tx, rx) = mpsc::channel(1);
        let message_id = doc.message_id.clone();
        tokio::spawn(async move {
            let mut plugin_results = HashMap::new();
            plugin_results.insert("demo:echo".to_string(), PluginResult { status: ResultStatus::Success, output: None, error: None });
            let _ = tx
                .send(WorkerResult {
                    message_id,
                    last_plugin: String::new(),
                    status: ResultStatus::Success,
                    plugin_results,
                    upstream_service: None,
                    result_type: None,
                })
                .await;
        });
        rx
    }

    async fn cancel(&self, _message_id: &str) -> bool {
        false
    }
}
