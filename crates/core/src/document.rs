// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The document: the unit of work that flows from the wire through the
//! interactor, message handler, and engine processor to a worker.

use crate::ids::{AssociationId, CommandId, DocumentId, InstanceId, JobId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// `aws.ssm.<uuid>.<instance>` — command-ID is the second-to-last segment.
fn message_id_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(
            r"^aws\.ssm\.[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\.\S+$",
        )
        .expect("static message-id pattern is valid")
    })
}

/// Error parsing a raw wire message ID into its command-ID component.
#[derive(Debug, Clone, thiserror::Error)]
#[error("message id does not match the aws.ssm.<uuid>.<instance> grammar: {0:?}")]
pub struct InvalidMessageId(pub String);

/// Extract the command ID from a message ID of the form
/// `aws.ssm.<uuid>.<instance>`. The command ID is the second-to-last
/// dot-separated segment (the uuid).
pub fn command_id_from_message_id(message_id: &MessageId) -> Result<CommandId, InvalidMessageId> {
    if !message_id_pattern().is_match(message_id.as_str()) {
        return Err(InvalidMessageId(message_id.as_str().to_string()));
    }
    let segments: Vec<&str> = message_id.as_str().split('.').collect();
    let command = segments
        .len()
        .checked_sub(2)
        .and_then(|idx| segments.get(idx))
        .ok_or_else(|| InvalidMessageId(message_id.as_str().to_string()))?;
    Ok(CommandId::new(*command))
}

/// Which upstream service a document or result is associated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamService {
    MessageDelivery,
    MessageGateway,
}

crate::simple_display! {
    UpstreamService {
        MessageDelivery => "message_delivery",
        MessageGateway => "message_gateway",
    }
}

/// Document type, tagged by content. Carries cancel-specific data inline
/// for `CancelCommand` rather than a separate optional field, since it is
/// the only type that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DocumentType {
    SendCommand,
    CancelCommand { info: CancelInfo },
    StartSession,
    TerminateSession,
    Association { association_id: AssociationId },
}

impl DocumentType {
    pub fn is_cancel(&self) -> bool {
        matches!(self, DocumentType::CancelCommand { .. })
    }

    pub fn is_session(&self) -> bool {
        matches!(self, DocumentType::StartSession | DocumentType::TerminateSession)
    }

    pub fn is_association(&self) -> bool {
        matches!(self, DocumentType::Association { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DocumentType::SendCommand => "send_command",
            DocumentType::CancelCommand { .. } => "cancel_command",
            DocumentType::StartSession => "start_session",
            DocumentType::TerminateSession => "terminate_session",
            DocumentType::Association { .. } => "association",
        }
    }
}

/// Cancel-specific payload carried by `CancelCommand` documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInfo {
    /// Message ID of the document to cancel.
    pub target_message_id: MessageId,
    /// Populated once the cancel has been attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

/// Opaque plugin step as parsed from the document payload by the
/// out-of-process document parser (out of scope here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStep {
    pub name: String,
    pub payload: serde_json::Value,
}

/// Lifecycle status of a document as tracked by the engine processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

crate::simple_display! {
    DocumentStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Success => "success",
        Failed => "failed",
    }
}

/// A unit of work parsed from a validated upstream message.
///
/// Immutable once created except for `run_count` and `status`, which the
/// engine processor updates across resubmissions and terminal transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: DocumentId,
    pub command_id: CommandId,
    pub message_id: MessageId,
    pub destination: InstanceId,
    pub created_at: DateTime<Utc>,
    pub doc_type: DocumentType,
    pub upstream_service: UpstreamService,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default = "default_status")]
    pub status: DocumentStatus,
    pub plugins: Vec<PluginStep>,
}

fn default_status() -> DocumentStatus {
    DocumentStatus::Pending
}

impl Document {
    /// The duplicate-detection key inside a job pool: the message-ID for
    /// non-association documents, the association-ID otherwise.
    pub fn job_id(&self) -> JobId {
        match &self.doc_type {
            DocumentType::Association { association_id } => association_id.into(),
            _ => (&self.message_id).into(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}
