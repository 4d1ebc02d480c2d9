// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `WireClient` trait: long-poll, ack/fail, reply, and the
//! failed-reply spool, all object-safe so the interactor can hold one
//! behind an `Arc<dyn WireClient>`.

use crate::message::Message;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("not found: {0}")]
    NotFound(String),
}

/// Failure reason reported back to the upstream service via `fail_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    InternalHandlerException,
    InvalidMessage,
    UnsupportedCommand,
}

/// Abstracts the upstream message-delivery/message-gateway RPC surface.
#[async_trait]
pub trait WireClient: Send + Sync {
    /// Long-poll for new messages destined for `instance_id`. Returns the
    /// destination instance ID, the messages, and a request ID for tracing.
    async fn get_messages(&self, instance_id: &str) -> Result<(String, Vec<Message>, String), WireError>;

    async fn acknowledge_message(&self, message_id: &str) -> Result<(), WireError>;

    async fn fail_message(&self, message_id: &str, kind: FailKind) -> Result<(), WireError>;

    async fn send_reply(&self, message_id: &str, payload: serde_json::Value) -> Result<(), WireError>;

    /// Send a reply payload that was already fully built (e.g. replayed
    /// from the failed-reply spool).
    async fn send_reply_with_input(&self, payload: serde_json::Value) -> Result<(), WireError>;

    /// Filenames of spooled replies that previously failed to send.
    async fn load_failed_replies(&self) -> Result<Vec<String>, WireError>;

    async fn get_failed_reply(&self, name: &str) -> Result<serde_json::Value, WireError>;

    async fn delete_failed_reply(&self, name: &str) -> Result<(), WireError>;

    /// Signal any in-flight long-poll to return promptly.
    async fn stop(&self);
}
