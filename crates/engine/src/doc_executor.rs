// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The boundary to the out-of-process worker that actually executes a
//! document's plugins. The engine never runs plugin code itself — it
//! hands a document to a [`DocumentExecutor`] and streams back results.

use async_trait::async_trait;
use cep_core::{Document, WorkerResult};
use tokio::sync::mpsc;

/// Invokes the external worker for a document and streams its results.
///
/// Implementations own how the worker process or task is actually
/// started; the engine only consumes the returned channel.
#[async_trait]
pub trait DocumentExecutor: Send + Sync {
    async fn execute(&self, doc: &Document) -> mpsc::Receiver<WorkerResult>;

    /// Ask a running execution for `message_id` to stop. Returns whether a
    /// matching execution was found.
    async fn cancel(&self, message_id: &str) -> bool;
}
