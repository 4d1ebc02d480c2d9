// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Processor wrapper: the command/session-specific shell around an
//! [`EngineProcessor`] — idempotency gating on the way in, reply fan-out
//! and routing on the way out.

use crate::doc_executor::DocumentExecutor;
use crate::processor::{EngineProcessor, ProcessorError};
use async_trait::async_trait;
use cep_core::{CommandId, Document, DocumentType, ResultType, UpstreamService, WorkerResult};
use cep_store::{retention, IdempotencyLedger, RetentionKind, RetentionPolicy};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing::{debug, error, warn};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WrapperError {
    #[error("duplicate command")]
    DuplicateCommand,
    #[error("unsupported document type")]
    UnsupportedDocType,
    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    Command,
    Session,
}

impl WrapperKind {
    fn start_kinds(self) -> &'static [&'static str] {
        match self {
            WrapperKind::Command => &["send_command", "association"],
            WrapperKind::Session => &["start_session"],
        }
    }

    fn cancel_kinds(self) -> &'static [&'static str] {
        match self {
            WrapperKind::Command => &["cancel_command"],
            WrapperKind::Session => &["terminate_session"],
        }
    }

    fn result_type(self) -> ResultType {
        match self {
            WrapperKind::Command => ResultType::RunCommand,
            WrapperKind::Session => ResultType::Session,
        }
    }
}

/// Invoked by the command wrapper's reply fan-out when a result's plugin
/// results mention a refresh-association plugin. Kept abstract: the
/// concrete association sub-processor lives with the daemon wiring.
#[async_trait]
pub trait AssociationRefresher: Send + Sync {
    async fn refresh(&self, message_id: &str);
}

const REFRESH_ASSOCIATION_PLUGIN: &str = "aws:refreshAssociation";

/// Where and on what schedule a wrapper's terminal-result sweep runs.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub orchestration_root: PathBuf,
    pub policy: RetentionPolicy,
}

pub struct ProcessorWrapper<E: DocumentExecutor + 'static> {
    kind: WrapperKind,
    processor: Arc<EngineProcessor<E>>,
    ledger: Arc<IdempotencyLedger>,
    retry_limit: u32,
    output_channels: AsyncMutex<HashMap<UpstreamService, mpsc::Sender<WorkerResult>>>,
    reply_done: AsyncMutex<Option<oneshot::Receiver<()>>>,
    association_refresher: Option<Arc<dyn AssociationRefresher>>,
    retention: Option<RetentionConfig>,
}

impl<E: DocumentExecutor + 'static> ProcessorWrapper<E> {
    pub fn new(
        kind: WrapperKind,
        processor: Arc<EngineProcessor<E>>,
        ledger: Arc<IdempotencyLedger>,
        retry_limit: u32,
        association_refresher: Option<Arc<dyn AssociationRefresher>>,
        retention: Option<RetentionConfig>,
    ) -> Self {
        Self {
            kind,
            processor,
            ledger,
            retry_limit,
            output_channels: AsyncMutex::new(HashMap::new()),
            reply_done: AsyncMutex::new(None),
            association_refresher,
            retention,
        }
    }

    pub fn start_kinds(&self) -> &'static [&'static str] {
        self.kind.start_kinds()
    }

    pub fn cancel_kinds(&self) -> &'static [&'static str] {
        self.kind.cancel_kinds()
    }

    /// Admit a document: idempotency check, dispatch to the processor,
    /// then record the ledger entry on success.
    pub async fn push_to_processor(&self, doc: Document) -> Result<(), WrapperError> {
        let kind = doc.doc_type.kind();
        if self.ledger.exists(kind, &doc.command_id) {
            return Err(WrapperError::DuplicateCommand);
        }

        if self.start_kinds().contains(&kind) {
            self.processor.submit(doc.clone()).await?;
        } else if self.cancel_kinds().contains(&kind) {
            self.processor.cancel(doc.clone()).await?;
        } else {
            return Err(WrapperError::UnsupportedDocType);
        }

        let command_id: CommandId = doc.command_id.clone();
        if let Err(e) = self.ledger.create(kind, &command_id) {
            warn!(command_id = %command_id, error = %e, "failed to record idempotency ledger entry");
        }
        Ok(())
    }

    /// Start the underlying processor, spawn the reply fan-out task, and
    /// resume in-progress/pending documents.
    pub async fn initialize(
        self: &Arc<Self>,
        output_channels: HashMap<UpstreamService, mpsc::Sender<WorkerResult>>,
    ) {
        *self.output_channels.lock().await = output_channels;

        let results = self.processor.start().await;
        let (done_tx, done_rx) = oneshot::channel();
        *self.reply_done.lock().await = Some(done_rx);

        let wrapper = Arc::clone(self);
        tokio::spawn(async move { wrapper.run_reply_fanout(results, done_tx).await });

        let skip_expired = matches!(self.kind, WrapperKind::Command);
        let own_start_kinds = self.start_kinds();
        let own_cancel_kinds = self.cancel_kinds();
        self.processor
            .initial_processing(skip_expired, self.retry_limit, |doc| {
                let k = doc.doc_type.kind();
                own_start_kinds.contains(&k) || own_cancel_kinds.contains(&k)
            })
            .await;
    }

    async fn run_reply_fanout(self: Arc<Self>, mut results: mpsc::Receiver<WorkerResult>, done_tx: oneshot::Sender<()>) {
        loop {
            let outcome =
                futures::FutureExt::catch_unwind(std::panic::AssertUnwindSafe(self.reply_fanout_loop(&mut results)))
                    .await;
            if outcome.is_ok() {
                break;
            }
            error!("reply fan-out task panicked, restarting in 5s");
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        let _ = done_tx.send(());
    }

    async fn reply_fanout_loop(&self, results: &mut mpsc::Receiver<WorkerResult>) {
        while let Some(mut result) = results.recv().await {
            result.result_type = Some(self.kind.result_type());

            if self.kind == WrapperKind::Session && result.is_suppressible_for_session() {
                continue;
            }

            if let Some(refresher) = &self.association_refresher {
                if result.plugin_results.keys().any(|name| name == REFRESH_ASSOCIATION_PLUGIN) {
                    refresher.refresh(result.message_id.as_str()).await;
                }
            }

            let channels = self.output_channels.lock().await;
            let target = match self.kind {
                WrapperKind::Session => channels.get(&UpstreamService::MessageGateway),
                WrapperKind::Command => result
                    .upstream_service
                    .and_then(|svc| channels.get(&svc))
                    .or_else(|| channels.get(&UpstreamService::MessageDelivery)),
            };

            match target {
                Some(tx) => {
                    if tx.send(result.clone()).await.is_err() {
                        warn!(message_id = %result.message_id, "reply channel closed");
                    }
                }
                None => error!(message_id = %result.message_id, "no reply channel registered for result"),
            }

            if result.is_terminal() {
                self.spawn_retention_sweep();
            }
        }
    }

    /// Spawn a background sweep of the `orchestration/` tree for every
    /// retention kind this wrapper is responsible for. A command wrapper
    /// also owns association run directories; a session wrapper sweeps
    /// only session directories.
    fn spawn_retention_sweep(&self) {
        let Some(retention) = &self.retention else { return };
        let kinds: &[RetentionKind] = match self.kind {
            WrapperKind::Command => &[RetentionKind::Command, RetentionKind::Association],
            WrapperKind::Session => &[RetentionKind::Session],
        };
        for &kind in kinds {
            let root = retention.orchestration_root.clone();
            let policy = retention.policy;
            tokio::spawn(async move {
                let removed = retention::sweep(&root, kind, policy);
                if removed > 0 {
                    debug!(removed, ?kind, "swept orchestration directories");
                }
            });
        }
    }

    /// Stop the processor, wait up to two seconds for the reply task to
    /// signal exit, then drop this wrapper's reply-channel senders so the
    /// interactor reading them can observe closure.
    pub async fn stop(&self, stop_timeout: Duration) {
        self.processor.stop(stop_timeout).await;
        if let Some(done_rx) = self.reply_done.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(2), done_rx).await;
        }
        self.output_channels.lock().await.clear();
    }
}
