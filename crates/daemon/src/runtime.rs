// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembles the control plane from its pieces: store, ledger, the two
//! engine processors, their wrappers, the message handler, and the
//! command-side interactor. Generic over the three external collaborators
//! (`WireClient`, `DocumentParser`, `DocumentExecutor`) a host integration
//! supplies; this crate defines the wiring, not the adapters.

use crate::docparse::DocumentParser;
use crate::handler::MessageHandler;
use crate::interactor::{Interactor, InteractorHandles};
use cep_core::{Config, UpstreamService, WorkerResult};
use cep_engine::{DocumentExecutor, EngineProcessor, ProcessorWrapper, RetentionConfig, WorkerSpec, WrapperKind};
use cep_store::{DocStore, IdempotencyLedger, RetentionPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::info;

const REPLY_CHANNEL_CAPACITY: usize = 256;

/// Everything the daemon needs to run, plus the handles to stop it.
pub struct Daemon<W: cep_wire::WireClient + 'static, P: DocumentParser + 'static, E: DocumentExecutor + 'static> {
    pub handler: Arc<MessageHandler<E>>,
    pub interactor: Arc<Interactor<W, P, E>>,
    reply_rx: Option<mpsc::Receiver<WorkerResult>>,
    interactor_handles: Option<InteractorHandles>,
    idempotency_sweep: Option<tokio::task::JoinHandle<()>>,
    ledger: Arc<IdempotencyLedger>,
    config: Config,
}

/// Build the command and session engine processors and wrappers, the
/// message handler, and a command-side interactor bound to
/// `UpstreamService::MessageDelivery`. Spawns nothing until [`Daemon::start`]
/// is called.
///
/// The reply channel is registered with the handler *before* the processor
/// wrappers are initialized: `initialize_and_register_processor` snapshots
/// the handler's reply-channel map at init time, so registering late would
/// leave every wrapper fanning results into a channel nobody reads.
pub async fn build<W, P, E>(
    config: Config,
    wire: Arc<W>,
    command_parser: Arc<P>,
    command_executor: Arc<E>,
    session_executor: Arc<E>,
) -> Daemon<W, P, E>
where
    W: cep_wire::WireClient + 'static,
    P: DocumentParser + 'static,
    E: DocumentExecutor + 'static,
{
    let instance_root = config.instance_root();
    let doc_store = Arc::new(DocStore::new(&instance_root));
    let ledger = Arc::new(IdempotencyLedger::new(&instance_root));

    let command_processor = Arc::new(EngineProcessor::new(
        WorkerSpec { worker_limit: config.command_pool.worker_limit, buffer_limit: config.command_pool.buffer_limit },
        WorkerSpec { worker_limit: config.cancel_pool.worker_limit, buffer_limit: config.cancel_pool.buffer_limit },
        Arc::clone(&doc_store),
        command_executor,
    ));
    let session_processor = Arc::new(EngineProcessor::new(
        WorkerSpec { worker_limit: config.session_pool.worker_limit, buffer_limit: config.session_pool.buffer_limit },
        WorkerSpec {
            worker_limit: config.session_cancel_pool.worker_limit,
            buffer_limit: config.session_cancel_pool.buffer_limit,
        },
        Arc::clone(&doc_store),
        session_executor,
    ));

    let retention = RetentionConfig {
        orchestration_root: instance_root.join("orchestration"),
        policy: RetentionPolicy {
            command_retention: config.command_retention,
            association_retention: config.association_retention,
            session_retention: config.session_retention,
        },
    };

    let command_wrapper = Arc::new(ProcessorWrapper::new(
        WrapperKind::Command,
        command_processor,
        Arc::clone(&ledger),
        config.command_retry_limit,
        None,
        Some(retention.clone()),
    ));
    let session_wrapper = Arc::new(ProcessorWrapper::new(
        WrapperKind::Session,
        session_processor,
        Arc::clone(&ledger),
        config.command_retry_limit,
        None,
        Some(retention),
    ));

    let handler = Arc::new(MessageHandler::new());
    let interactor = Interactor::new(wire, command_parser, Arc::clone(&handler), config.clone(), UpstreamService::MessageDelivery);

    let (tx, rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);
    handler.register_reply(interactor.service(), tx);

    handler.initialize_and_register_processor("command", command_wrapper).await;
    handler.initialize_and_register_processor("session", session_wrapper).await;

    Daemon { handler, interactor, reply_rx: Some(rx), interactor_handles: None, idempotency_sweep: None, ledger, config }
}

impl<W: cep_wire::WireClient + 'static, P: DocumentParser + 'static, E: DocumentExecutor + 'static> Daemon<W, P, E> {
    /// Spawn the interactor's poll, reply, and failed-reply loops, plus the
    /// periodic idempotency sweep.
    pub fn start(&mut self) {
        let rx = self.reply_rx.take().expect("start called more than once");
        self.interactor_handles = Some(self.interactor.spawn(rx));

        let ledger = Arc::clone(&self.ledger);
        let ttl = self.config.idempotency_ttl;
        let frequency = self.config.idempotency_sweep_frequency;
        self.idempotency_sweep = Some(tokio::spawn(async move {
            let mut ticker = interval(frequency);
            loop {
                ticker.tick().await;
                let removed = ledger.sweep(ttl);
                if removed > 0 {
                    info!(removed, "swept expired idempotency markers");
                }
            }
        }));
    }

    /// Stop the interactor, the idempotency sweeper, and every registered
    /// processor wrapper, in that order.
    pub async fn shutdown(mut self, stop_timeout: Duration) {
        if let Some(handles) = self.interactor_handles.take() {
            self.interactor.pre_processor_close(handles).await;
        }
        if let Some(sweep) = self.idempotency_sweep.take() {
            sweep.abort();
        }
        self.handler.stop(stop_timeout).await;
    }
}
