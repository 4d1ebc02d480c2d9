// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine processor: two job pools (start-type, cancel-type) driving
//! documents through the out-of-process [`DocumentExecutor`] and fanning
//! results into a single channel.

use crate::doc_executor::DocumentExecutor;
use cep_core::{Document, DocumentStatus, ResultStatus, WorkerResult};
use cep_pool::{CancelFlag, JobPool, PoolError};
use cep_store::{DocStore, Folder};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{error, warn};

/// Sizing for one of the processor's two job pools.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSpec {
    pub worker_limit: usize,
    pub buffer_limit: usize,
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ProcessorError {
    #[error("document ID is invalid")]
    InvalidDocumentId,
    #[error("duplicate command")]
    DuplicateCommand,
    #[error("command buffer is full")]
    CommandBufferFull,
    #[error("processor is closed")]
    ClosedProcessor,
    #[error("failed converting pool error code")]
    ConversionFailed,
    #[error("panic during submission")]
    SubmissionPanic,
}

impl From<PoolError> for ProcessorError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::InvalidJobId => ProcessorError::InvalidDocumentId,
            PoolError::DuplicateCommand => ProcessorError::DuplicateCommand,
            PoolError::JobQueueFull => ProcessorError::CommandBufferFull,
            PoolError::Closed => ProcessorError::ClosedProcessor,
        }
    }
}

/// Drives documents through start- and cancel-type job pools, publishing
/// every [`WorkerResult`] onto a single fan-in channel.
pub struct EngineProcessor<E: DocumentExecutor + 'static> {
    start_pool: Arc<JobPool>,
    cancel_pool: Arc<JobPool>,
    start_spec: WorkerSpec,
    cancel_spec: WorkerSpec,
    doc_store: Arc<DocStore>,
    executor: Arc<E>,
    stopped: Arc<AtomicBool>,
    result_tx: AsyncMutex<Option<mpsc::Sender<WorkerResult>>>,
}

impl<E: DocumentExecutor + 'static> EngineProcessor<E> {
    pub fn new(
        start_spec: WorkerSpec,
        cancel_spec: WorkerSpec,
        doc_store: Arc<DocStore>,
        executor: Arc<E>,
    ) -> Self {
        Self {
            start_pool: Arc::new(JobPool::new(start_spec.worker_limit, start_spec.buffer_limit)),
            cancel_pool: Arc::new(JobPool::new(cancel_spec.worker_limit, cancel_spec.buffer_limit)),
            start_spec,
            cancel_spec,
            doc_store,
            executor,
            stopped: Arc::new(AtomicBool::new(false)),
            result_tx: AsyncMutex::new(None),
        }
    }

    /// Returns the single channel every worker result will be published
    /// onto. Performs no I/O.
    pub async fn start(&self) -> mpsc::Receiver<WorkerResult> {
        let (tx, rx) = mpsc::channel(256);
        *self.result_tx.lock().await = Some(tx);
        rx
    }

    /// Scan `current` then `pending` for documents matching `predicate`
    /// and resubmit each. Documents from `current` get their run-count
    /// bumped and are written back before the pool call. A
    /// `CommandBufferFull` response retries the same document every
    /// second, indefinitely; any other error skips it.
    pub async fn initial_processing(
        &self,
        skip_expired: bool,
        retry_limit: u32,
        predicate: impl Fn(&Document) -> bool,
    ) {
        let now = chrono::Utc::now();

        for doc_id in self.doc_store.list(Folder::Current) {
            let Ok(Some(mut doc)) = self.doc_store.get(Folder::Current, &doc_id) else { continue };
            if !predicate(&doc) {
                continue;
            }
            if doc.run_count >= retry_limit {
                let _ = self.doc_store.move_doc(&doc_id, Folder::Current, Folder::Corrupt);
                continue;
            }
            if skip_expired && doc.age(now).num_hours() >= 48 {
                let _ = self.doc_store.move_doc(&doc_id, Folder::Current, Folder::Corrupt);
                continue;
            }
            doc.run_count += 1;
            doc.status = DocumentStatus::InProgress;
            if self.doc_store.persist(Folder::Current, &doc).is_err() {
                continue;
            }
            self.resubmit_until_accepted(doc).await;
        }

        for doc_id in self.doc_store.list(Folder::Pending) {
            let Ok(Some(doc)) = self.doc_store.get(Folder::Pending, &doc_id) else { continue };
            if !predicate(&doc) {
                continue;
            }
            self.resubmit_until_accepted(doc).await;
        }
    }

    async fn resubmit_until_accepted(&self, doc: Document) {
        loop {
            let result = if doc.doc_type.is_cancel() {
                self.cancel_inner(doc.clone(), true).await
            } else {
                self.submit_inner(doc.clone(), true).await
            };
            match result {
                Err(ProcessorError::CommandBufferFull) => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                _ => return,
            }
        }
    }

    /// Admit a start-type document.
    pub async fn submit(&self, doc: Document) -> Result<(), ProcessorError> {
        self.submit_inner(doc, false).await
    }

    /// Admit a cancel-type document.
    pub async fn cancel(&self, doc: Document) -> Result<(), ProcessorError> {
        self.cancel_inner(doc, false).await
    }

    async fn submit_inner(&self, doc: Document, already_in_progress: bool) -> Result<(), ProcessorError> {
        self.admit(&self.start_pool, self.start_spec, doc, already_in_progress, |doc_store, executor, tx, doc| {
            run_command_worker(doc_store, executor, tx, doc)
        })
        .await
    }

    async fn cancel_inner(&self, doc: Document, already_in_progress: bool) -> Result<(), ProcessorError> {
        let start_pool = Arc::clone(&self.start_pool);
        self.admit(&self.cancel_pool, self.cancel_spec, doc, already_in_progress, move |doc_store, executor, _tx, doc| {
            run_cancel_worker(doc_store, Arc::clone(&start_pool), executor, doc)
        })
        .await
    }

    async fn admit<F, Fut>(
        &self,
        pool: &Arc<JobPool>,
        spec: WorkerSpec,
        doc: Document,
        already_in_progress: bool,
        make_future: F,
    ) -> Result<(), ProcessorError>
    where
        F: FnOnce(Arc<DocStore>, Arc<E>, mpsc::Sender<WorkerResult>, Document) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        if spec.buffer_limit == 0 {
            // legacy mode: no admission bookkeeping, pool blocks the caller.
        } else {
            if self.stopped.load(Ordering::Acquire) {
                return Err(ProcessorError::ClosedProcessor);
            }
            let job_id = doc.job_id();
            if let Err(e) = pool.acquire_buffer_token(&job_id) {
                return Err(e.into());
            }
        }

        if !already_in_progress {
            if let Err(e) = self.doc_store.persist(Folder::Pending, &doc) {
                warn!(document_id = %doc.document_id, error = %e, "failed to persist pending document");
            }
        }

        let Some(tx) = self.result_tx.lock().await.clone() else {
            pool.release_buffer_token(&doc.job_id());
            return Err(ProcessorError::ClosedProcessor);
        };

        let doc_store = Arc::clone(&self.doc_store);
        let executor = Arc::clone(&self.executor);
        let job_id = doc.job_id();
        let doc_id = doc.document_id.clone();
        let pool_for_cleanup = Arc::clone(pool);
        let doc_for_worker = doc.clone();

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let fut = make_future(doc_store, executor, tx, doc_for_worker);
            pool.submit(job_id, Box::new(move |_cancel: CancelFlag| Box::pin(fut)))
        }));

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(pool_err)) => {
                // Pool rejected the job after admission (e.g. shutting
                // down mid-submit): release the token and shed the
                // document into `corrupt` rather than leaving it stuck in
                // `pending`/`current`. The caller still sees success —
                // the command is unrecoverable but has been shed cleanly.
                pool_for_cleanup.release_buffer_token(&doc.job_id());
                warn!(document_id = %doc_id, error = %pool_err, "pool rejected document after admission, moving to corrupt");
                let _ = self.doc_store.move_doc(&doc_id, Folder::Pending, Folder::Corrupt);
                let _ = self.doc_store.move_doc(&doc_id, Folder::Current, Folder::Corrupt);
                Ok(())
            }
            Err(_) => {
                pool_for_cleanup.release_buffer_token(&doc.job_id());
                error!(document_id = %doc_id, "panic submitting document to pool");
                Err(ProcessorError::SubmissionPanic)
            }
        }
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Idempotent. Shuts both pools down concurrently, then closes the
    /// result channel.
    pub async fn stop(&self, stop_timeout: Duration) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        tokio::join!(
            self.start_pool.shutdown_and_wait(stop_timeout),
            self.cancel_pool.shutdown_and_wait(stop_timeout),
        );
        self.result_tx.lock().await.take();
    }
}

async fn run_command_worker<E: DocumentExecutor + 'static>(
    doc_store: Arc<DocStore>,
    executor: Arc<E>,
    result_tx: mpsc::Sender<WorkerResult>,
    mut doc: Document,
) {
    let _ = doc_store.move_doc(&doc.document_id, Folder::Pending, Folder::Current);

    let mut rx = executor.execute(&doc).await;
    let mut last: Option<WorkerResult> = None;

    while let Some(mut result) = rx.recv().await {
        result.upstream_service.get_or_insert(doc.upstream_service);
        if result_tx.send(result.clone()).await.is_err() {
            warn!(document_id = %doc.document_id, "result channel closed while forwarding worker result");
        }
        last = Some(result);
    }

    match last {
        Some(ref r) if !r.last_plugin.is_empty() => {
            // mid-document shutdown: leave the file in `current` for resume.
        }
        Some(ref r) if r.status == ResultStatus::SuccessAndReboot => {
            warn!(document_id = %doc.document_id, "document requests a pending reboot");
        }
        _ => {
            doc.status = last.as_ref().map(|r| terminal_status(r.status)).unwrap_or(DocumentStatus::Failed);
            let _ = doc_store.persist(Folder::Current, &doc);
            let _ = doc_store.move_doc(&doc.document_id, Folder::Current, Folder::Completed);
        }
    }
}

fn terminal_status(status: ResultStatus) -> DocumentStatus {
    match status {
        ResultStatus::Success | ResultStatus::SuccessAndReboot => DocumentStatus::Success,
        ResultStatus::Failed | ResultStatus::Cancelled => DocumentStatus::Failed,
        ResultStatus::InProgress => DocumentStatus::InProgress,
    }
}

async fn run_cancel_worker<E: DocumentExecutor + 'static>(
    doc_store: Arc<DocStore>,
    start_pool: Arc<JobPool>,
    executor: Arc<E>,
    mut doc: Document,
) {
    use cep_core::{CancelInfo, DocumentType};

    let _ = doc_store.move_doc(&doc.document_id, Folder::Pending, Folder::Current);

    let target = match &doc.doc_type {
        DocumentType::CancelCommand { info } => info.target_message_id.clone(),
        _ => {
            let _ = doc_store.move_doc(&doc.document_id, Folder::Current, Folder::Completed);
            return;
        }
    };

    // Flip the pool's cancel-flag for a still-queued job, and ask the
    // out-of-process executor to stop a running one; either may find it.
    let flagged = start_pool.cancel(&cep_core::JobId::new(target.as_str()));
    let stopped = executor.cancel(target.as_str()).await;
    let found = flagged || stopped;
    let outcome = if found { "cancelled".to_string() } else { "target not found".to_string() };

    doc.status = if found { DocumentStatus::Success } else { DocumentStatus::Failed };
    if let DocumentType::CancelCommand { info } = &mut doc.doc_type {
        *info = CancelInfo { target_message_id: target, outcome: Some(outcome) };
    }

    let _ = doc_store.persist(Folder::Current, &doc);
    let _ = doc_store.move_doc(&doc.document_id, Folder::Current, Folder::Completed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cep_core::{Document, ResultType};
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct ImmediateSuccess;

    #[async_trait]
    impl DocumentExecutor for ImmediateSuccess {
        async fn execute(&self, doc: &Document) -> mpsc::Receiver<WorkerResult> {
            let (tx, rx) = mpsc::channel(4);
            let message_id = doc.message_id.to_string();
            tokio::spawn(async move {
                let _ = tx
                    .send(WorkerResult {
                        message_id: cep_core::MessageId::from(message_id),
                        last_plugin: String::new(),
                        status: ResultStatus::Success,
                        plugin_results: HashMap::new(),
                        upstream_service: None,
                        result_type: Some(ResultType::RunCommand),
                    })
                    .await;
            });
            rx
        }

        async fn cancel(&self, _message_id: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn submit_runs_the_document_to_completion() {
        let dir = tempdir().unwrap();
        let doc_store = Arc::new(DocStore::new(dir.path()));
        let processor = EngineProcessor::new(
            WorkerSpec { worker_limit: 2, buffer_limit: 2 },
            WorkerSpec { worker_limit: 1, buffer_limit: 1 },
            Arc::clone(&doc_store),
            Arc::new(ImmediateSuccess),
        );
        let mut results = processor.start().await;

        let doc = Document::builder().build();
        processor.submit(doc.clone()).await.unwrap();

        let result = results.recv().await.unwrap();
        assert_eq!(result.status, ResultStatus::Success);

        // allow the finalize step (move to completed) to run
        tokio::time::sleep(Duration::from_millis(50)).await;
        let completed = doc_store.list(Folder::Completed);
        assert!(completed.contains(&doc.document_id));
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected() {
        let dir = tempdir().unwrap();
        let doc_store = Arc::new(DocStore::new(dir.path()));
        let processor = EngineProcessor::new(
            WorkerSpec { worker_limit: 1, buffer_limit: 1 },
            WorkerSpec { worker_limit: 1, buffer_limit: 1 },
            Arc::clone(&doc_store),
            Arc::new(ImmediateSuccess),
        );
        let _results = processor.start().await;

        let doc = Document::builder().build();
        processor.submit(doc.clone()).await.unwrap();
        let second = processor.submit(doc).await;
        assert!(matches!(second, Err(ProcessorError::DuplicateCommand) | Err(ProcessorError::CommandBufferFull)));
    }

    #[tokio::test]
    async fn stopped_processor_refuses_submissions() {
        let dir = tempdir().unwrap();
        let doc_store = Arc::new(DocStore::new(dir.path()));
        let processor = EngineProcessor::new(
            WorkerSpec { worker_limit: 1, buffer_limit: 1 },
            WorkerSpec { worker_limit: 1, buffer_limit: 1 },
            Arc::clone(&doc_store),
            Arc::new(ImmediateSuccess),
        );
        let _results = processor.start().await;
        processor.stop(Duration::from_secs(1)).await;

        let doc = Document::builder().build();
        assert_eq!(processor.submit(doc).await, Err(ProcessorError::ClosedProcessor));
    }
}
