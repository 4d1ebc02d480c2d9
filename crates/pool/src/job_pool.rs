// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded job pool: buffer-token admission gate over a fixed worker count.

use crate::cancel_flag::CancelFlag;
use cep_core::JobId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type RunFn = Box<dyn FnOnce(CancelFlag) -> BoxFuture + Send>;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum PoolError {
    #[error("job ID is empty")]
    InvalidJobId,
    #[error("job ID is already buffered")]
    DuplicateCommand,
    #[error("job queue is full")]
    JobQueueFull,
    #[error("job pool is shutting down")]
    Closed,
}

enum Slot {
    Queued { cancel: CancelFlag, cancelled: bool },
    Running { cancel: CancelFlag },
}

/// Worker-limited, buffer-gated job pool.
///
/// `acquire_buffer_token` reserves one of `buffer_limit` admission slots;
/// `submit` then hands the job to the worker pool, which executes at most
/// `worker_limit` jobs concurrently via a [`Semaphore`]. Each running job
/// gets a [`CancelFlag`] it is expected to poll cooperatively.
pub struct JobPool {
    worker_limit: usize,
    buffer_limit: usize,
    tokens: Arc<Mutex<HashSet<JobId>>>,
    slots: Arc<Mutex<HashMap<JobId, Slot>>>,
    semaphore: Arc<Semaphore>,
    shutdown: Arc<AtomicBool>,
    tasks: Mutex<JoinSet<()>>,
}

impl JobPool {
    pub fn new(worker_limit: usize, buffer_limit: usize) -> Self {
        Self {
            worker_limit,
            buffer_limit,
            tokens: Arc::new(Mutex::new(HashSet::new())),
            slots: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(worker_limit.max(1))),
            shutdown: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Reserve a buffer slot for `job_id`. Required before `submit` when
    /// `buffer_limit > 0`.
    pub fn acquire_buffer_token(&self, job_id: &JobId) -> Result<(), PoolError> {
        if job_id.is_empty() {
            return Err(PoolError::InvalidJobId);
        }
        let mut tokens = self.tokens.lock();
        if tokens.contains(job_id) {
            return Err(PoolError::DuplicateCommand);
        }
        if self.buffer_limit > 0 && tokens.len() >= self.buffer_limit {
            return Err(PoolError::JobQueueFull);
        }
        tokens.insert(job_id.clone());
        Ok(())
    }

    /// Release `job_id`'s buffer token; a no-op if it was never held.
    pub fn release_buffer_token(&self, job_id: &JobId) {
        self.tokens.lock().remove(job_id);
    }

    /// Enqueue `job_id` for execution. In legacy mode (`buffer_limit == 0`)
    /// duplicate detection is skipped and the call blocks (via the
    /// semaphore) until a worker is free.
    ///
    /// The buffer token is released as soon as the job is handed to a
    /// worker (the semaphore permit is acquired), not when it finishes —
    /// `bufferLimit` bounds admission of queued-but-not-yet-running jobs,
    /// separately from `workerLimit`. Fails with [`PoolError::Closed`]
    /// without enqueuing if the pool is already shutting down; the caller
    /// still holds the buffer token in that case and must release it.
    pub fn submit(&self, job_id: JobId, run: RunFn) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let cancel = CancelFlag::new();
        {
            let mut slots = self.slots.lock();
            slots.insert(job_id.clone(), Slot::Queued { cancel: cancel.clone(), cancelled: false });
        }

        let semaphore = Arc::clone(&self.semaphore);
        let slots = Arc::clone(&self.slots);
        let tokens = Arc::clone(&self.tokens);
        let shutdown = Arc::clone(&self.shutdown);
        let job_id_for_task = job_id.clone();

        let mut tasks = self.tasks.lock();
        tasks.spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            tokens.lock().remove(&job_id_for_task);

            let was_cancelled = {
                let mut slots = slots.lock();
                match slots.get_mut(&job_id_for_task) {
                    Some(Slot::Queued { cancelled: true, .. }) => {
                        slots.remove(&job_id_for_task);
                        true
                    }
                    Some(slot @ Slot::Queued { .. }) => {
                        *slot = Slot::Running { cancel: cancel.clone() };
                        false
                    }
                    _ => true,
                }
            };

            if !was_cancelled && !shutdown.load(Ordering::Acquire) {
                run(cancel).await;
            }

            slots.lock().remove(&job_id_for_task);
            drop(permit);
        });
        Ok(())
    }

    /// Cancel a queued or running job. Returns whether a matching job was
    /// found at all.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(job_id) {
            Some(Slot::Queued { cancelled, .. }) => {
                *cancelled = true;
                true
            }
            Some(Slot::Running { cancel }) => {
                cancel.flip();
                true
            }
            None => false,
        }
    }

    /// Stop accepting new jobs, flip every live cancel-flag, and wait up
    /// to `timeout` for in-flight workers to return.
    pub async fn shutdown_and_wait(&self, timeout: Duration) {
        self.shutdown.store(true, Ordering::Release);
        {
            let slots = self.slots.lock();
            for slot in slots.values() {
                if let Slot::Running { cancel } = slot {
                    cancel.flip();
                }
            }
        }

        let mut tasks = self.tasks.lock();
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("job pool shutdown timed out with tasks still running");
        }
    }

    pub fn buffered_count(&self) -> usize {
        self.tokens.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn job(id: &str) -> JobId {
        JobId::new(id)
    }

    #[tokio::test]
    async fn acquire_buffer_token_rejects_empty_job_id() {
        let pool = JobPool::new(1, 1);
        assert_eq!(pool.acquire_buffer_token(&job("")), Err(PoolError::InvalidJobId));
    }

    #[tokio::test]
    async fn acquire_buffer_token_rejects_duplicates() {
        let pool = JobPool::new(1, 2);
        pool.acquire_buffer_token(&job("a")).unwrap();
        assert_eq!(pool.acquire_buffer_token(&job("a")), Err(PoolError::DuplicateCommand));
    }

    #[tokio::test]
    async fn acquire_buffer_token_rejects_when_full() {
        let pool = JobPool::new(1, 1);
        pool.acquire_buffer_token(&job("a")).unwrap();
        assert_eq!(pool.acquire_buffer_token(&job("b")), Err(PoolError::JobQueueFull));
    }

    #[tokio::test]
    async fn release_buffer_token_frees_capacity() {
        let pool = JobPool::new(1, 1);
        pool.acquire_buffer_token(&job("a")).unwrap();
        pool.release_buffer_token(&job("a"));
        pool.acquire_buffer_token(&job("b")).unwrap();
    }

    #[tokio::test]
    async fn submitted_job_runs_and_clears_its_token() {
        let pool = JobPool::new(2, 2);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);

        pool.acquire_buffer_token(&job("a")).unwrap();
        pool.submit(job("a"), Box::new(move |_cancel| {
            Box::pin(async move {
                ran2.fetch_add(1, Ordering::SeqCst);
            })
        }))
        .unwrap();

        pool.shutdown_and_wait(Duration::from_secs(1)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pool.buffered_count(), 0);
    }

    #[tokio::test]
    async fn cancel_running_job_flips_its_flag() {
        let pool = JobPool::new(1, 1);
        let observed = Arc::new(AtomicBool::new(false));
        let observed2 = Arc::clone(&observed);

        pool.acquire_buffer_token(&job("a")).unwrap();
        pool.submit(job("a"), Box::new(move |cancel| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                observed2.store(cancel.is_cancelled(), Ordering::SeqCst);
            })
        }))
        .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pool.cancel(&job("a")));
        pool.shutdown_and_wait(Duration::from_secs(1)).await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_unknown_job_returns_false() {
        let pool = JobPool::new(1, 1);
        assert!(!pool.cancel(&job("ghost")));
    }

    #[tokio::test]
    async fn buffer_token_is_released_on_handoff_not_completion() {
        let pool = JobPool::new(1, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel();
        let mut release_rx = Some(release_rx);

        pool.acquire_buffer_token(&job("a")).unwrap();
        pool.submit(job("a"), Box::new(move |_cancel| {
            Box::pin(async move {
                let _ = release_rx.take().unwrap().await;
            })
        }))
        .unwrap();

        // The worker has been handed the job but hasn't finished; a new
        // buffer token must already be available even at buffer_limit=1.
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.acquire_buffer_token(&job("b")).unwrap();

        let _ = release_tx.send(());
        pool.shutdown_and_wait(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let pool = JobPool::new(1, 1);
        pool.shutdown_and_wait(Duration::from_secs(1)).await;

        pool.acquire_buffer_token(&job("a")).unwrap();
        let result = pool.submit(job("a"), Box::new(|_cancel| Box::pin(async {})));
        assert_eq!(result, Err(PoolError::Closed));
    }
}
