// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The interactor: one per upstream service. Long-polls the wire, parses
//! and submits documents, forwards replies, and replays the failed-reply
//! spool.

use crate::docparse::DocumentParser;
use crate::handler::{HandlerError, MessageHandler};
use cep_core::{Config, UpstreamService, WorkerResult};
use cep_engine::DocumentExecutor;
use cep_wire::{FailKind, Message, WireClient};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

/// Consecutive-error stop policy: once `threshold` consecutive poll
/// failures have been recorded the interactor considers itself unhealthy
/// and cools down for one scheduler tick.
pub struct StopPolicy {
    error_count: u32,
    threshold: u32,
}

impl StopPolicy {
    pub fn new(threshold: u32) -> Self {
        Self { error_count: 0, threshold }
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn record_success(&mut self) {
        self.error_count = 0;
    }

    pub fn is_unhealthy(&self) -> bool {
        self.error_count >= self.threshold
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
    }
}

pub struct InteractorHandles {
    pub poll: JoinHandle<()>,
    pub reply: JoinHandle<()>,
    pub failed_reply: JoinHandle<()>,
}

pub struct Interactor<W: WireClient + 'static, P: DocumentParser + 'static, E: DocumentExecutor + 'static> {
    wire: Arc<W>,
    parser: Arc<P>,
    handler: Arc<MessageHandler<E>>,
    config: Config,
    service: UpstreamService,
    stop_policy: Mutex<StopPolicy>,
    poll_in_progress: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl<W: WireClient + 'static, P: DocumentParser + 'static, E: DocumentExecutor + 'static> Interactor<W, P, E> {
    pub fn new(wire: Arc<W>, parser: Arc<P>, handler: Arc<MessageHandler<E>>, config: Config, service: UpstreamService) -> Arc<Self> {
        Arc::new(Self {
            wire,
            parser,
            handler,
            config,
            service,
            stop_policy: Mutex::new(StopPolicy::new(5)),
            poll_in_progress: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn service(&self) -> UpstreamService {
        self.service
    }

    /// Spawn the poll, reply, and failed-reply loops. `reply_rx` must have
    /// already been registered with the message handler for this
    /// interactor's `service` via `register_reply`.
    pub fn spawn(self: &Arc<Self>, reply_rx: mpsc::Receiver<WorkerResult>) -> InteractorHandles {
        InteractorHandles {
            poll: tokio::spawn(Arc::clone(self).poll_loop()),
            reply: tokio::spawn(Arc::clone(self).reply_loop(reply_rx)),
            failed_reply: tokio::spawn(Arc::clone(self).failed_reply_loop()),
        }
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_frequency);
        loop {
            ticker.tick().await;
            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            if self.poll_in_progress.swap(true, Ordering::AcqRel) {
                // Previous poll hasn't returned; fall back to the next
                // scheduled tick rather than running concurrently.
                continue;
            }

            let unhealthy = {
                let mut policy = self.stop_policy.lock();
                if policy.is_unhealthy() {
                    policy.reset();
                    true
                } else {
                    false
                }
            };
            if !unhealthy {
                self.poll_once().await;
            }
            self.poll_in_progress.store(false, Ordering::Release);
        }
    }

    async fn poll_once(&self) {
        let start = Instant::now();
        match self.wire.get_messages(&self.config.instance_id).await {
            Ok((_destination, messages, request_id)) => {
                self.stop_policy.lock().record_success();
                trace!(request_id, count = messages.len(), "polled messages");
                for message in messages {
                    self.process_message(message).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "get_messages failed");
                self.stop_policy.lock().record_error();
            }
        }

        if start.elapsed() < Duration::from_secs(1) {
            let jitter = 2_000 + (rand::random::<u64>() % 500);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
    }

    async fn process_message(&self, message: Message) {
        if !message.has_required_fields() {
            let _ = self.wire.fail_message(&message.message_id, FailKind::InvalidMessage).await;
            return;
        }

        if !message.is_send_command() && !message.is_cancel_command() {
            let _ = self.wire.fail_message(&message.message_id, FailKind::InternalHandlerException).await;
            return;
        }

        let doc = match self.parser.parse(&message).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "failed to parse document");
                let _ = self.wire.fail_message(&message.message_id, FailKind::InvalidMessage).await;
                return;
            }
        };

        self.submit_with_retry(doc, &message.message_id).await;
    }

    async fn submit_with_retry(&self, doc: cep_core::Document, message_id: &str) {
        let mut logged_wait = false;
        loop {
            match self.handler.submit(doc.clone()).await {
                Ok(()) | Err(HandlerError::DuplicateCommand) => {
                    self.send_in_progress_reply(message_id).await;
                    let _ = self.wire.acknowledge_message(message_id).await;
                    return;
                }
                Err(HandlerError::ProcessorBufferFull) => {
                    if !logged_wait {
                        info!(message_id, "processor buffer full, retrying every 10s");
                        logged_wait = true;
                    } else {
                        trace!(message_id, "processor buffer still full");
                    }
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Err(e) => {
                    warn!(message_id, error = %e, "dropping message without acknowledging");
                    return;
                }
            }
        }
    }

    async fn send_in_progress_reply(&self, message_id: &str) {
        let payload = serde_json::json!({ "status": "in_progress" });
        if let Err(e) = self.wire.send_reply(message_id, payload).await {
            warn!(message_id, error = %e, "failed to send in-progress reply");
        }
    }

    async fn reply_loop(self: Arc<Self>, mut rx: mpsc::Receiver<WorkerResult>) {
        loop {
            let outcome =
                futures::FutureExt::catch_unwind(std::panic::AssertUnwindSafe(self.reply_loop_inner(&mut rx))).await;
            if outcome.is_ok() {
                break;
            }
            error!("reply loop panicked, restarting in 5s");
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    async fn reply_loop_inner(&self, rx: &mut mpsc::Receiver<WorkerResult>) {
        while let Some(result) = rx.recv().await {
            let payload = serde_json::to_value(&result).unwrap_or_else(|_| serde_json::json!({}));
            if let Err(e) = self.wire.send_reply(result.message_id.as_str(), payload).await {
                warn!(message_id = %result.message_id, error = %e, "failed to send reply");
            }
        }
    }

    async fn failed_reply_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.failed_reply_frequency);
        loop {
            ticker.tick().await;
            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            self.failed_reply_tick().await;
        }
    }

    async fn failed_reply_tick(&self) {
        let names = match self.wire.load_failed_replies().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "failed to list failed replies");
                return;
            }
        };

        for name in names {
            if !within_reply_timeout(&name, self.config.reply_timeout) {
                continue;
            }
            let payload = match self.wire.get_failed_reply(&name).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(name, error = %e, "failed to load failed reply, aborting batch");
                    return;
                }
            };
            match self.wire.send_reply_with_input(payload).await {
                Ok(()) => {
                    if let Err(e) = self.wire.delete_failed_reply(&name).await {
                        warn!(name, error = %e, "failed to delete replayed reply file");
                    }
                }
                Err(e) => {
                    warn!(name, error = %e, "failed to replay reply, aborting batch");
                    self.stop_policy.lock().record_error();
                    return;
                }
            }
        }
    }

    /// Stop accepting new poll ticks, signal the wire client, and wait for
    /// the poll loop to return. The reply and failed-reply loops are left
    /// running: the reply loop exits on its own once the processors it
    /// feeds from have stopped and every reply-channel sender has been
    /// dropped (see `MessageHandler::stop`/`ProcessorWrapper::stop`),
    /// which only happens *after* this call returns.
    pub async fn pre_processor_close(&self, handles: InteractorHandles) {
        self.stopped.store(true, Ordering::Release);
        self.wire.stop().await;
        let _ = handles.poll.await;
    }
}

/// Failed-reply filenames are `<startISO>_<endISO>`; a reply is eligible
/// for replay while `now - end <= timeout`.
fn within_reply_timeout(name: &str, timeout: Duration) -> bool {
    let Some((_, end)) = name.split_once('_') else { return false };
    let Ok(end_ts) = chrono::DateTime::parse_from_rfc3339(end) else { return false };
    let age = chrono::Utc::now().signed_duration_since(end_ts.with_timezone(&chrono::Utc));
    age.to_std().map(|age| age <= timeout).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_policy_becomes_unhealthy_after_threshold_errors() {
        let mut policy = StopPolicy::new(3);
        assert!(!policy.is_unhealthy());
        policy.record_error();
        policy.record_error();
        assert!(!policy.is_unhealthy());
        policy.record_error();
        assert!(policy.is_unhealthy());
        policy.reset();
        assert!(!policy.is_unhealthy());
    }

    #[test]
    fn success_resets_the_error_count() {
        let mut policy = StopPolicy::new(2);
        policy.record_error();
        policy.record_success();
        policy.record_error();
        assert!(!policy.is_unhealthy());
    }

    #[test]
    fn reply_filename_within_timeout_is_eligible() {
        let end = chrono::Utc::now().to_rfc3339();
        let name = format!("2024-01-01T00:00:00Z_{end}");
        assert!(within_reply_timeout(&name, Duration::from_secs(7200)));
    }

    #[test]
    fn reply_filename_past_timeout_is_not_eligible() {
        let end = (chrono::Utc::now() - chrono::Duration::hours(3)).to_rfc3339();
        let name = format!("2024-01-01T00:00:00Z_{end}");
        assert!(!within_reply_timeout(&name, Duration::from_secs(7200)));
    }

    #[test]
    fn malformed_filename_is_not_eligible() {
        assert!(!within_reply_timeout("no-underscore-here", Duration::from_secs(7200)));
    }
}
