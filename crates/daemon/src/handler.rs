// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message handler: routes documents to the registered processor wrapper
//! for their type, and fans reply channels out to the interactors.

use cep_core::{Document, UpstreamService, WorkerResult};
use cep_engine::{DocumentExecutor, ProcessorError, ProcessorWrapper, WrapperError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandlerError {
    #[error("processor buffer is full")]
    ProcessorBufferFull,
    #[error("processor is closed")]
    ClosedProcessor,
    #[error("duplicate command")]
    DuplicateCommand,
    #[error("invalid document")]
    InvalidDocument,
    #[error("unexpected document type")]
    UnexpectedDocumentType,
    #[error("failed translating processor error code")]
    ProcessorErrorCodeTranslationFailed,
}

impl From<WrapperError> for HandlerError {
    fn from(e: WrapperError) -> Self {
        match e {
            WrapperError::DuplicateCommand => HandlerError::DuplicateCommand,
            WrapperError::UnsupportedDocType => HandlerError::UnexpectedDocumentType,
            WrapperError::Processor(ProcessorError::CommandBufferFull) => HandlerError::ProcessorBufferFull,
            WrapperError::Processor(ProcessorError::ClosedProcessor) => HandlerError::ClosedProcessor,
            WrapperError::Processor(ProcessorError::DuplicateCommand) => HandlerError::DuplicateCommand,
            WrapperError::Processor(ProcessorError::InvalidDocumentId) => HandlerError::InvalidDocument,
            WrapperError::Processor(_) => HandlerError::ProcessorErrorCodeTranslationFailed,
        }
    }
}

/// `ack-skip set`: handler error codes for which the interactor should
/// drop a message without acknowledging, leaving it for wire redelivery.
pub const ACK_SKIP_CODES: &[HandlerError] = &[
    HandlerError::ClosedProcessor,
    HandlerError::UnexpectedDocumentType,
    HandlerError::ProcessorErrorCodeTranslationFailed,
    HandlerError::InvalidDocument,
];

struct Registry<E: DocumentExecutor + 'static> {
    by_processor_name: HashMap<String, Arc<ProcessorWrapper<E>>>,
    by_doc_kind: HashMap<&'static str, Arc<ProcessorWrapper<E>>>,
    reply_channels: HashMap<UpstreamService, mpsc::Sender<WorkerResult>>,
}

pub struct MessageHandler<E: DocumentExecutor + 'static> {
    registry: RwLock<Registry<E>>,
}

impl<E: DocumentExecutor + 'static> Default for MessageHandler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DocumentExecutor + 'static> MessageHandler<E> {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry {
                by_processor_name: HashMap::new(),
                by_doc_kind: HashMap::new(),
                reply_channels: HashMap::new(),
            }),
        }
    }

    pub fn register_reply(&self, service: UpstreamService, channel: mpsc::Sender<WorkerResult>) {
        self.registry.write().reply_channels.insert(service, channel);
    }

    /// Idempotent by `processor_name`: the first registration is
    /// initialized; later calls return the already-registered wrapper.
    pub async fn initialize_and_register_processor(
        &self,
        processor_name: &str,
        wrapper: Arc<ProcessorWrapper<E>>,
    ) -> Arc<ProcessorWrapper<E>> {
        if let Some(existing) = self.registry.read().by_processor_name.get(processor_name) {
            return Arc::clone(existing);
        }

        let output_channels = self.registry.read().reply_channels.clone();
        wrapper.initialize(output_channels).await;

        let mut registry = self.registry.write();
        if let Some(existing) = registry.by_processor_name.get(processor_name) {
            return Arc::clone(existing);
        }
        for kind in wrapper.start_kinds().iter().chain(wrapper.cancel_kinds()) {
            registry.by_doc_kind.insert(kind, Arc::clone(&wrapper));
        }
        registry.by_processor_name.insert(processor_name.to_string(), Arc::clone(&wrapper));
        wrapper
    }

    pub async fn submit(&self, doc: Document) -> Result<(), HandlerError> {
        let wrapper = {
            let registry = self.registry.read();
            registry.by_doc_kind.get(doc.doc_type.kind()).cloned()
        };
        let Some(wrapper) = wrapper else {
            return Err(HandlerError::UnexpectedDocumentType);
        };

        match futures::FutureExt::catch_unwind(std::panic::AssertUnwindSafe(wrapper.push_to_processor(doc))).await {
            Ok(result) => result.map_err(HandlerError::from),
            Err(_) => {
                error!("panic while submitting document to processor wrapper");
                Ok(())
            }
        }
    }

    pub async fn stop(&self, stop_timeout: std::time::Duration) {
        let wrappers: Vec<_> = self.registry.read().by_processor_name.values().cloned().collect();
        let stops = wrappers.iter().map(|w| w.stop(stop_timeout));
        futures::future::join_all(stops).await;

        let mut registry = self.registry.write();
        registry.reply_channels.clear();
        registry.by_processor_name.clear();
        registry.by_doc_kind.clear();
    }
}
