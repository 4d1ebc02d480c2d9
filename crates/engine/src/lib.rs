// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cep-engine: the processor that drives documents through job pools to
//! the out-of-process worker, and the command/session wrappers around it.

pub mod doc_executor;
pub mod processor;
pub mod wrapper;

pub use doc_executor::DocumentExecutor;
pub use processor::{EngineProcessor, ProcessorError, WorkerSpec};
pub use wrapper::{AssociationRefresher, ProcessorWrapper, RetentionConfig, WrapperError, WrapperKind};
