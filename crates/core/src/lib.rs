// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cep-core: shared domain types for the command execution control plane —
//! documents, results, identifiers, and configuration.

pub mod macros;

pub mod clock;
pub mod config;
pub mod document;
pub mod id;
pub mod ids;
pub mod result;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{Config, ConfigError, PoolConfig};
pub use document::{
    command_id_from_message_id, CancelInfo, Document, DocumentStatus, DocumentType,
    InvalidMessageId, PluginStep, UpstreamService,
};
pub use id::{short, IdBuf};
pub use ids::{AssociationId, CommandId, DocumentId, InstanceId, JobId, MessageId};
pub use result::{PluginResult, ResultStatus, ResultType, WorkerResult};
