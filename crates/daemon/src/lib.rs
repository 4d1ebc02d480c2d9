// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cep-daemon: the message handler and interactor that tie the engine
//! processor to the upstream wire, plus process bootstrap (config,
//! logging, lock file) and the `cepd` binary.

pub mod docparse;
pub mod handler;
pub mod interactor;
pub mod lifecycle;
pub mod logging;
pub mod runtime;

#[cfg(feature = "demo")]
pub mod demo;

pub use docparse::{DocumentParser, ParseError};
pub use handler::{HandlerError, MessageHandler, ACK_SKIP_CODES};
pub use interactor::{Interactor, InteractorHandles, StopPolicy};
pub use lifecycle::{ensure_directories, lock_path, LifecycleError, Lock};
pub use runtime::{build, Daemon};
