// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cep-pool: a bounded worker pool with a buffer-token admission gate and
//! cooperative cancel-flags, used by the engine processor for both its
//! start-type and cancel-type job classes.

mod cancel_flag;
mod job_pool;

pub use cancel_flag::CancelFlag;
pub use job_pool::{BoxFuture, JobPool, PoolError, RunFn};
