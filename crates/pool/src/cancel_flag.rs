// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative, flip-once cancellation signal handed to a running job.
/// Workers poll [`CancelFlag::is_cancelled`] at convenient points; nothing
/// forcibly interrupts the job.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn flip(&self) {
        self.0.store(true, Ordering::Release);
    }
}
