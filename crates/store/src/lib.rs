// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cep-store: on-disk persistence for the command execution control plane —
//! the per-document DocStore and the idempotency ledger.

pub mod doc_store;
pub mod idempotency;
pub mod lock_table;
pub mod retention;

pub use doc_store::{DocStore, DocStoreError, Folder};
pub use idempotency::{IdempotencyError, IdempotencyLedger};
pub use retention::{RetentionKind, RetentionPolicy};
