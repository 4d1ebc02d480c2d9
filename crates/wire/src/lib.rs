// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cep-wire: the abstract boundary to the upstream message service — a
//! long-poll/ack/reply protocol plus the failed-reply spool on disk.

pub mod client;
pub mod message;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use client::{FailKind, WireClient, WireError};
pub use message::Message;

#[cfg(any(test, feature = "test-support"))]
pub use test_support::FakeWireClient;
