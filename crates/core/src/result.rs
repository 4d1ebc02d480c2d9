// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker results: what flows back from a worker through the processor's
//! result channel to the wrapper's reply fan-out and, from there, upstream.

use crate::document::UpstreamService;
use crate::ids::MessageId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of a document as reported by a worker invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    InProgress,
    Success,
    Failed,
    SuccessAndReboot,
    Cancelled,
}

crate::simple_display! {
    ResultStatus {
        InProgress => "in_progress",
        Success => "success",
        Failed => "failed",
        SuccessAndReboot => "success_and_reboot",
        Cancelled => "cancelled",
    }
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResultStatus::InProgress)
    }
}

/// Which wrapper family a result belongs to; stamped by the wrapper (never
/// by the worker) so the reply fan-out and interactor can route correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    RunCommand,
    Session,
}

/// Outcome of a single plugin step within a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResult {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A result produced by a worker, as observed on the processor's result
/// channel. `upstream_service` and `result_type` are filled in by the
/// processor/wrapper from the originating document, not by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub message_id: MessageId,
    /// Name of the plugin currently executing; empty string iff this result
    /// is terminal for the document.
    #[serde(default)]
    pub last_plugin: String,
    pub status: ResultStatus,
    #[serde(default)]
    pub plugin_results: HashMap<String, PluginResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_service: Option<UpstreamService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type: Option<ResultType>,
}

impl WorkerResult {
    pub fn is_terminal(&self) -> bool {
        self.last_plugin.is_empty()
    }

    /// Session results suppress intermediate document-level results: only
    /// plugin-level results and terminal failures flow upstream for
    /// sessions, since a session has exactly one plugin.
    pub fn is_suppressible_for_session(&self) -> bool {
        self.is_terminal() && self.status != ResultStatus::Failed
    }
}
