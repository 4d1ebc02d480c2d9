// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention sweep for worker artefacts under `<root>/orchestration/`.
//!
//! Command and session run directories are named after the RunCommand
//! UUID; association directories are named after the association ID and
//! may contain a flat list of date-prefixed run directories (the
//! "legacy" layout) which are drained child-first.

use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};
use tracing::warn;

const SWEEP_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionKind {
    Command,
    Association,
    Session,
}

/// Per-kind retention windows, applied against directory mtime.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub command_retention: Duration,
    pub association_retention: Duration,
    pub session_retention: Duration,
}

impl RetentionPolicy {
    fn window_for(&self, kind: RetentionKind) -> Duration {
        match kind {
            RetentionKind::Command => self.command_retention,
            RetentionKind::Association => self.association_retention,
            RetentionKind::Session => self.session_retention,
        }
    }
}

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .expect("static regex is valid")
    })
}

fn date_prefixed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("static regex is valid"))
}

/// Sweep `orchestration_root` for directories of `kind` older than the
/// configured retention window. Returns the number of directories
/// removed; bounded to [`SWEEP_BATCH_LIMIT`] per call.
pub fn sweep(orchestration_root: &Path, kind: RetentionKind, policy: RetentionPolicy) -> usize {
    let window = policy.window_for(kind);
    let now = SystemTime::now();
    let mut removed = 0;

    let Ok(entries) = fs::read_dir(orchestration_root) else { return 0 };

    for entry in entries.filter_map(|e| e.ok()) {
        if removed >= SWEEP_BATCH_LIMIT {
            break;
        }
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().into_string().ok() else { continue };

        let matches_kind = match kind {
            RetentionKind::Command | RetentionKind::Session => uuid_pattern().is_match(&name),
            RetentionKind::Association => !uuid_pattern().is_match(&name),
        };
        if !matches_kind {
            continue;
        }

        if kind == RetentionKind::Association && has_date_prefixed_children(&path) {
            removed += sweep_legacy_association_dir(&path, now, window);
            if dir_is_empty(&path) && is_older_than(&path, now, window) {
                if fs::remove_dir(&path).is_ok() {
                    removed += 1;
                }
            }
            continue;
        }

        if is_older_than(&path, now, window) {
            match fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to sweep orchestration dir"),
            }
        }
    }
    removed
}

fn has_date_prefixed_children(dir: &Path) -> bool {
    fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().into_string().is_ok_and(|n| date_prefixed_pattern().is_match(&n)))
}

fn sweep_legacy_association_dir(dir: &Path, now: SystemTime, window: Duration) -> usize {
    let mut removed = 0;
    let Ok(children) = fs::read_dir(dir) else { return 0 };
    for child in children.filter_map(|e| e.ok()) {
        if removed >= SWEEP_BATCH_LIMIT {
            break;
        }
        let path = child.path();
        if is_older_than(&path, now, window) {
            let result = if path.is_dir() { fs::remove_dir_all(&path) } else { fs::remove_file(&path) };
            if result.is_ok() {
                removed += 1;
            }
        }
    }
    removed
}

fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut entries| entries.next().is_none()).unwrap_or(false)
}

fn is_older_than(path: &Path, now: SystemTime, window: Duration) -> bool {
    path.metadata()
        .ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|mtime| now.duration_since(mtime).ok())
        .map(|age| age > window)
        .unwrap_or(false)
}
