// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk idempotency ledger: empty marker directories recording which
//! commands have already been admitted, keyed by document type and
//! command ID.

use cep_core::CommandId;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::warn;

const SWEEP_BATCH_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct IdempotencyLedger {
    root: PathBuf,
}

impl IdempotencyLedger {
    pub fn new(instance_root: &Path) -> Self {
        Self { root: instance_root.join("idempotency") }
    }

    fn marker_path(&self, doc_type: &str, command_id: &CommandId) -> PathBuf {
        self.root.join(doc_type).join(command_id.as_str())
    }

    /// Record a command as accepted. Called only after successful pool
    /// admission.
    pub fn create(&self, doc_type: &str, command_id: &CommandId) -> Result<(), IdempotencyError> {
        let path = self.marker_path(doc_type, command_id);
        fs::create_dir_all(&path)?;
        Ok(())
    }

    pub fn exists(&self, doc_type: &str, command_id: &CommandId) -> bool {
        self.marker_path(doc_type, command_id).is_dir()
    }

    /// Delete markers older than `ttl`, bounded to [`SWEEP_BATCH_LIMIT`]
    /// per call. Returns the number of markers removed.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;

        let Ok(doc_type_dirs) = fs::read_dir(&self.root) else {
            return 0;
        };

        'outer: for doc_type_dir in doc_type_dirs.filter_map(|e| e.ok()) {
            let Ok(entries) = fs::read_dir(doc_type_dir.path()) else { continue };
            for entry in entries.filter_map(|e| e.ok()) {
                if removed >= SWEEP_BATCH_LIMIT {
                    break 'outer;
                }
                let age = entry
                    .metadata()
                    .ok()
                    .and_then(|meta| meta.modified().ok())
                    .and_then(|mtime| now.duration_since(mtime).ok());
                if age.map(|age| age > ttl).unwrap_or(false) {
                    if let Err(e) = fs::remove_dir(entry.path()) {
                        warn!(path = %entry.path().display(), error = %e, "failed to sweep idempotency marker");
                        continue;
                    }
                    removed += 1;
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use tempfile::tempdir;

    #[test]
    fn create_then_exists_round_trips() {
        let dir = tempdir().unwrap();
        let ledger = IdempotencyLedger::new(dir.path());
        let cmd: CommandId = "cmd-1".into();
        assert!(!ledger.exists("SendCommand", &cmd));
        ledger.create("SendCommand", &cmd).unwrap();
        assert!(ledger.exists("SendCommand", &cmd));
    }

    #[test]
    fn sweep_removes_markers_older_than_ttl() {
        let dir = tempdir().unwrap();
        let ledger = IdempotencyLedger::new(dir.path());
        let cmd: CommandId = "cmd-old".into();
        ledger.create("SendCommand", &cmd).unwrap();
        sleep(Duration::from_millis(20));

        let removed = ledger.sweep(Duration::from_millis(5));
        assert_eq!(removed, 1);
        assert!(!ledger.exists("SendCommand", &cmd));
    }

    #[test]
    fn sweep_keeps_markers_within_ttl() {
        let dir = tempdir().unwrap();
        let ledger = IdempotencyLedger::new(dir.path());
        let cmd: CommandId = "cmd-fresh".into();
        ledger.create("SendCommand", &cmd).unwrap();

        let removed = ledger.sweep(Duration::from_secs(3600));
        assert_eq!(removed, 0);
        assert!(ledger.exists("SendCommand", &cmd));
    }
}
