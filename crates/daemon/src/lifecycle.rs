// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: exclusive lock acquisition and on-disk directory layout.

use cep_core::Config;
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exclusive lock file held for the daemon's lifetime; releases on drop.
pub struct Lock {
    file: File,
    path: PathBuf,
}

impl Lock {
    /// Open (without truncating) and exclusively lock `path`, then write
    /// this process's PID into it.
    pub fn acquire(path: &std::path::Path) -> Result<Self, LifecycleError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(path)?;
        file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Self { file, path: path.to_path_buf() })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        use fs2::FileExt as _;
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Create the on-disk layout under `config.instance_root()`:
/// `state/{pending,current,completed,corrupt}`, `idempotency`,
/// `orchestration`, `logs`.
pub fn ensure_directories(config: &Config) -> Result<(), LifecycleError> {
    let root = config.instance_root();
    for sub in ["state/pending", "state/current", "state/completed", "state/corrupt", "idempotency", "orchestration", "logs"] {
        std::fs::create_dir_all(root.join(sub))?;
    }
    info!(root = %root.display(), "control plane directories ready");
    Ok(())
}

pub fn lock_path(config: &Config) -> PathBuf {
    config.instance_root().join("cepd.lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cep_core::Config;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.data_store = dir.to_path_buf();
        config.instance_id = "i-abc".to_string();
        config
    }

    #[test]
    fn ensure_directories_creates_the_full_layout() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        ensure_directories(&config).unwrap();
        assert!(config.instance_root().join("state/pending").is_dir());
        assert!(config.instance_root().join("idempotency").is_dir());
        assert!(config.instance_root().join("orchestration").is_dir());
    }

    #[test]
    fn lock_acquire_then_drop_releases_the_file() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let path = lock_path(&config);
        {
            let _lock = Lock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        // second acquisition after drop succeeds
        let _lock = Lock::acquire(&path).unwrap();
    }

    #[test]
    fn concurrent_lock_acquisition_fails() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let path = lock_path(&config);
        let _held = Lock::acquire(&path).unwrap();
        assert!(matches!(Lock::acquire(&path), Err(LifecycleError::LockFailed(_))));
    }
}
