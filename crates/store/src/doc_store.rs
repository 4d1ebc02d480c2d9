// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic per-document persistence across four lifecycle folders.

use crate::lock_table::LockTable;
use cep_core::{Document, DocumentId};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const DECODE_RETRIES: u32 = 3;
const DECODE_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Folder {
    Pending,
    Current,
    Completed,
    Corrupt,
}

impl Folder {
    fn dirname(self) -> &'static str {
        match self {
            Folder::Pending => "pending",
            Folder::Current => "current",
            Folder::Completed => "completed",
            Folder::Corrupt => "corrupt",
        }
    }
}

#[derive(Debug, Error)]
pub enum DocStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding document: {0}")]
    Encode(serde_json::Error),
}

/// Persists [`Document`] state under
/// `<root>/state/{pending,current,completed,corrupt}/<documentID>`.
///
/// All mutating operations hold the per-document write lock; `get` holds
/// the read lock. Filesystem errors below the decode-retry boundary are
/// logged and swallowed — the store never panics on I/O.
pub struct DocStore {
    state_root: PathBuf,
    locks: LockTable,
}

impl DocStore {
    pub fn new(instance_root: &Path) -> Self {
        Self { state_root: instance_root.join("state"), locks: LockTable::new() }
    }

    fn folder_dir(&self, folder: Folder) -> PathBuf {
        self.state_root.join(folder.dirname())
    }

    fn doc_path(&self, folder: Folder, doc_id: &DocumentId) -> PathBuf {
        self.folder_dir(folder).join(doc_id.as_str())
    }

    /// Serialize `doc` to a sibling temp file, then rename into place so a
    /// concurrent reader never observes a truncated file.
    pub fn persist(&self, folder: Folder, doc: &Document) -> Result<(), DocStoreError> {
        let guard = self.locks.write(&doc.document_id);
        let _held = guard.guard();

        let dir = self.folder_dir(folder);
        fs::create_dir_all(&dir)?;
        let dest = self.doc_path(folder, &doc.document_id);
        let tmp = dest.with_extension("tmp");
        let body = serde_json::to_vec_pretty(doc).map_err(DocStoreError::Encode)?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &dest)?;
        Ok(())
    }

    /// Move a document's file between folders, preserving its identity.
    pub fn move_doc(&self, doc_id: &DocumentId, src: Folder, dst: Folder) -> Result<(), DocStoreError> {
        let guard = self.locks.write(doc_id);
        let _held = guard.guard();

        let dst_dir = self.folder_dir(dst);
        fs::create_dir_all(&dst_dir)?;
        let src_path = self.doc_path(src, doc_id);
        let dst_path = self.doc_path(dst, doc_id);
        if src_path.exists() {
            fs::rename(&src_path, &dst_path)?;
        }
        if matches!(dst, Folder::Completed) {
            drop(_held);
            drop(guard);
            self.locks.release(doc_id);
        }
        Ok(())
    }

    /// Read a document, retrying JSON decode up to [`DECODE_RETRIES`] times
    /// on a short sleep. On exhaustion the file is moved to `corrupt` and
    /// `Ok(None)` is returned rather than failing the caller.
    pub fn get(&self, folder: Folder, doc_id: &DocumentId) -> Result<Option<Document>, DocStoreError> {
        let guard = self.locks.read(doc_id);
        let _held = guard.guard();

        let path = self.doc_path(folder, doc_id);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        for attempt in 0..DECODE_RETRIES {
            match serde_json::from_slice::<Document>(&raw) {
                Ok(doc) => return Ok(Some(doc)),
                Err(e) if attempt + 1 < DECODE_RETRIES => {
                    warn!(document_id = %doc_id, attempt, error = %e, "retrying document decode");
                    std::thread::sleep(DECODE_RETRY_DELAY);
                }
                Err(e) => {
                    warn!(document_id = %doc_id, error = %e, "document decode exhausted, moving to corrupt");
                    drop(_held);
                    drop(guard);
                    if let Err(move_err) = self.move_doc(doc_id, folder, Folder::Corrupt) {
                        warn!(document_id = %doc_id, error = %move_err, "failed to move corrupt document");
                    }
                    return Ok(None);
                }
            }
        }
        unreachable!("retry loop always returns")
    }

    pub fn remove(&self, folder: Folder, doc_id: &DocumentId) -> Result<(), DocStoreError> {
        let guard = self.locks.write(doc_id);
        let _held = guard.guard();

        let path = self.doc_path(folder, doc_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List document IDs currently in `folder`. Filesystem errors are
    /// logged and treated as an empty listing.
    pub fn list(&self, folder: Folder) -> Vec<DocumentId> {
        let dir = self.folder_dir(folder);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list folder");
                return Vec::new();
            }
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .map(DocumentId::from)
            .collect()
    }
}
