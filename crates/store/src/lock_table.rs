// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-document read/write lock table.
//!
//! Locks are allocated on first use and keyed by document ID. A single
//! mutex guards the map itself; the per-document locks it hands out are
//! independent and can be held concurrently. Entries are dropped when a
//! document reaches `completed` so the table doesn't grow without bound.

use cep_core::DocumentId;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct LockTable {
    locks: Mutex<HashMap<DocumentId, Arc<RwLock<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, doc_id: &DocumentId) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        locks.entry(doc_id.clone()).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }

    pub fn read(&self, doc_id: &DocumentId) -> OwnedReadGuard {
        OwnedReadGuard { lock: self.entry(doc_id) }
    }

    pub fn write(&self, doc_id: &DocumentId) -> OwnedWriteGuard {
        OwnedWriteGuard { lock: self.entry(doc_id) }
    }

    /// Drop the table entry for a document, e.g. once it reaches `completed`.
    pub fn release(&self, doc_id: &DocumentId) {
        self.locks.lock().remove(doc_id);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a strong ref to the per-document lock so the guard can outlive
/// the map lookup; `guard()` hands out the actual read guard.
pub struct OwnedReadGuard {
    lock: Arc<RwLock<()>>,
}

impl OwnedReadGuard {
    pub fn guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }
}

pub struct OwnedWriteGuard {
    lock: Arc<RwLock<()>>,
}

impl OwnedWriteGuard {
    pub fn guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_for_distinct_documents_are_independent() {
        let table = LockTable::new();
        let a: DocumentId = "doc-a".into();
        let b: DocumentId = "doc-b".into();

        let guard_a = table.write(&a);
        let _held_a = guard_a.guard();
        // A lock on a different document must not block.
        let guard_b = table.write(&b);
        let _held_b = guard_b.guard();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn release_drops_the_entry() {
        let table = LockTable::new();
        let doc: DocumentId = "doc-a".into();
        let _ = table.read(&doc);
        assert_eq!(table.len(), 1);
        table.release(&doc);
        assert!(table.is_empty());
    }
}
