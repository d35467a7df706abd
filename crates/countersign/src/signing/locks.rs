/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Per-document signing locks.
//!
//! At most one signing attempt per document is in flight. A second attempt
//! fails immediately with `Conflict(SigningInProgress)` rather than queueing
//! behind the first. The lock is released when the guard drops, which covers
//! success, error, cancellation, and panics alike.

use crate::error::{ConflictReason, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Registry of documents currently being signed.
#[derive(Debug, Clone, Default)]
pub struct DocumentLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `document_id` or fails without waiting.
    pub fn try_lock(&self, document_id: &str) -> Result<DocumentLockGuard> {
        let mut held = self.held.lock();
        if !held.insert(document_id.to_string()) {
            return Err(ConflictReason::SigningInProgress.into());
        }
        tracing::trace!(document_id = %document_id, "Document lock acquired");
        Ok(DocumentLockGuard {
            held: Arc::clone(&self.held),
            document_id: document_id.to_string(),
        })
    }

    pub fn is_locked(&self, document_id: &str) -> bool {
        self.held.lock().contains(document_id)
    }
}

/// Releases its document lock on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct DocumentLockGuard {
    held: Arc<Mutex<HashSet<String>>>,
    document_id: String,
}

impl DocumentLockGuard {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }
}

impl Drop for DocumentLockGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.document_id);
        tracing::trace!(document_id = %self.document_id, "Document lock released");
    }
}
