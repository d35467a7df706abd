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

//! Where document bytes come from.
//!
//! File storage is owned elsewhere; signing only needs the canonical bytes
//! for a document id.

use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Returns the canonical bytes of `document_id`.
    async fn fetch(&self, document_id: &str) -> Result<Vec<u8>>;
}

/// Documents held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDocuments {
    documents: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document_id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.documents.write().insert(document_id.into(), bytes.into());
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocuments {
    async fn fetch(&self, document_id: &str) -> Result<Vec<u8>> {
        self.documents
            .read()
            .get(document_id)
            .cloned()
            .ok_or_else(|| Error::not_found("document", document_id))
    }
}
