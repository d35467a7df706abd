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

//! Filesystem-backed document source.

use async_trait::async_trait;
use countersign::signing::DocumentSource;
use countersign::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Serves document bytes from `root/<document_id>`.
///
/// Document ids are single path components; anything that could escape the
/// root is refused.
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, document_id: &str) -> Result<PathBuf> {
        let valid = !document_id.is_empty()
            && document_id != "."
            && document_id != ".."
            && !document_id.contains(['/', '\\', '\0']);
        if !valid {
            return Err(Error::validation(format!(
                "invalid document id '{document_id}'"
            )));
        }
        Ok(self.root.join(document_id))
    }
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn fetch(&self, document_id: &str) -> Result<Vec<u8>> {
        let path = self.path_for(document_id)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::not_found("document", document_id),
            _ => Error::Storage(format!("reading document '{document_id}': {e}")),
        })
    }
}
