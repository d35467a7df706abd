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

//! A software HSM boundary.
//!
//! Keys are generated and kept inside; callers only see [`HsmKey`] metadata
//! and public keys. Useful for development deployments and for tests that
//! need the full HSM contract without a network.

use super::{
    resolve_signing_key, FileSigningRequest, FileSigningResult, HsmService, HsmSignature,
    SignedFile,
};
use crate::clock::{Clock, SystemClock};
use crate::crypto::{compute_key_fingerprint, PrivateKey, Sha256Digest};
use crate::error::{ConflictReason, Error, Result};
use crate::models::{HsmKey, KeyFilter, KeyGenerationParams, KeyStatus, Page};
use crate::security::audit;
use crate::signing::DetachedSignature;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PAGE_LIMIT: u32 = 50;
const MAX_PAGE_LIMIT: u32 = 500;

struct KeyEntry {
    meta: HsmKey,
    private: Arc<PrivateKey>,
    spki: Vec<u8>,
}

struct StoredFile {
    filename: String,
    bytes: Vec<u8>,
    signature_id: Option<String>,
}

#[derive(Default)]
struct State {
    keys: BTreeMap<String, KeyEntry>,
    files: HashMap<String, StoredFile>,
    signatures: HashMap<String, SignedFile>,
}

/// In-process implementation of [`HsmService`].
pub struct InMemoryHsm {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryHsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryHsm")
            .field("keys", &state.keys.len())
            .field("files", &state.files.len())
            .finish()
    }
}

impl Default for InMemoryHsm {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHsm {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Stores a file so it can later be signed with [`HsmService::sign_file`].
    pub fn register_file(
        &self,
        file_id: impl Into<String>,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) {
        self.state.lock().files.insert(
            file_id.into(),
            StoredFile {
                filename: filename.into(),
                bytes,
                signature_id: None,
            },
        );
    }

    /// Whether `file_id` has been signed.
    pub fn is_file_signed(&self, file_id: &str) -> bool {
        self.state
            .lock()
            .files
            .get(file_id)
            .is_some_and(|f| f.signature_id.is_some())
    }

    /// Suspends a key. Revoked keys stay revoked.
    pub fn deactivate_key(&self, key_id: &str) -> Result<HsmKey> {
        let mut state = self.state.lock();
        let entry = state
            .keys
            .get_mut(key_id)
            .ok_or_else(|| Error::not_found("key", key_id))?;
        if entry.meta.status == KeyStatus::Revoked {
            return Err(ConflictReason::KeyRevoked.into());
        }
        entry.meta.status = KeyStatus::Inactive;
        Ok(entry.meta.clone())
    }

    fn sign_with(&self, key_id: &str, digest: &Sha256Digest) -> Result<HsmSignature> {
        let (private, spki) = {
            let state = self.state.lock();
            let entry = state
                .keys
                .get(key_id)
                .ok_or_else(|| Error::not_found("key", key_id))?;
            super::ensure_signing_capable(&entry.meta)?;
            (Arc::clone(&entry.private), entry.spki.clone())
        };

        // The private-key operation runs without holding the state lock
        let signature = private.sign_prehash(digest)?;
        Ok(HsmSignature {
            key_id: key_id.to_string(),
            signature,
            algorithm: private.algorithm(),
            certificate_chain: Vec::new(),
            public_key: spki,
        })
    }
}

#[async_trait]
impl HsmService for InMemoryHsm {
    async fn list_keys(&self, filter: &KeyFilter) -> Result<Page<HsmKey>> {
        let page = filter.page.unwrap_or(1);
        if page == 0 {
            return Err(Error::validation("page must be at least 1"));
        }
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);

        let state = self.state.lock();
        let mut matching: Vec<&HsmKey> = state
            .keys
            .values()
            .map(|e| &e.meta)
            .filter(|k| filter.matches(k))
            .collect();
        matching.sort_by(|a, b| (a.created_at, &a.key_id).cmp(&(b.created_at, &b.key_id)));

        let total = matching.len() as u64;
        let offset = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            page,
            limit,
            total,
        })
    }

    async fn generate_key(&self, owner: &str, params: KeyGenerationParams) -> Result<HsmKey> {
        if owner.trim().is_empty() {
            return Err(Error::validation("key owner is required"));
        }
        if params.label.trim().is_empty() {
            return Err(Error::validation("key label is required"));
        }

        let key_type = params.key_type;
        let key_size = params.key_size;
        // RSA generation is slow; keep it off the async worker
        let private = tokio::task::spawn_blocking(move || PrivateKey::generate(key_type, key_size))
            .await
            .map_err(|e| Error::Storage(format!("key generation task failed: {e}")))?
            .map_err(|e| Error::validation(e.to_string()))?;
        let spki = private.public_key().to_spki_der()?;
        let fingerprint = compute_key_fingerprint(&spki);

        let meta = HsmKey {
            key_id: format!("key-{}", Uuid::new_v4()),
            key_type,
            key_size,
            algorithm: private.algorithm().name().to_string(),
            label: params.label,
            usage: params.usage,
            status: KeyStatus::Active,
            created_at: self.clock.now(),
            user_id: owner.to_string(),
            public_key: Some(BASE64.encode(&spki)),
            fingerprint: Some(fingerprint.clone()),
        };

        self.state.lock().keys.insert(
            meta.key_id.clone(),
            KeyEntry {
                meta: meta.clone(),
                private: Arc::new(private),
                spki,
            },
        );

        audit::log_hsm_key_generated(&meta.key_id, owner, key_type.as_str(), Some(&fingerprint));
        Ok(meta)
    }

    async fn get_key(&self, key_id: &str) -> Result<HsmKey> {
        self.state
            .lock()
            .keys
            .get(key_id)
            .map(|e| e.meta.clone())
            .ok_or_else(|| Error::not_found("key", key_id))
    }

    async fn revoke_key(&self, key_id: &str) -> Result<HsmKey> {
        let meta = {
            let mut state = self.state.lock();
            let entry = state
                .keys
                .get_mut(key_id)
                .ok_or_else(|| Error::not_found("key", key_id))?;
            entry.meta.status = KeyStatus::Revoked;
            entry.meta.clone()
        };
        audit::log_hsm_key_revoked(key_id);
        Ok(meta)
    }

    async fn sign_digest(&self, key_id: &str, digest: &Sha256Digest) -> Result<HsmSignature> {
        self.sign_with(key_id, digest)
    }

    async fn sign_file(&self, request: FileSigningRequest) -> Result<FileSigningResult> {
        let (digest, filename) = {
            let state = self.state.lock();
            let file = state
                .files
                .get(&request.file_id)
                .ok_or_else(|| Error::not_found("file", &request.file_id))?;
            if file.signature_id.is_some() {
                return Err(ConflictReason::AlreadySigned.into());
            }
            (Sha256Digest::of(&file.bytes), file.filename.clone())
        };

        let key = resolve_signing_key(self, request.key_id.as_deref()).await?;
        let signed = self.sign_with(&key.key_id, &digest)?;
        let now = self.clock.now();

        let mut detached = DetachedSignature::from_parts(
            signed.algorithm,
            &digest,
            &signed.public_key,
            &signed.signature,
            now,
        );
        detached.certificate_chain = signed
            .certificate_chain
            .iter()
            .map(|c| BASE64.encode(c))
            .collect();
        let artifact = detached.to_json()?.into_bytes();

        let signature_id = Uuid::new_v4().to_string();
        let signed_filename = format!("{filename}.sig");
        {
            let mut state = self.state.lock();
            let file = state
                .files
                .get_mut(&request.file_id)
                .ok_or_else(|| Error::not_found("file", &request.file_id))?;
            // Lost a race with another signer between the check and here
            if file.signature_id.is_some() {
                return Err(ConflictReason::AlreadySigned.into());
            }
            file.signature_id = Some(signature_id.clone());
            state.signatures.insert(
                signature_id.clone(),
                SignedFile {
                    bytes: artifact,
                    filename: signed_filename.clone(),
                },
            );
        }

        audit::log_hsm_file_signed(&request.file_id, &signature_id, &key.key_id);

        Ok(FileSigningResult {
            signed_file_path: format!("signed/{signature_id}/{signed_filename}"),
            signature_hash: Sha256Digest::of(&signed.signature).to_hex(),
            hsm_key_id: key.key_id,
            timestamp: now,
            signature_id,
        })
    }

    async fn download_signed_file(&self, signature_id: &str) -> Result<SignedFile> {
        self.state
            .lock()
            .signatures
            .get(signature_id)
            .cloned()
            .ok_or_else(|| Error::not_found("signature", signature_id))
    }
}
