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

//! HSM signing client.
//!
//! [`HsmService`] is the boundary to a hardware security module: keys are
//! generated and used inside it and only metadata and public keys come out.
//! [`HttpHsmClient`] talks to a remote HSM over HTTP; [`InMemoryHsm`] is a
//! software boundary with the same contract.
//!
//! # Default key selection
//!
//! When a file signing request names no key, [`select_default_key`] picks
//! one deterministically: among keys that are `active` with usage `sign` or
//! `both`, RSA keys win over EC keys, then the earliest `createdAt`, then the
//! lexicographically smallest `keyId`.

mod client;
mod memory;

pub use client::HttpHsmClient;
pub use memory::InMemoryHsm;

use crate::crypto::{Sha256Digest, SignatureAlgorithm};
use crate::error::{ConflictReason, Error, Result};
use crate::models::{
    HsmKey, KeyFilter, KeyGenerationParams, KeyStatus, KeyType, Page, SignerInfo,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Largest page requested when scanning all keys.
const KEY_SCAN_PAGE: u32 = 100;

/// Request to sign a stored file inside the HSM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSigningRequest {
    pub file_id: String,
    /// `None` selects a key with [`select_default_key`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    pub signer_info: SignerInfo,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Outcome of signing a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSigningResult {
    pub signature_id: String,
    pub signed_file_path: String,
    /// SHA256 hex of the signature bytes
    pub signature_hash: String,
    pub hsm_key_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A downloaded signed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedFile {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Raw signature over a digest, produced inside the HSM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HsmSignature {
    pub key_id: String,
    pub signature: Vec<u8>,
    pub algorithm: SignatureAlgorithm,
    /// DER certificates for the key, end-entity first. May be empty.
    pub certificate_chain: Vec<Vec<u8>>,
    /// DER SubjectPublicKeyInfo of the key
    pub public_key: Vec<u8>,
}

/// Operations offered by an HSM.
#[async_trait]
pub trait HsmService: Send + Sync {
    async fn list_keys(&self, filter: &KeyFilter) -> Result<Page<HsmKey>>;

    /// Generates a key owned by `owner`. Private material never leaves the HSM.
    async fn generate_key(&self, owner: &str, params: KeyGenerationParams) -> Result<HsmKey>;

    async fn get_key(&self, key_id: &str) -> Result<HsmKey>;

    /// Revokes a key. Revocation is terminal.
    async fn revoke_key(&self, key_id: &str) -> Result<HsmKey>;

    /// Signs a SHA-256 digest with `key_id`.
    async fn sign_digest(&self, key_id: &str, digest: &Sha256Digest) -> Result<HsmSignature>;

    /// Signs a stored file. Fails with `Conflict(AlreadySigned)` if the file
    /// was signed before.
    async fn sign_file(&self, request: FileSigningRequest) -> Result<FileSigningResult>;

    async fn download_signed_file(&self, signature_id: &str) -> Result<SignedFile>;
}

/// Picks the default signing key. See the module docs for the ordering.
pub fn select_default_key(keys: &[HsmKey]) -> Option<&HsmKey> {
    keys.iter()
        .filter(|k| k.is_signing_capable())
        .min_by(|a, b| {
            (a.key_type != KeyType::Rsa, a.created_at, &a.key_id).cmp(&(
                b.key_type != KeyType::Rsa,
                b.created_at,
                &b.key_id,
            ))
        })
}

/// Fails unless `key` may produce signatures.
pub fn ensure_signing_capable(key: &HsmKey) -> Result<()> {
    match key.status {
        KeyStatus::Revoked => return Err(ConflictReason::KeyRevoked.into()),
        KeyStatus::Inactive => return Err(ConflictReason::KeyInactive.into()),
        KeyStatus::Active => {}
    }
    if !key.usage.can_sign() {
        return Err(ConflictReason::KeyNotForSigning.into());
    }
    Ok(())
}

/// Resolves the key a signing request will use.
///
/// A named key must exist and be signing-capable; otherwise every active key
/// is scanned and [`select_default_key`] decides.
pub async fn resolve_signing_key<S: HsmService + ?Sized>(
    hsm: &S,
    key_id: Option<&str>,
) -> Result<HsmKey> {
    if let Some(key_id) = key_id {
        let key = hsm.get_key(key_id).await?;
        ensure_signing_capable(&key)?;
        return Ok(key);
    }

    let mut candidates = Vec::new();
    let mut page = 1;
    loop {
        let filter = KeyFilter {
            status: Some(KeyStatus::Active),
            key_type: None,
            page: Some(page),
            limit: Some(KEY_SCAN_PAGE),
        };
        let batch = hsm.list_keys(&filter).await?;
        let fetched = batch.items.len();
        candidates.extend(batch.items);
        if fetched < KEY_SCAN_PAGE as usize || candidates.len() as u64 >= batch.total {
            break;
        }
        page += 1;
    }

    select_default_key(&candidates)
        .cloned()
        .ok_or_else(|| Error::not_found("signing key", "default"))
}
