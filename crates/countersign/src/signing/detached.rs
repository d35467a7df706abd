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

//! Detached signature file format.
//!
//! A JSON document that can travel next to the signed file and be verified
//! without access to the signing service.

use crate::crypto::{compute_key_fingerprint, PublicKey, Sha256Digest, SignatureAlgorithm};
use crate::error::{CryptoError, Error, Result};
use crate::models::SignatureRecord;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Detached signature file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSignature {
    /// Format version (currently 1)
    pub version: u32,
    /// Signature algorithm name, e.g. `sha256WithRSAEncryption`
    pub algorithm: String,
    /// Digest algorithm name (currently "sha256")
    pub digest_algorithm: String,
    /// SHA256 hex hash of the document
    pub document_hash: String,
    /// SHA256 hex fingerprint of the signer's SubjectPublicKeyInfo
    pub key_fingerprint: String,
    /// Base64 DER SubjectPublicKeyInfo
    pub public_key: String,
    /// Base64 signature bytes
    pub signature: String,
    /// Base64 DER certificates, end-entity first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_chain: Vec<String>,
    /// Base64 timestamp token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_token: Option<String>,
    /// RFC 3339 time of signing
    pub signed_at: String,
}

impl DetachedSignature {
    pub const VERSION: u32 = 1;

    /// Builds a detached signature from its raw parts.
    pub fn from_parts(
        algorithm: SignatureAlgorithm,
        document_hash: &Sha256Digest,
        public_key: &[u8],
        signature: &[u8],
        signed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: Self::VERSION,
            algorithm: algorithm.name().to_string(),
            digest_algorithm: "sha256".to_string(),
            document_hash: document_hash.to_hex(),
            key_fingerprint: compute_key_fingerprint(public_key),
            public_key: BASE64.encode(public_key),
            signature: BASE64.encode(signature),
            certificate_chain: Vec::new(),
            timestamp_token: None,
            signed_at: signed_at.to_rfc3339(),
        }
    }

    /// Exports a committed signature record.
    pub fn from_record(record: &SignatureRecord) -> Self {
        Self {
            version: Self::VERSION,
            algorithm: record.signature_algorithm.name().to_string(),
            digest_algorithm: record.digest_algorithm.name().to_string(),
            document_hash: record.document_digest.clone(),
            key_fingerprint: compute_key_fingerprint(&record.signer_public_key),
            public_key: BASE64.encode(&record.signer_public_key),
            signature: BASE64.encode(&record.signature_bytes),
            certificate_chain: record
                .certificate_chain
                .iter()
                .map(|c| BASE64.encode(c))
                .collect(),
            timestamp_token: record.timestamp_token.as_ref().map(|t| BASE64.encode(t)),
            signed_at: record.created_at.to_rfc3339(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::validation(format!("invalid detached signature: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Storage(e.to_string()))
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        BASE64
            .decode(&self.signature)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    /// Checks `document` against this signature and its embedded key.
    ///
    /// Only the signature is checked. Trust in the key is up to the caller,
    /// who can compare `key_fingerprint` against a known value.
    pub fn verify(&self, document: &[u8]) -> Result<(), CryptoError> {
        let digest = Sha256Digest::of(document);
        if digest.to_hex() != self.document_hash {
            return Err(CryptoError::VerificationFailed);
        }
        let spki = BASE64
            .decode(&self.public_key)
            .map_err(|_| CryptoError::VerificationFailed)?;
        if compute_key_fingerprint(&spki) != self.key_fingerprint {
            return Err(CryptoError::VerificationFailed);
        }
        PublicKey::from_spki_der(&spki)?.verify_prehash(&digest, &self.signature_bytes()?)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .map_err(|e| Error::Storage(format!("writing {}: {e}", path.display())))
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Storage(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}
