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

//! Signature assembly.
//!
//! Turns document bytes into a [`SignatureRecord`]:
//!
//! 1. SHA-256 over the canonical document bytes
//! 2. the backend signs the digest
//! 3. the signature is checked against the returned public key
//! 4. optionally, the TSA timestamps SHA-256 of the signature bytes
//!
//! The record is only built once every required step succeeded. Nothing is
//! persisted here; committing the record is the caller's job.

use super::backend::SigningBackend;
use crate::crypto::{DigestAlgorithm, PublicKey, Sha256Digest};
use crate::error::{CryptoError, Error, Result};
use crate::models::{SignatureRecord, SignerInfo};
use crate::security::audit;
use crate::timestamp::TimestampAuthority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Whether a signature must, may, or will not carry a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    Disabled,
    /// Timestamp when the TSA answers; otherwise commit without one.
    #[default]
    BestEffort,
    /// Fail the signing operation if no timestamp can be obtained.
    Required,
}

/// What happened to the timestamp for one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampOutcome {
    NotRequested,
    Attached,
    /// Best-effort timestamping failed; the signature has none.
    Unavailable { reason: String },
}

/// Input to [`SignatureAssembler::assemble`].
#[derive(Debug, Clone)]
pub struct AssemblyRequest<'a> {
    pub document_id: &'a str,
    pub document: &'a [u8],
    pub delegation_id: Option<Uuid>,
    pub signer_info: SignerInfo,
    /// Overrides the assembler's default policy for this call
    pub timestamp_policy: Option<TimestampPolicy>,
}

/// A built, not yet persisted, signature.
#[derive(Debug, Clone)]
pub struct AssembledSignature {
    pub record: SignatureRecord,
    pub timestamp: TimestampOutcome,
}

/// Backend-agnostic signature builder.
pub struct SignatureAssembler {
    tsa: Option<Arc<dyn TimestampAuthority>>,
    default_policy: TimestampPolicy,
}

impl SignatureAssembler {
    pub fn new(tsa: Option<Arc<dyn TimestampAuthority>>, default_policy: TimestampPolicy) -> Self {
        Self {
            tsa,
            default_policy,
        }
    }

    /// An assembler that never timestamps.
    pub fn without_timestamps() -> Self {
        Self::new(None, TimestampPolicy::Disabled)
    }

    pub fn default_policy(&self) -> TimestampPolicy {
        self.default_policy
    }

    pub async fn assemble(
        &self,
        backend: &dyn SigningBackend,
        request: AssemblyRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<AssembledSignature> {
        let policy = request.timestamp_policy.unwrap_or(self.default_policy);
        if policy == TimestampPolicy::Required && self.tsa.is_none() {
            return Err(Error::validation(
                "a trusted timestamp is required but no timestamp authority is configured",
            ));
        }
        if request.signer_info.name.trim().is_empty() {
            return Err(Error::validation("signer name is required"));
        }

        let digest = Sha256Digest::of(request.document);
        let signed = backend.sign(&digest).await?;

        PublicKey::from_spki_der(&signed.public_key)?
            .verify_prehash(&digest, &signed.signature)
            .map_err(|_| {
                CryptoError::SigningFailed(format!(
                    "{} backend returned a signature that does not verify",
                    backend.name()
                ))
            })?;

        let (timestamp_token, timestamp) = self
            .timestamp(policy, request.document_id, &signed.signature)
            .await?;

        let record = SignatureRecord {
            signature_id: Uuid::new_v4(),
            document_id: request.document_id.to_string(),
            delegation_id: request.delegation_id,
            signer_info: request.signer_info,
            digest_algorithm: DigestAlgorithm::Sha256,
            document_digest: digest.to_hex(),
            signature_algorithm: signed.algorithm,
            signature_bytes: signed.signature,
            certificate_chain: signed.certificate_chain,
            signer_public_key: signed.public_key,
            timestamp_token,
            created_at: now,
        };

        tracing::debug!(
            document_id = %record.document_id,
            backend = backend.name(),
            algorithm = %record.signature_algorithm,
            timestamped = record.has_timestamp(),
            "Signature assembled"
        );
        Ok(AssembledSignature { record, timestamp })
    }

    async fn timestamp(
        &self,
        policy: TimestampPolicy,
        document_id: &str,
        signature: &[u8],
    ) -> Result<(Option<Vec<u8>>, TimestampOutcome)> {
        let tsa = match (&self.tsa, policy) {
            (_, TimestampPolicy::Disabled) | (None, _) => {
                return Ok((None, TimestampOutcome::NotRequested))
            }
            (Some(tsa), _) => tsa,
        };

        match tsa.timestamp(&Sha256Digest::of(signature)).await {
            Ok(token) => Ok((Some(token), TimestampOutcome::Attached)),
            Err(e) if policy == TimestampPolicy::BestEffort => {
                let reason = e.to_string();
                audit::log_timestamp_degraded(document_id, &reason);
                Ok((None, TimestampOutcome::Unavailable { reason }))
            }
            Err(e) => Err(e.into()),
        }
    }
}
