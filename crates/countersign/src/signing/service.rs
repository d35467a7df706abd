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

//! Signing service.
//!
//! Drives one signing attempt for a delegation:
//!
//! 1. take the per-document lock (fails fast if another attempt holds it)
//! 2. authorize the delegate against the current delegation state
//! 3. refuse if the document already has a signature record
//! 4. fetch the document and assemble the signature
//! 5. commit the record and the `signed` transition atomically
//!
//! Any failure before step 5 leaves the delegation untouched. The lock guard
//! lives on the stack of this call, so it is released on every exit path,
//! including cancellation, which drops the in-flight future.

use super::assembler::{AssemblyRequest, SignatureAssembler, TimestampOutcome, TimestampPolicy};
use super::backend::SigningBackend;
use super::cancel::run_cancellable;
use super::documents::DocumentSource;
use super::locks::DocumentLocks;
use crate::dal::SignatureRecordStore;
use crate::error::{ConflictReason, Error, Result};
use crate::models::{SignatureDelegation, SignatureRecord, SignerInfo};
use crate::security::{audit, Module};
use crate::workflow::DelegationEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-call signing options.
#[derive(Debug, Clone, Default)]
pub struct SignRequest {
    pub signer_info: SignerInfo,
    /// `None` uses the assembler's default policy
    pub timestamp_policy: Option<TimestampPolicy>,
}

/// A committed signature and the delegation it closed.
#[derive(Debug, Clone)]
pub struct SignOutcome {
    pub delegation: SignatureDelegation,
    pub record: SignatureRecord,
    pub timestamp: TimestampOutcome,
}

pub struct SigningService {
    engine: Arc<DelegationEngine>,
    records: Arc<dyn SignatureRecordStore>,
    documents: Arc<dyn DocumentSource>,
    assembler: SignatureAssembler,
    locks: DocumentLocks,
}

impl SigningService {
    pub fn new(
        engine: Arc<DelegationEngine>,
        records: Arc<dyn SignatureRecordStore>,
        documents: Arc<dyn DocumentSource>,
        assembler: SignatureAssembler,
    ) -> Self {
        Self {
            engine,
            records,
            documents,
            assembler,
            locks: DocumentLocks::new(),
        }
    }

    pub fn engine(&self) -> &Arc<DelegationEngine> {
        &self.engine
    }

    pub fn locks(&self) -> &DocumentLocks {
        &self.locks
    }

    /// Signs the document of delegation `delegation_id` as `actor`.
    pub async fn sign_delegation(
        &self,
        delegation_id: Uuid,
        actor: &str,
        backend: &dyn SigningBackend,
        request: SignRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<SignOutcome> {
        let delegation = self.engine.get(delegation_id).await?;
        let document_id = delegation.document_id.clone();

        let result = self
            .sign_locked(delegation_id, actor, backend, request, cancel, &document_id)
            .await;
        match &result {
            Ok(outcome) => audit::log_signature_created(
                outcome.record.signature_id,
                &outcome.record.document_id,
                actor,
                &outcome.record.document_digest,
                outcome.record.has_timestamp(),
            ),
            Err(e) => audit::log_signature_failed(&document_id, actor, &e.to_string()),
        }
        result
    }

    async fn sign_locked(
        &self,
        delegation_id: Uuid,
        actor: &str,
        backend: &dyn SigningBackend,
        request: SignRequest,
        cancel: Option<&CancellationToken>,
        document_id: &str,
    ) -> Result<SignOutcome> {
        let _guard = self.locks.try_lock(document_id)?;

        let authorized = self.engine.authorize_sign(delegation_id, actor).await?;
        if self.records.find_by_document(document_id).await?.is_some() {
            return Err(ConflictReason::AlreadySigned.into());
        }

        let assembled = run_cancellable(cancel, async {
            let document = self.documents.fetch(document_id).await?;
            self.assembler
                .assemble(
                    backend,
                    AssemblyRequest {
                        document_id,
                        document: &document,
                        delegation_id: Some(delegation_id),
                        signer_info: request.signer_info,
                        timestamp_policy: request.timestamp_policy,
                    },
                    self.engine.clock().now(),
                )
                .await
        })
        .await?;

        // Last point at which a cancel can still leave no trace
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }

        let (delegation, record) = self
            .engine
            .commit_sign(&authorized, actor, assembled.record)
            .await?;
        Ok(SignOutcome {
            delegation,
            record,
            timestamp: assembled.timestamp,
        })
    }

    pub async fn get_record(&self, signature_id: Uuid) -> Result<SignatureRecord> {
        self.records
            .get_record(signature_id)
            .await?
            .ok_or_else(|| Error::not_found("signature", signature_id))
    }

    /// Fetches a signature record on behalf of `actor`.
    ///
    /// The parties to the delegation it closed may read it; anyone else
    /// needs `signatures:read`.
    pub async fn get_record_for(
        &self,
        signature_id: Uuid,
        actor: &str,
    ) -> Result<SignatureRecord> {
        let record = self.get_record(signature_id).await?;
        let party = match record.delegation_id {
            Some(id) => self.engine.get(id).await?.involves(actor),
            None => false,
        };
        if !party {
            self.engine.require_read(actor, Module::Signatures).await?;
        }
        Ok(record)
    }
}
