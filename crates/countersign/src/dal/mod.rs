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

//! Data access layer.
//!
//! Persistence is an external collaborator; this module defines the contract
//! the workflow engine and signing service rely on. Status changes go through
//! [`DelegationStore::compare_and_swap`] or
//! [`DelegationStore::commit_signature`], never through direct field writes.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{
    DelegationDetails, DelegationFilter, DelegationStatus, Page, SignatureDelegation,
    SignatureRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage for delegation rows.
#[async_trait]
pub trait DelegationStore: Send + Sync {
    /// Inserts a new delegation.
    async fn insert(&self, delegation: SignatureDelegation) -> Result<SignatureDelegation>;

    async fn get(&self, id: Uuid) -> Result<Option<SignatureDelegation>>;

    /// Lists delegations matching `filter` as observed at `now`, newest first.
    ///
    /// Expiry that has not been persisted yet is reflected in the returned
    /// statuses but not written.
    async fn list(
        &self,
        filter: &DelegationFilter,
        page: u32,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Page<SignatureDelegation>>;

    /// Sets `status` to `new` only if it is currently `expected`.
    ///
    /// Fails with `Conflict(StatusChanged)` when another writer got there
    /// first, `NotFound` if the row does not exist.
    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: DelegationStatus,
        new: DelegationStatus,
        at: DateTime<Utc>,
    ) -> Result<SignatureDelegation>;

    /// Applies detail changes only if the status is still `expected`.
    async fn update_details(
        &self,
        id: Uuid,
        expected: DelegationStatus,
        details: DelegationDetails,
        at: DateTime<Utc>,
    ) -> Result<SignatureDelegation>;

    /// Writes `record` and moves the delegation from `expected` to `signed`.
    ///
    /// This operation is transactional: the signature record and the status
    /// change are written atomically. Fails with `Conflict(AlreadySigned)` if
    /// the document already has a signature record.
    async fn commit_signature(
        &self,
        id: Uuid,
        expected: DelegationStatus,
        record: SignatureRecord,
        at: DateTime<Utc>,
    ) -> Result<(SignatureDelegation, SignatureRecord)>;

    /// Non-terminal delegations whose window closed before `now`.
    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<SignatureDelegation>>;
}

/// Read access to committed signature records.
#[async_trait]
pub trait SignatureRecordStore: Send + Sync {
    async fn get_record(&self, signature_id: Uuid) -> Result<Option<SignatureRecord>>;

    async fn find_by_document(&self, document_id: &str) -> Result<Option<SignatureRecord>>;
}
