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

//! In-memory store.
//!
//! A single mutex guards every table, so each trait method is one atomic
//! step. This is the reference implementation for tests and single-process
//! deployments.

use super::{DelegationStore, SignatureRecordStore};
use crate::error::{ConflictReason, Error, Result};
use crate::models::{
    DelegationDetails, DelegationFilter, DelegationStatus, Page, SignatureDelegation,
    SignatureRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    delegations: HashMap<Uuid, SignatureDelegation>,
    records: HashMap<Uuid, SignatureRecord>,
    records_by_document: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_status(current: &SignatureDelegation, expected: DelegationStatus) -> Result<()> {
    if current.status != expected {
        return Err(ConflictReason::StatusChanged {
            expected,
            actual: current.status,
        }
        .into());
    }
    Ok(())
}

#[async_trait]
impl DelegationStore for MemoryStore {
    async fn insert(&self, delegation: SignatureDelegation) -> Result<SignatureDelegation> {
        let mut tables = self.tables.lock();
        if tables.delegations.contains_key(&delegation.id) {
            return Err(Error::Storage(format!(
                "duplicate delegation id {}",
                delegation.id
            )));
        }
        tables
            .delegations
            .insert(delegation.id, delegation.clone());
        Ok(delegation)
    }

    async fn get(&self, id: Uuid) -> Result<Option<SignatureDelegation>> {
        Ok(self.tables.lock().delegations.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &DelegationFilter,
        page: u32,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Page<SignatureDelegation>> {
        let mut matching: Vec<SignatureDelegation> = {
            let tables = self.tables.lock();
            tables
                .delegations
                .values()
                .filter(|d| filter.matches(d, now))
                .cloned()
                .collect()
        };
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len() as u64;
        let offset = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .map(|mut d| {
                d.status = d.effective_status(now);
                d
            })
            .collect();

        Ok(Page {
            items,
            page,
            limit,
            total,
        })
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: DelegationStatus,
        new: DelegationStatus,
        at: DateTime<Utc>,
    ) -> Result<SignatureDelegation> {
        let mut tables = self.tables.lock();
        let delegation = tables
            .delegations
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("delegation", id))?;
        check_status(delegation, expected)?;
        delegation.status = new;
        delegation.updated_at = at;
        Ok(delegation.clone())
    }

    async fn update_details(
        &self,
        id: Uuid,
        expected: DelegationStatus,
        details: DelegationDetails,
        at: DateTime<Utc>,
    ) -> Result<SignatureDelegation> {
        let mut tables = self.tables.lock();
        let delegation = tables
            .delegations
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("delegation", id))?;
        check_status(delegation, expected)?;

        if let Some(reason) = details.reason {
            delegation.reason = Some(reason);
        }
        if let Some(permissions) = details.permissions {
            delegation.permissions = permissions;
        }
        if let Some(metadata) = details.metadata {
            delegation.metadata.extend(metadata);
        }
        delegation.updated_at = at;
        Ok(delegation.clone())
    }

    async fn commit_signature(
        &self,
        id: Uuid,
        expected: DelegationStatus,
        record: SignatureRecord,
        at: DateTime<Utc>,
    ) -> Result<(SignatureDelegation, SignatureRecord)> {
        let mut guard = self.tables.lock();
        let tables = &mut *guard;

        if tables.records_by_document.contains_key(&record.document_id) {
            return Err(ConflictReason::AlreadySigned.into());
        }
        let delegation = tables
            .delegations
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("delegation", id))?;
        check_status(delegation, expected)?;

        delegation.status = DelegationStatus::Signed;
        delegation.updated_at = at;
        let delegation = delegation.clone();

        tables
            .records_by_document
            .insert(record.document_id.clone(), record.signature_id);
        tables.records.insert(record.signature_id, record.clone());
        Ok((delegation, record))
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<SignatureDelegation>> {
        Ok(self
            .tables
            .lock()
            .delegations
            .values()
            .filter(|d| d.is_overdue(now))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SignatureRecordStore for MemoryStore {
    async fn get_record(&self, signature_id: Uuid) -> Result<Option<SignatureRecord>> {
        Ok(self.tables.lock().records.get(&signature_id).cloned())
    }

    async fn find_by_document(&self, document_id: &str) -> Result<Option<SignatureRecord>> {
        let tables = self.tables.lock();
        Ok(tables
            .records_by_document
            .get(document_id)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }
}
