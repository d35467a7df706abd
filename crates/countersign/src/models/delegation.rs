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

//! Domain models for signature delegations.
//!
//! A delegation routes one document from a delegator to a delegate who will
//! sign it. Its status only changes through the workflow engine.

use crate::security::permissions::RolePermissions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// How the delegate obtains signing rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// The delegate may sign immediately.
    Delegation,
    /// The delegator must approve before the delegate may sign.
    Approval,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::Delegation => "delegation",
            WorkflowType::Approval => "approval",
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Pending,
    Approved,
    Rejected,
    Signed,
    Expired,
    Cancelled,
}

impl DelegationStatus {
    /// Terminal states accept no further status changes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DelegationStatus::Signed
                | DelegationStatus::Rejected
                | DelegationStatus::Expired
                | DelegationStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationStatus::Pending => "pending",
            DelegationStatus::Approved => "approved",
            DelegationStatus::Rejected => "rejected",
            DelegationStatus::Signed => "signed",
            DelegationStatus::Expired => "expired",
            DelegationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain model for a signature delegation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureDelegation {
    pub id: Uuid,
    pub document_id: String,
    pub delegator_id: String,
    pub delegate_id: String,
    pub workflow_type: WorkflowType,
    pub status: DelegationStatus,
    /// Capabilities granted to the delegate for this document
    pub permissions: RolePermissions,
    pub reason: Option<String>,
    /// Start of the validity window
    pub start_date: DateTime<Utc>,
    /// End of the validity window (exclusive of any later instant)
    pub end_date: DateTime<Utc>,
    /// Opaque annotations (signature drafts, audit notes)
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SignatureDelegation {
    /// Whether `actor` is the delegator or the delegate.
    pub fn involves(&self, actor: &str) -> bool {
        self.delegator_id == actor || self.delegate_id == actor
    }

    /// True when the validity window has closed on a live delegation.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now > self.end_date
    }

    /// Status as observed at `now`, accounting for expiry not yet persisted.
    pub fn effective_status(&self, now: DateTime<Utc>) -> DelegationStatus {
        if self.is_overdue(now) {
            DelegationStatus::Expired
        } else {
            self.status
        }
    }
}

/// Request to create a delegation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDelegation {
    /// Required; left empty when absent so creation reports it
    #[serde(default)]
    pub document_id: String,
    /// Defaults to the acting principal
    #[serde(default)]
    pub delegator_id: Option<String>,
    #[serde(default)]
    pub delegate_id: String,
    #[serde(default)]
    pub workflow_type: Option<WorkflowType>,
    #[serde(default)]
    pub permissions: Option<RolePermissions>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Non-status fields that may change after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelegationDetails {
    pub reason: Option<String>,
    pub permissions: Option<RolePermissions>,
    /// Shallow-merged into the existing metadata
    pub metadata: Option<Map<String, Value>>,
}

impl DelegationDetails {
    pub fn is_empty(&self) -> bool {
        self.reason.is_none() && self.permissions.is_none() && self.metadata.is_none()
    }

    /// True if anything other than metadata would change.
    pub fn touches_terms(&self) -> bool {
        self.reason.is_some() || self.permissions.is_some()
    }
}

/// Filters for listing delegations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationFilter {
    pub delegate_id: Option<String>,
    pub delegator_id: Option<String>,
    pub status: Option<DelegationStatus>,
    pub document_id: Option<String>,
    /// 1-based page number
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl DelegationFilter {
    /// Whether `delegation` matches every set filter, judged at `now`.
    pub fn matches(&self, delegation: &SignatureDelegation, now: DateTime<Utc>) -> bool {
        self.delegate_id
            .as_ref()
            .map_or(true, |d| *d == delegation.delegate_id)
            && self
                .delegator_id
                .as_ref()
                .map_or(true, |d| *d == delegation.delegator_id)
            && self
                .document_id
                .as_ref()
                .map_or(true, |d| *d == delegation.document_id)
            && self
                .status
                .map_or(true, |s| s == delegation.effective_status(now))
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Events that drive the delegation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationEvent {
    Approve,
    Sign,
    Reject,
    Cancel,
}

impl DelegationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationEvent::Approve => "approve",
            DelegationEvent::Sign => "sign",
            DelegationEvent::Reject => "reject",
            DelegationEvent::Cancel => "cancel",
        }
    }

    /// Maps a requested target status onto the event that produces it.
    pub fn for_target(status: DelegationStatus) -> Option<Self> {
        match status {
            DelegationStatus::Approved => Some(DelegationEvent::Approve),
            DelegationStatus::Signed => Some(DelegationEvent::Sign),
            DelegationStatus::Rejected => Some(DelegationEvent::Reject),
            DelegationStatus::Cancelled => Some(DelegationEvent::Cancel),
            DelegationStatus::Pending | DelegationStatus::Expired => None,
        }
    }
}

impl fmt::Display for DelegationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
