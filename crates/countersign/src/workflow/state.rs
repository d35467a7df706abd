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

//! The delegation state machine.
//!
//! ```text
//! pending --approve--> approved        (approval workflow only)
//! pending --sign-----> signed          (delegation workflow only)
//! approved --sign----> signed
//! pending|approved --reject--> rejected
//! pending|approved --cancel--> cancelled
//! pending|approved --(end_date passes)--> expired
//! ```
//!
//! [`next_status`] only answers whether the current state permits an event.
//! Actor checks live in the engine.

use crate::error::ConflictReason;
use crate::models::{DelegationEvent, DelegationStatus, WorkflowType};

/// Returns the status `event` leads to from `current`.
pub fn next_status(
    current: DelegationStatus,
    event: DelegationEvent,
    workflow_type: WorkflowType,
) -> Result<DelegationStatus, ConflictReason> {
    use DelegationEvent as E;
    use DelegationStatus as S;

    match (current, event) {
        (S::Expired, _) => Err(ConflictReason::Expired),
        (status, _) if status.is_terminal() => Err(ConflictReason::Terminal(status)),

        (S::Pending, E::Approve) if workflow_type == WorkflowType::Approval => Ok(S::Approved),
        (S::Pending, E::Sign) if workflow_type == WorkflowType::Delegation => Ok(S::Signed),
        (S::Pending, E::Sign) => Err(ConflictReason::NotApproved),
        (S::Approved, E::Sign) => Ok(S::Signed),
        (S::Pending | S::Approved, E::Reject) => Ok(S::Rejected),
        (S::Pending | S::Approved, E::Cancel) => Ok(S::Cancelled),

        (from, event) => Err(ConflictReason::InvalidTransition {
            from,
            event: event.as_str(),
        }),
    }
}
