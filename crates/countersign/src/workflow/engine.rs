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

//! Delegation workflow engine.
//!
//! Every read and every transition first applies lazy expiry: a live
//! delegation whose `end_date` has passed is moved to `expired` through the
//! store's compare-and-swap before anything else is evaluated. Permission
//! checks resolve the actor's role fresh on each call.

use super::state::next_status;
use crate::clock::Clock;
use crate::dal::DelegationStore;
use crate::error::{ConflictReason, Error, Result};
use crate::models::{
    DelegationDetails, DelegationEvent, DelegationFilter, DelegationStatus, NewDelegation, Page,
    SignatureDelegation, SignatureRecord, WorkflowType,
};
use crate::security::audit;
use crate::security::{is_allowed, Action, Module, Role, RoleDirectory, RolePermissions};
use serde_json::Map;
use std::sync::Arc;
use uuid::Uuid;

/// Capabilities granted to the delegate when the request names none.
pub fn default_delegated_permissions() -> RolePermissions {
    RolePermissions::new().grant(Module::Signatures, Action::Create)
}

/// Owns the lifecycle of [`SignatureDelegation`]s.
pub struct DelegationEngine {
    store: Arc<dyn DelegationStore>,
    roles: Arc<dyn RoleDirectory>,
    clock: Arc<dyn Clock>,
    default_list_limit: u32,
    max_list_limit: u32,
}

impl DelegationEngine {
    pub fn new(
        store: Arc<dyn DelegationStore>,
        roles: Arc<dyn RoleDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            roles,
            clock,
            default_list_limit: 50,
            max_list_limit: 500,
        }
    }

    /// Overrides the page size used when a list request names none, and the cap.
    pub fn with_list_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.max_list_limit = max_limit.max(1);
        self.default_list_limit = default_limit.clamp(1, self.max_list_limit);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Creates a pending delegation on behalf of `actor`.
    pub async fn create(&self, actor: &str, request: NewDelegation) -> Result<SignatureDelegation> {
        let document_id = request.document_id.clone();
        let result = self.create_inner(actor, request).await;
        match &result {
            Ok(d) => audit::log_delegation_created(
                d.id,
                &d.document_id,
                &d.delegator_id,
                &d.delegate_id,
                d.workflow_type,
            ),
            Err(e) => audit::log_delegation_create_rejected(actor, &document_id, &e.to_string()),
        }
        result
    }

    async fn create_inner(
        &self,
        actor: &str,
        request: NewDelegation,
    ) -> Result<SignatureDelegation> {
        let document_id = required("document_id", &request.document_id)?;
        let delegate_id = required("delegate_id", &request.delegate_id)?;
        let delegator_id = match &request.delegator_id {
            Some(id) => required("delegator_id", id)?,
            None => required("actor", actor)?,
        };
        let workflow_type = request
            .workflow_type
            .ok_or_else(|| Error::validation("workflow_type is required"))?;
        let end_date = request
            .end_date
            .ok_or_else(|| Error::validation("end_date is required"))?;

        if delegate_id == delegator_id {
            return Err(Error::validation("delegate_id must differ from delegator_id"));
        }

        let now = self.clock.now();
        if end_date <= now {
            return Err(Error::validation("end_date must be in the future"));
        }
        let start_date = request.start_date.unwrap_or(now);
        if start_date >= end_date {
            return Err(Error::validation("start_date must be before end_date"));
        }

        let actor_role = self.roles.role_of(actor).await?;
        require(&actor_role, actor, Module::Delegations, Action::Create)?;
        if workflow_type == WorkflowType::Approval {
            require(&actor_role, actor, Module::Delegations, Action::Approve)?;
        }
        if delegator_id != actor {
            require(&actor_role, actor, Module::Delegations, Action::Approve)?;
        }

        let permissions = match request.permissions {
            Some(p) if !p.is_empty() => p,
            _ => default_delegated_permissions(),
        };
        self.require_grantable(&delegator_id, &permissions).await?;

        let delegation = SignatureDelegation {
            id: Uuid::new_v4(),
            document_id,
            delegator_id,
            delegate_id,
            workflow_type,
            status: DelegationStatus::Pending,
            permissions,
            reason: request.reason,
            start_date,
            end_date,
            metadata: request.metadata.unwrap_or_else(Map::new),
            created_at: now,
            updated_at: now,
        };
        self.store.insert(delegation).await
    }

    /// Fetches a delegation, applying lazy expiry.
    pub async fn get(&self, id: Uuid) -> Result<SignatureDelegation> {
        self.load(id).await
    }

    /// Fetches a delegation on behalf of `actor`.
    ///
    /// Its two parties may always read it; anyone else needs
    /// `delegations:read`.
    pub async fn get_for(&self, id: Uuid, actor: &str) -> Result<SignatureDelegation> {
        let delegation = self.load(id).await?;
        if !delegation.involves(actor) {
            self.require_read(actor, Module::Delegations).await?;
        }
        Ok(delegation)
    }

    /// Lists delegations on behalf of `actor`.
    ///
    /// Without `delegations:read` the filter must pin the actor as delegate
    /// or delegator.
    pub async fn list_for(
        &self,
        actor: &str,
        filter: DelegationFilter,
    ) -> Result<Page<SignatureDelegation>> {
        let own = filter.delegate_id.as_deref() == Some(actor)
            || filter.delegator_id.as_deref() == Some(actor);
        if !own {
            self.require_read(actor, Module::Delegations).await?;
        }
        self.list(filter).await
    }

    /// Fails with `PermissionDenied` unless `actor` may read `module`.
    pub async fn require_read(&self, actor: &str, module: Module) -> Result<()> {
        let role = self.roles.role_of(actor).await?;
        require(&role, actor, module, Action::Read)
    }

    /// Applies `event` on behalf of `actor`.
    ///
    /// `Sign` is handled by the signing service, which must produce a
    /// signature record in the same atomic step.
    pub async fn transition(
        &self,
        id: Uuid,
        event: DelegationEvent,
        actor: &str,
    ) -> Result<SignatureDelegation> {
        if event == DelegationEvent::Sign {
            return Err(Error::validation(
                "sign transitions are performed by the signing service",
            ));
        }

        let result = self.transition_inner(id, event, actor).await;
        if let Err(e) = &result {
            audit::log_delegation_transition_rejected(id, actor, event, &e.to_string());
        }
        result
    }

    async fn transition_inner(
        &self,
        id: Uuid,
        event: DelegationEvent,
        actor: &str,
    ) -> Result<SignatureDelegation> {
        let current = self.load(id).await?;
        let next = next_status(current.status, event, current.workflow_type)?;
        self.authorize(&current, event, actor).await?;

        let updated = self
            .store
            .compare_and_swap(id, current.status, next, self.clock.now())
            .await?;
        audit::log_delegation_transitioned(id, actor, event, current.status, next);
        Ok(updated)
    }

    /// Changes reason, permissions or metadata.
    ///
    /// Metadata annotation is allowed in any state; the other fields only
    /// while the delegation is live, and only by the delegator.
    pub async fn update(
        &self,
        id: Uuid,
        actor: &str,
        details: DelegationDetails,
    ) -> Result<SignatureDelegation> {
        if details.is_empty() {
            return Err(Error::validation("no fields to update"));
        }

        let current = self.load(id).await?;
        self.check_details(&current, actor, &details).await?;

        let mut fields = Vec::new();
        if details.reason.is_some() {
            fields.push("reason");
        }
        if details.permissions.is_some() {
            fields.push("permissions");
        }
        if details.metadata.is_some() {
            fields.push("metadata");
        }

        let updated = self
            .store
            .update_details(id, current.status, details, self.clock.now())
            .await?;
        audit::log_delegation_updated(id, actor, &fields);
        Ok(updated)
    }

    /// Validates a detail update combined with an optional status change
    /// without writing either.
    ///
    /// Callers that apply both run this first, so a request whose transition
    /// would be refused leaves the details untouched as well.
    pub async fn check_change(
        &self,
        id: Uuid,
        actor: &str,
        details: &DelegationDetails,
        event: Option<DelegationEvent>,
    ) -> Result<SignatureDelegation> {
        if details.is_empty() && event.is_none() {
            return Err(Error::validation("no fields to update"));
        }

        let current = self.load(id).await?;
        if !details.is_empty() {
            self.check_details(&current, actor, details).await?;
        }
        if let Some(event) = event {
            next_status(current.status, event, current.workflow_type)?;
            if event == DelegationEvent::Sign && self.clock.now() < current.start_date {
                return Err(ConflictReason::NotYetValid.into());
            }
            self.authorize(&current, event, actor).await?;
        }
        Ok(current)
    }

    /// Lists delegations, newest first. Does not write.
    pub async fn list(&self, filter: DelegationFilter) -> Result<Page<SignatureDelegation>> {
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter
            .limit
            .unwrap_or(self.default_list_limit)
            .clamp(1, self.max_list_limit);
        self.store.list(&filter, page, limit, self.clock.now()).await
    }

    /// Moves every overdue live delegation to `expired`. Returns how many moved.
    pub async fn expire_overdue(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut expired = 0;
        for delegation in self.store.find_overdue(now).await? {
            match self
                .store
                .compare_and_swap(delegation.id, delegation.status, DelegationStatus::Expired, now)
                .await
            {
                Ok(_) => {
                    audit::log_delegation_expired(delegation.id, delegation.status, false);
                    expired += 1;
                }
                // Someone else moved it first.
                Err(Error::Conflict(ConflictReason::StatusChanged { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    /// Checks that `actor` may sign delegation `id` now.
    ///
    /// Returns the delegation as read; its status is the expectation the
    /// later [`commit_sign`](Self::commit_sign) swaps against.
    pub async fn authorize_sign(&self, id: Uuid, actor: &str) -> Result<SignatureDelegation> {
        let result = self.authorize_sign_inner(id, actor).await;
        if let Err(e) = &result {
            audit::log_delegation_transition_rejected(
                id,
                actor,
                DelegationEvent::Sign,
                &e.to_string(),
            );
        }
        result
    }

    async fn authorize_sign_inner(&self, id: Uuid, actor: &str) -> Result<SignatureDelegation> {
        let current = self.load(id).await?;
        next_status(current.status, DelegationEvent::Sign, current.workflow_type)?;
        if self.clock.now() < current.start_date {
            return Err(ConflictReason::NotYetValid.into());
        }
        self.authorize(&current, DelegationEvent::Sign, actor).await?;
        Ok(current)
    }

    /// Persists `record` and closes the delegation as `signed`, atomically.
    pub async fn commit_sign(
        &self,
        authorized: &SignatureDelegation,
        actor: &str,
        record: SignatureRecord,
    ) -> Result<(SignatureDelegation, SignatureRecord)> {
        let now = self.clock.now();
        if authorized.is_overdue(now) {
            self.coerce_expired(authorized).await?;
            return Err(ConflictReason::Expired.into());
        }

        let committed = self
            .store
            .commit_signature(authorized.id, authorized.status, record, now)
            .await?;
        audit::log_delegation_transitioned(
            authorized.id,
            actor,
            DelegationEvent::Sign,
            authorized.status,
            DelegationStatus::Signed,
        );
        Ok(committed)
    }

    /// Reads a delegation and persists expiry if its window has closed.
    async fn load(&self, id: Uuid) -> Result<SignatureDelegation> {
        let delegation = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("delegation", id))?;

        if delegation.is_overdue(self.clock.now()) {
            return self.coerce_expired(&delegation).await;
        }
        Ok(delegation)
    }

    async fn coerce_expired(
        &self,
        delegation: &SignatureDelegation,
    ) -> Result<SignatureDelegation> {
        match self
            .store
            .compare_and_swap(
                delegation.id,
                delegation.status,
                DelegationStatus::Expired,
                self.clock.now(),
            )
            .await
        {
            Ok(expired) => {
                audit::log_delegation_expired(delegation.id, delegation.status, true);
                Ok(expired)
            }
            // Lost the race; whatever is stored now is authoritative.
            Err(Error::Conflict(ConflictReason::StatusChanged { .. })) => self
                .store
                .get(delegation.id)
                .await?
                .ok_or_else(|| Error::not_found("delegation", delegation.id)),
            Err(e) => Err(e),
        }
    }

    async fn authorize(
        &self,
        delegation: &SignatureDelegation,
        event: DelegationEvent,
        actor: &str,
    ) -> Result<()> {
        let role = self.roles.role_of(actor).await?;
        let allowed = match event {
            DelegationEvent::Approve => {
                actor != delegation.delegate_id && role.allows(Module::Delegations, Action::Approve)
            }
            DelegationEvent::Reject => {
                actor == delegation.delegator_id
                    || role.allows(Module::Delegations, Action::Approve)
            }
            DelegationEvent::Cancel => actor == delegation.delegator_id || role.is_admin,
            DelegationEvent::Sign => {
                actor == delegation.delegate_id
                    && is_allowed(
                        &role.permissions.merged(&delegation.permissions),
                        Module::Signatures,
                        Action::Create,
                    )
            }
        };

        if allowed {
            Ok(())
        } else {
            let (module, action) = match event {
                DelegationEvent::Sign => (Module::Signatures, Action::Create),
                DelegationEvent::Cancel => (Module::Delegations, Action::Delete),
                DelegationEvent::Approve | DelegationEvent::Reject => {
                    (Module::Delegations, Action::Approve)
                }
            };
            Err(Error::permission_denied(actor, action, module))
        }
    }

    /// Metadata annotation is open to both parties in any state; reason and
    /// permissions only to editors while the delegation is live.
    async fn check_details(
        &self,
        current: &SignatureDelegation,
        actor: &str,
        details: &DelegationDetails,
    ) -> Result<()> {
        let role = self.roles.role_of(actor).await?;
        let may_edit =
            actor == current.delegator_id || role.allows(Module::Delegations, Action::Update);

        if details.touches_terms() {
            if current.status.is_terminal() {
                return Err(match current.status {
                    DelegationStatus::Expired => ConflictReason::Expired,
                    status => ConflictReason::Terminal(status),
                }
                .into());
            }
            if !may_edit {
                return Err(Error::permission_denied(
                    actor,
                    Action::Update,
                    Module::Delegations,
                ));
            }
            if let Some(permissions) = &details.permissions {
                self.require_grantable(&current.delegator_id, permissions).await?;
            }
        } else if !(may_edit || actor == current.delegate_id) {
            return Err(Error::permission_denied(
                actor,
                Action::Update,
                Module::Delegations,
            ));
        }
        Ok(())
    }

    /// The delegator may only hand out capabilities they hold themselves.
    async fn require_grantable(
        &self,
        delegator_id: &str,
        permissions: &RolePermissions,
    ) -> Result<()> {
        let delegator_role = self.roles.role_of(delegator_id).await?;
        match permissions
            .granted()
            .find(|(m, a)| !delegator_role.allows(*m, *a))
        {
            Some((module, action)) => Err(Error::permission_denied(delegator_id, action, module)),
            None => Ok(()),
        }
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn require(role: &Role, actor: &str, module: Module, action: Action) -> Result<()> {
    if role.allows(module, action) {
        Ok(())
    } else {
        Err(Error::permission_denied(actor, action, module))
    }
}
