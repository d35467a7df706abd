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

//! Capability-based permission checks.
//!
//! A role carries a per-module table of booleans for the five actions. The
//! gate itself is [`is_allowed`]: a pure lookup with default-deny semantics.
//! Roles are resolved through a [`RoleDirectory`] on every call so changes to
//! a principal's role take effect on the next request.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Resource area a permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Documents,
    Signatures,
    Delegations,
    HsmKeys,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Documents => "documents",
            Module::Signatures => "signatures",
            Module::Delegations => "delegations",
            Module::HsmKeys => "hsm_keys",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Approve,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Approve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Approve => "approve",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action flags for one module. Missing flags deserialize as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulePermissions {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
    pub approve: bool,
}

impl ModulePermissions {
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Create => self.create,
            Action::Read => self.read,
            Action::Update => self.update,
            Action::Delete => self.delete,
            Action::Approve => self.approve,
        }
    }

    fn set(&mut self, action: Action) {
        match action {
            Action::Create => self.create = true,
            Action::Read => self.read = true,
            Action::Update => self.update = true,
            Action::Delete => self.delete = true,
            Action::Approve => self.approve = true,
        }
    }

    fn union(self, other: Self) -> Self {
        Self {
            create: self.create || other.create,
            read: self.read || other.read,
            update: self.update || other.update,
            delete: self.delete || other.delete,
            approve: self.approve || other.approve,
        }
    }

    fn is_empty(&self) -> bool {
        !Action::ALL.iter().any(|a| self.allows(*a))
    }
}

/// Capability set keyed by module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolePermissions(BTreeMap<Module, ModulePermissions>);

impl RolePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style grant of a single action.
    pub fn grant(mut self, module: Module, action: Action) -> Self {
        self.0.entry(module).or_default().set(action);
        self
    }

    pub fn module(&self, module: Module) -> Option<&ModulePermissions> {
        self.0.get(&module)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(ModulePermissions::is_empty)
    }

    /// Union of two capability sets.
    pub fn merged(&self, other: &RolePermissions) -> RolePermissions {
        let mut out = self.0.clone();
        for (module, perms) in &other.0 {
            let entry = out.entry(*module).or_default();
            *entry = entry.union(*perms);
        }
        RolePermissions(out)
    }

    /// True when every action granted here is also granted by `other`.
    pub fn is_subset_of(&self, other: &RolePermissions) -> bool {
        self.granted().all(|(m, a)| is_allowed(other, m, a))
    }

    /// Iterates over every `(module, action)` pair that is granted.
    pub fn granted(&self) -> impl Iterator<Item = (Module, Action)> + '_ {
        self.0.iter().flat_map(|(module, perms)| {
            Action::ALL
                .iter()
                .filter(move |a| perms.allows(**a))
                .map(move |a| (*module, *a))
        })
    }
}

/// Decide whether `permissions` grants `action` on `module`.
///
/// Absence of an explicit grant is a denial.
pub fn is_allowed(permissions: &RolePermissions, module: Module, action: Action) -> bool {
    permissions
        .module(module)
        .map(|m| m.allows(action))
        .unwrap_or(false)
}

/// A named capability set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub permissions: RolePermissions,
}

impl Role {
    /// The role of a principal nobody has heard of. Grants nothing.
    pub fn anonymous() -> Self {
        Self {
            name: "anonymous".to_string(),
            ..Default::default()
        }
    }

    pub fn allows(&self, module: Module, action: Action) -> bool {
        is_allowed(&self.permissions, module, action)
    }
}

/// Resolves the current role of a principal.
///
/// Implementations must not cache across calls.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn role_of(&self, actor_id: &str) -> Result<Role>;
}

/// Role directory backed by in-memory tables that can be edited at runtime.
#[derive(Debug, Default)]
pub struct StaticRoleDirectory {
    roles: RwLock<HashMap<String, Role>>,
    assignments: RwLock<HashMap<String, String>>,
}

impl StaticRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a role definition.
    pub fn define_role(&self, role: Role) {
        self.roles.write().insert(role.name.clone(), role);
    }

    /// Assigns `actor_id` to the named role.
    pub fn assign(&self, actor_id: impl Into<String>, role_name: impl Into<String>) {
        self.assignments
            .write()
            .insert(actor_id.into(), role_name.into());
    }

    pub fn unassign(&self, actor_id: &str) {
        self.assignments.write().remove(actor_id);
    }
}

#[async_trait]
impl RoleDirectory for StaticRoleDirectory {
    async fn role_of(&self, actor_id: &str) -> Result<Role> {
        let role_name = match self.assignments.read().get(actor_id) {
            Some(name) => name.clone(),
            None => return Ok(Role::anonymous()),
        };
        Ok(self
            .roles
            .read()
            .get(&role_name)
            .cloned()
            .unwrap_or_else(Role::anonymous))
    }
}
