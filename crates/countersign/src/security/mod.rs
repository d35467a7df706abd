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

//! Authorization and audit.
//!
//! This module provides:
//! - The permission gate ([`is_allowed`]) and role types
//! - [`RoleDirectory`] for resolving a principal's current role
//! - Security audit logging for SIEM integration

pub mod audit;
pub mod permissions;

pub use permissions::{
    is_allowed, Action, Module, ModulePermissions, Role, RoleDirectory, RolePermissions,
    StaticRoleDirectory,
};
