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

//! Security audit logging for SIEM integration.
//!
//! Structured audit events for every security-sensitive operation:
//! - Delegation lifecycle (create, transitions, expiry)
//! - Signature creation and failure, including degraded timestamping
//! - HSM key lifecycle and file signing
//! - Certificate loading
//!
//! Events use dot-notation `event_type` fields and are emitted through
//! `tracing`. Key material and passwords are never logged.

use crate::models::{DelegationEvent, DelegationStatus, WorkflowType};
use uuid::Uuid;

/// Event types for audit records.
pub mod events {
    /// Delegation created event type.
    pub const DELEGATION_CREATED: &str = "delegation.created";
    /// Delegation creation refused event type.
    pub const DELEGATION_CREATE_REJECTED: &str = "delegation.create_rejected";
    /// Delegation status transition event type.
    pub const DELEGATION_TRANSITIONED: &str = "delegation.transitioned";
    /// Delegation transition refused event type.
    pub const DELEGATION_TRANSITION_REJECTED: &str = "delegation.transition_rejected";
    /// Delegation expired event type.
    pub const DELEGATION_EXPIRED: &str = "delegation.expired";
    /// Delegation details updated event type.
    pub const DELEGATION_UPDATED: &str = "delegation.updated";

    /// Signature created event type.
    pub const SIGNATURE_CREATED: &str = "signature.created";
    /// Signature failure event type.
    pub const SIGNATURE_FAILED: &str = "signature.failed";
    /// Signature committed without a trusted timestamp.
    pub const SIGNATURE_TIMESTAMP_DEGRADED: &str = "signature.timestamp_degraded";

    /// HSM key generated event type.
    pub const HSM_KEY_GENERATED: &str = "hsm.key.generated";
    /// HSM key revoked event type.
    pub const HSM_KEY_REVOKED: &str = "hsm.key.revoked";
    /// HSM file signed event type.
    pub const HSM_FILE_SIGNED: &str = "hsm.file.signed";

    /// PKCS#12 certificate loaded event type.
    pub const CERTIFICATE_LOADED: &str = "certificate.loaded";
}

/// Log a delegation creation.
pub fn log_delegation_created(
    delegation_id: Uuid,
    document_id: &str,
    delegator_id: &str,
    delegate_id: &str,
    workflow_type: WorkflowType,
) {
    tracing::info!(
        event_type = events::DELEGATION_CREATED,
        delegation_id = %delegation_id,
        document_id = %document_id,
        delegator_id = %delegator_id,
        delegate_id = %delegate_id,
        workflow_type = %workflow_type,
        "Delegation created"
    );
}

/// Log a refused creation.
pub fn log_delegation_create_rejected(actor_id: &str, document_id: &str, error: &str) {
    tracing::warn!(
        event_type = events::DELEGATION_CREATE_REJECTED,
        actor_id = %actor_id,
        document_id = %document_id,
        error = %error,
        "Delegation creation rejected"
    );
}

/// Log a successful status transition.
pub fn log_delegation_transitioned(
    delegation_id: Uuid,
    actor_id: &str,
    event: DelegationEvent,
    from: DelegationStatus,
    to: DelegationStatus,
) {
    tracing::info!(
        event_type = events::DELEGATION_TRANSITIONED,
        delegation_id = %delegation_id,
        actor_id = %actor_id,
        event = %event,
        from_status = %from,
        to_status = %to,
        "Delegation transitioned"
    );
}

/// Log a refused status transition.
pub fn log_delegation_transition_rejected(
    delegation_id: Uuid,
    actor_id: &str,
    event: DelegationEvent,
    error: &str,
) {
    tracing::warn!(
        event_type = events::DELEGATION_TRANSITION_REJECTED,
        delegation_id = %delegation_id,
        actor_id = %actor_id,
        event = %event,
        error = %error,
        "Delegation transition rejected"
    );
}

/// Log an expiry coercion.
pub fn log_delegation_expired(delegation_id: Uuid, from: DelegationStatus, lazy: bool) {
    tracing::info!(
        event_type = events::DELEGATION_EXPIRED,
        delegation_id = %delegation_id,
        from_status = %from,
        detected_lazily = lazy,
        "Delegation expired"
    );
}

/// Log a change to reason, permissions or metadata.
pub fn log_delegation_updated(delegation_id: Uuid, actor_id: &str, fields: &[&str]) {
    tracing::info!(
        event_type = events::DELEGATION_UPDATED,
        delegation_id = %delegation_id,
        actor_id = %actor_id,
        fields = ?fields,
        "Delegation details updated"
    );
}

/// Log a committed signature.
pub fn log_signature_created(
    signature_id: Uuid,
    document_id: &str,
    signer: &str,
    document_digest: &str,
    timestamped: bool,
) {
    tracing::info!(
        event_type = events::SIGNATURE_CREATED,
        signature_id = %signature_id,
        document_id = %document_id,
        signer = %signer,
        document_digest = %document_digest,
        timestamped = timestamped,
        "Signature created"
    );
}

/// Log a signing failure.
pub fn log_signature_failed(document_id: &str, signer: &str, error: &str) {
    tracing::error!(
        event_type = events::SIGNATURE_FAILED,
        document_id = %document_id,
        signer = %signer,
        error = %error,
        "Signature failed"
    );
}

/// Log a signature produced without a trusted timestamp.
pub fn log_timestamp_degraded(document_id: &str, reason: &str) {
    tracing::warn!(
        event_type = events::SIGNATURE_TIMESTAMP_DEGRADED,
        document_id = %document_id,
        reason = %reason,
        "Signature committed without trusted timestamp"
    );
}

/// Log an HSM key generation.
pub fn log_hsm_key_generated(
    key_id: &str,
    user_id: &str,
    key_type: &str,
    fingerprint: Option<&str>,
) {
    tracing::info!(
        event_type = events::HSM_KEY_GENERATED,
        key_id = %key_id,
        user_id = %user_id,
        key_type = %key_type,
        key_fingerprint = fingerprint.unwrap_or("<unknown>"),
        "HSM key generated"
    );
}

/// Log an HSM key revocation.
pub fn log_hsm_key_revoked(key_id: &str) {
    tracing::warn!(
        event_type = events::HSM_KEY_REVOKED,
        key_id = %key_id,
        "HSM key revoked"
    );
}

/// Log an HSM file signing.
pub fn log_hsm_file_signed(file_id: &str, signature_id: &str, key_id: &str) {
    tracing::info!(
        event_type = events::HSM_FILE_SIGNED,
        file_id = %file_id,
        signature_id = %signature_id,
        key_id = %key_id,
        "File signed by HSM"
    );
}

/// Log a PKCS#12 bundle being loaded for signing.
pub fn log_certificate_loaded(common_name: Option<&str>, key_fingerprint: &str, chain_len: usize) {
    tracing::info!(
        event_type = events::CERTIFICATE_LOADED,
        common_name = common_name.unwrap_or("<none>"),
        key_fingerprint = %key_fingerprint,
        chain_len = chain_len,
        "Signing certificate loaded"
    );
}
