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

//! Error taxonomy shared by every component.
//!
//! Each concern has its own `thiserror` enum; [`Error`] is the top-level type
//! returned across module boundaries. [`Error::kind`] gives a stable
//! classification for transports that need to map failures onto status codes.

use crate::models::DelegationStatus;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete input. Raised before any side effect.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The capability check for the acting principal failed.
    #[error("Permission denied: {actor} may not {action} on {module}")]
    PermissionDenied {
        actor: String,
        action: String,
        module: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictReason),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("External service error: {0}")]
    ExternalService(#[from] ExternalServiceError),

    /// The caller aborted the operation before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Persistence collaborator failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn permission_denied(
        actor: impl Into<String>,
        action: impl ToString,
        module: impl ToString,
    ) -> Self {
        Error::PermissionDenied {
            actor: actor.into(),
            action: action.to_string(),
            module: module.to_string(),
        }
    }

    /// Stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Crypto(_) => ErrorKind::Crypto,
            Error::ExternalService(_) => ErrorKind::ExternalService,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Returns the conflict reason if this is a [`Error::Conflict`].
    pub fn conflict_reason(&self) -> Option<&ConflictReason> {
        match self {
            Error::Conflict(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    PermissionDenied,
    NotFound,
    Conflict,
    Crypto,
    ExternalService,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Crypto => "crypto_error",
            ErrorKind::ExternalService => "external_service_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal_error",
        }
    }
}

/// Why a state-changing request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictReason {
    #[error("delegation is already {0}")]
    Terminal(DelegationStatus),

    #[error("delegation has expired")]
    Expired,

    #[error("approval-type delegation has not been approved")]
    NotApproved,

    #[error("delegation validity window has not started")]
    NotYetValid,

    #[error("event '{event}' is not valid from status {from}")]
    InvalidTransition {
        from: DelegationStatus,
        event: &'static str,
    },

    #[error("delegation status changed concurrently (expected {expected}, found {actual})")]
    StatusChanged {
        expected: DelegationStatus,
        actual: DelegationStatus,
    },

    #[error("a signing operation for this document is already in progress")]
    SigningInProgress,

    #[error("document is already signed")]
    AlreadySigned,

    #[error("key has been revoked")]
    KeyRevoked,

    #[error("key is inactive")]
    KeyInactive,

    #[error("key is not usable for signing")]
    KeyNotForSigning,

    /// A remote service refused the request for a reason it named.
    #[error("rejected by remote service: {0}")]
    Remote(String),
}

/// Failures while decoding containers, handling keys, or producing signatures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("malformed PKCS#12 container: {0}")]
    MalformedContainer(String),

    #[error("incorrect password or corrupted container")]
    BadPassword,

    #[error("unsupported encryption scheme: {0}")]
    UnsupportedEncryption(String),

    #[error("container holds no private key")]
    NoPrivateKey,

    #[error("container holds no certificate")]
    NoCertificate,

    #[error("first certificate does not match the private key")]
    CertKeyMismatch,

    #[error("unsupported key algorithm: {0}")]
    UnsupportedKeyAlgorithm(String),

    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("signature verification failed")]
    VerificationFailed,
}

/// Failures talking to the timestamp authority or the HSM.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalServiceError {
    /// Network failure or timeout.
    #[error("{service} unreachable: {reason}")]
    Unreachable {
        service: &'static str,
        reason: String,
    },

    /// None of the accepted response shapes matched.
    #[error("{service} returned an unsupported response")]
    UnsupportedResponse { service: &'static str },

    #[error("{service} returned a malformed response: {reason}")]
    MalformedResponse {
        service: &'static str,
        reason: String,
    },

    #[error("{service} responded with HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
}
