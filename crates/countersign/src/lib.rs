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

//! # Countersign
//!
//! Delegated document signing. A document owner routes a document to a
//! signer through a [`SignatureDelegation`](models::SignatureDelegation),
//! optionally gated by an approval step; the signer then produces a
//! signature backed by a PKCS#12 certificate or by a key that never leaves
//! an HSM, optionally with a trusted timestamp.
//!
//! ## Components
//!
//! - [`security`]: permission gate, roles, audit events
//! - [`workflow`]: delegation state machine with lazy expiry and
//!   compare-and-swap transitions
//! - [`crypto`]: digests, keys and the PKCS#12 certificate loader
//! - [`timestamp`]: timestamp authority client
//! - [`hsm`]: HSM key lifecycle and signing
//! - [`signing`]: backend-agnostic assembly and the signing service
//! - [`dal`]: persistence contracts and an in-memory store
//!
//! ## Flow
//!
//! ```text
//! create ──▶ pending ──approve──▶ approved ──sign──▶ signed
//!              │  └──────────sign (delegation type)──▶ signed
//!              ├──reject──▶ rejected
//!              ├──cancel──▶ cancelled
//!              └──end_date passes──▶ expired
//! ```
//!
//! Signing takes a per-document lock, authorizes the delegate, hashes the
//! document with SHA-256, asks a [`SigningBackend`](signing::SigningBackend)
//! for a signature, optionally timestamps it, and commits the
//! [`SignatureRecord`](models::SignatureRecord) together with the `signed`
//! transition.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod dal;
pub mod error;
pub mod hsm;
pub mod models;
pub mod security;
pub mod signing;
pub mod timestamp;
pub mod workflow;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SigningConfig;
pub use error::{ConflictReason, CryptoError, Error, ErrorKind, ExternalServiceError, Result};
