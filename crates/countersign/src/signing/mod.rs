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

//! Signing pipeline: backends, assembly, locking and the signing service.

mod assembler;
mod backend;
mod cancel;
mod detached;
mod documents;
mod locks;
mod service;

pub use assembler::{
    AssembledSignature, AssemblyRequest, SignatureAssembler, TimestampOutcome, TimestampPolicy,
};
pub use backend::{BackendSignature, CertificateBackend, HsmBackend, SigningBackend};
pub use cancel::run_cancellable;
pub use detached::DetachedSignature;
pub use documents::{DocumentSource, InMemoryDocuments};
pub use locks::{DocumentLockGuard, DocumentLocks};
pub use service::{SignOutcome, SignRequest, SigningService};
