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

//! Signing backends.
//!
//! Both a local certificate bundle and a remote HSM key satisfy the same
//! `sign(digest) -> signature + chain` contract, so the assembler never
//! knows which one it is talking to.

use crate::crypto::{CertificateBundle, Sha256Digest, SignatureAlgorithm};
use crate::error::Result;
use crate::hsm::HsmService;
use crate::security::audit;
use async_trait::async_trait;
use std::sync::Arc;

/// What a backend returns for one digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSignature {
    pub signature: Vec<u8>,
    pub algorithm: SignatureAlgorithm,
    /// DER certificates, end-entity first. May be empty.
    pub certificate_chain: Vec<Vec<u8>>,
    /// DER SubjectPublicKeyInfo that verifies `signature`
    pub public_key: Vec<u8>,
}

/// Produces a raw signature over a SHA-256 digest.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn sign(&self, digest: &Sha256Digest) -> Result<BackendSignature>;
}

/// Signs with a key loaded from a PKCS#12 container.
#[derive(Debug)]
pub struct CertificateBackend {
    bundle: CertificateBundle,
}

impl CertificateBackend {
    pub fn new(bundle: CertificateBundle) -> Self {
        audit::log_certificate_loaded(
            bundle.common_name(),
            bundle.fingerprint(),
            bundle.chain().len(),
        );
        Self { bundle }
    }

    /// Decodes `data` and wraps the result.
    pub fn from_pkcs12(data: &[u8], password: &str) -> Result<Self> {
        Ok(Self::new(CertificateBundle::from_pkcs12(data, password)?))
    }

    pub fn bundle(&self) -> &CertificateBundle {
        &self.bundle
    }
}

#[async_trait]
impl SigningBackend for CertificateBackend {
    fn name(&self) -> &str {
        "pkcs12"
    }

    async fn sign(&self, digest: &Sha256Digest) -> Result<BackendSignature> {
        Ok(BackendSignature {
            signature: self.bundle.sign_digest(digest)?,
            algorithm: self.bundle.algorithm(),
            certificate_chain: self.bundle.chain().to_vec(),
            public_key: self.bundle.public_key_der().to_vec(),
        })
    }
}

/// Signs inside an HSM under a fixed key.
pub struct HsmBackend {
    hsm: Arc<dyn HsmService>,
    key_id: String,
}

impl HsmBackend {
    pub fn new(hsm: Arc<dyn HsmService>, key_id: impl Into<String>) -> Self {
        Self {
            hsm,
            key_id: key_id.into(),
        }
    }

    /// Uses the HSM's default signing key.
    pub async fn with_default_key(hsm: Arc<dyn HsmService>) -> Result<Self> {
        let key = crate::hsm::resolve_signing_key(hsm.as_ref(), None).await?;
        Ok(Self::new(hsm, key.key_id))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[async_trait]
impl SigningBackend for HsmBackend {
    fn name(&self) -> &str {
        "hsm"
    }

    async fn sign(&self, digest: &Sha256Digest) -> Result<BackendSignature> {
        let signed = self.hsm.sign_digest(&self.key_id, digest).await?;
        Ok(BackendSignature {
            signature: signed.signature,
            algorithm: signed.algorithm,
            certificate_chain: signed.certificate_chain,
            public_key: signed.public_key,
        })
    }
}
