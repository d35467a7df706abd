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

//! Shared application state and its construction from configuration.

use crate::config::{BackendConfig, ServerConfig};
use crate::documents::FsDocumentSource;
use anyhow::Context;
use countersign::clock::{Clock, SystemClock};
use countersign::dal::MemoryStore;
use countersign::hsm::{HsmService, HttpHsmClient};
use countersign::security::StaticRoleDirectory;
use countersign::signing::{
    CertificateBackend, HsmBackend, SignatureAssembler, SigningBackend, SigningService,
};
use countersign::timestamp::{TimestampAuthority, TsaClient};
use countersign::workflow::DelegationEngine;
use countersign::SigningConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SigningService>,
    /// `None` when no backend is configured; signing requests are refused
    pub backend: Option<Arc<dyn SigningBackend>>,
    /// Cancelled on shutdown; aborts in-flight signing without side effects
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        service: Arc<SigningService>,
        backend: Option<Arc<dyn SigningBackend>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            service,
            backend,
            shutdown,
        }
    }

    /// Wires the engine, stores, timestamp client and signing backend.
    ///
    /// Delegations live in memory; persistence is left to an embedding
    /// application that supplies its own `DelegationStore`.
    pub async fn from_config(
        config: &ServerConfig,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let signing = config.signing_config();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let roles = Arc::new(StaticRoleDirectory::new());
        for role in config.roles.roles() {
            roles.define_role(role);
        }
        for (actor, role) in &config.roles.assignments {
            roles.assign(actor.clone(), role.clone());
        }

        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(
            DelegationEngine::new(store.clone(), roles, clock)
                .with_list_limits(signing.default_list_limit(), signing.max_list_limit()),
        );

        let assembler = build_assembler(&signing)?;
        let documents = Arc::new(FsDocumentSource::new(&config.documents.root));
        let service = Arc::new(SigningService::new(engine, store, documents, assembler));

        let backend = match &config.signing.backend {
            Some(backend) => Some(build_backend(backend, &signing).await?),
            None => {
                tracing::warn!("No signing backend configured; sign requests will be refused");
                None
            }
        };

        Ok(Self::new(service, backend, shutdown))
    }
}

fn build_assembler(signing: &SigningConfig) -> anyhow::Result<SignatureAssembler> {
    let tsa: Option<Arc<dyn TimestampAuthority>> = match signing.tsa_url() {
        Some(url) => {
            let client = TsaClient::with_timeout(url.clone(), signing.tsa_timeout())
                .context("building timestamp client")?;
            tracing::info!(tsa = %url, "Timestamp authority configured");
            Some(Arc::new(client))
        }
        None => None,
    };
    Ok(SignatureAssembler::new(tsa, signing.timestamp_policy()))
}

async fn build_backend(
    backend: &BackendConfig,
    signing: &SigningConfig,
) -> anyhow::Result<Arc<dyn SigningBackend>> {
    match backend {
        BackendConfig::Pkcs12 { path, password } => {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading PKCS#12 container {}", path.display()))?;
            let backend = CertificateBackend::from_pkcs12(&data, password)
                .with_context(|| format!("loading PKCS#12 container {}", path.display()))?;
            Ok(Arc::new(backend))
        }
        BackendConfig::Hsm {
            base_url, key_id, ..
        } => {
            let client = HttpHsmClient::with_timeout(
                base_url.clone(),
                signing.hsm_api_key().map(str::to_string),
                signing.hsm_timeout(),
            )
            .context("building HSM client")?;
            let hsm: Arc<dyn HsmService> = Arc::new(client);
            let backend = match key_id {
                Some(key_id) => HsmBackend::new(hsm, key_id.clone()),
                None => HsmBackend::with_default_key(hsm)
                    .await
                    .context("selecting default HSM signing key")?,
            };
            tracing::info!(key_id = backend.key_id(), "HSM signing backend configured");
            Ok(Arc::new(backend))
        }
    }
}
