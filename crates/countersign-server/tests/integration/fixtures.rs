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

//! Router fixture: the full application over in-memory collaborators and a
//! software HSM, driven with `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use countersign::dal::MemoryStore;
use countersign::hsm::{HsmService, InMemoryHsm};
use countersign::models::{KeyGenerationParams, KeyType, KeyUsage};
use countersign::security::{Action, Module, Role, RolePermissions, StaticRoleDirectory};
use countersign::signing::{HsmBackend, InMemoryDocuments, SignatureAssembler, SigningService};
use countersign::workflow::DelegationEngine;
use countersign::ManualClock;
use countersign_server::routes::ACTOR_HEADER;
use countersign_server::{router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const DOCUMENT: &[u8] = b"%PDF-1.7\nservice agreement\n%%EOF";

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub roles: Arc<StaticRoleDirectory>,
    pub shutdown: CancellationToken,
}

impl TestApp {
    /// alice is a manager, bob an employee.
    pub async fn new() -> Self {
        Self::build(true).await
    }

    pub async fn without_backend() -> Self {
        Self::build(false).await
    }

    async fn build(with_backend: bool) -> Self {
        let roles = Arc::new(StaticRoleDirectory::new());
        roles.define_role(Role {
            name: "manager".into(),
            is_admin: false,
            permissions: RolePermissions::new()
                .grant(Module::Delegations, Action::Create)
                .grant(Module::Delegations, Action::Read)
                .grant(Module::Delegations, Action::Approve)
                .grant(Module::Signatures, Action::Create),
        });
        roles.define_role(Role {
            name: "employee".into(),
            is_admin: false,
            permissions: RolePermissions::new().grant(Module::Documents, Action::Read),
        });
        roles.assign("alice", "manager");
        roles.assign("bob", "employee");

        let clock = Arc::new(ManualClock::new(epoch()));
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(DelegationEngine::new(
            store.clone(),
            roles.clone(),
            clock.clone(),
        ));
        let documents = Arc::new(InMemoryDocuments::new());
        documents.insert("doc-1", DOCUMENT);
        documents.insert("doc-2", DOCUMENT);

        let service = Arc::new(SigningService::new(
            engine,
            store,
            documents,
            SignatureAssembler::without_timestamps(),
        ));

        let backend = if with_backend {
            let hsm = Arc::new(InMemoryHsm::with_clock(clock.clone()));
            let key = hsm
                .generate_key(
                    "ops",
                    KeyGenerationParams {
                        key_type: KeyType::Ec,
                        key_size: 256,
                        label: "api".into(),
                        usage: KeyUsage::Sign,
                    },
                )
                .await
                .unwrap();
            let backend: Arc<dyn countersign::signing::SigningBackend> =
                Arc::new(HsmBackend::new(hsm, key.key_id));
            Some(backend)
        } else {
            None
        };

        let shutdown = CancellationToken::new();
        let state = AppState::new(service, backend, shutdown.clone());

        Self {
            router: router(state, 64 * 1024),
            clock,
            roles,
            shutdown,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        actor: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            request = request.header(ACTOR_HEADER, actor);
        }
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    /// Creates a delegation from alice to bob for `document_id`, returning its id.
    pub async fn create(&self, document_id: &str, workflow_type: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/delegations",
                Some("alice"),
                Some(serde_json::json!({
                    "document_id": document_id,
                    "delegate_id": "bob",
                    "workflow_type": workflow_type,
                    "reason": "travelling",
                    "end_date": "2026-03-02T09:00:00Z",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}
