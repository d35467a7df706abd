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

//! End-to-end signing tests.
//!
//! Each test runs the full pipeline: delegation state, per-document lock,
//! backend signature, optional timestamp, and the atomic commit.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Duration;
use countersign::crypto::Sha256Digest;
use countersign::dal::{DelegationStore, SignatureRecordStore};
use countersign::hsm::{HsmService, InMemoryHsm};
use countersign::models::{
    DelegationEvent, DelegationStatus, KeyGenerationParams, KeyType, KeyUsage, WorkflowType,
};
use countersign::signing::{
    BackendSignature, CertificateBackend, DetachedSignature, HsmBackend, SignRequest,
    SignatureAssembler, SigningBackend, TimestampOutcome, TimestampPolicy,
};
use countersign::timestamp::TsaClient;
use countersign::{ConflictReason, ErrorKind, ManualClock};
use serde_json::json;
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{ec_bundle, rsa_bundle, signer, TestFixture, DOCUMENT, PASSWORD};

fn sign_request() -> SignRequest {
    SignRequest {
        signer_info: signer("Bob"),
        timestamp_policy: None,
    }
}

async fn tsa_server(response: ResponseTemplate) -> (MockServer, Arc<TsaClient>) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tsa"))
        .respond_with(response)
        .mount(&server)
        .await;
    let url = Url::parse(&format!("{}/tsa", server.uri())).unwrap();
    let client = Arc::new(TsaClient::new(url).unwrap());
    (server, client)
}

#[tokio::test]
async fn test_approval_scenario_ends_signed_with_record() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    let delegation = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Approval))
        .await
        .unwrap();
    assert_eq!(delegation.status, DelegationStatus::Pending);

    // Approval comes first
    let err = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(&ConflictReason::NotApproved));

    let approved = fx
        .engine
        .transition(delegation.id, DelegationEvent::Approve, "alice")
        .await
        .unwrap();
    assert_eq!(approved.status, DelegationStatus::Approved);

    let outcome = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap();

    assert_eq!(outcome.delegation.status, DelegationStatus::Signed);
    assert_eq!(outcome.record.document_id, "doc-1");
    assert_eq!(outcome.record.delegation_id, Some(delegation.id));
    assert_eq!(outcome.record.certificate_chain.len(), 2);
    assert_eq!(outcome.timestamp, TimestampOutcome::NotRequested);
    assert!(outcome.record.verify(DOCUMENT).is_ok());

    let stored = fx.store.find_by_document("doc-1").await.unwrap().unwrap();
    assert_eq!(stored, outcome.record);
    assert_eq!(
        service.get_record(stored.signature_id).await.unwrap(),
        stored
    );

    // Signed is terminal
    let err = fx
        .engine
        .transition(delegation.id, DelegationEvent::Cancel, "alice")
        .await
        .unwrap_err();
    assert_eq!(
        err.conflict_reason(),
        Some(&ConflictReason::Terminal(DelegationStatus::Signed))
    );
}

#[tokio::test]
async fn test_delegation_type_signs_directly_with_rsa() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let backend = CertificateBackend::from_pkcs12(&rsa_bundle(), PASSWORD).unwrap();

    let delegation = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();
    let outcome = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap();

    assert_eq!(outcome.delegation.status, DelegationStatus::Signed);
    assert_eq!(
        outcome.record.signature_algorithm.name(),
        "sha256WithRSAEncryption"
    );
    assert!(outcome.record.verify(DOCUMENT).is_ok());
    assert!(outcome.record.verify(b"a different document").is_err());
}

#[tokio::test]
async fn test_only_the_delegate_may_sign() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    let delegation = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();

    for actor in ["alice", "dave"] {
        let err = service
            .sign_delegation(delegation.id, actor, &backend, sign_request(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied, "{actor}");
    }
    assert!(fx.store.find_by_document("doc-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_signing_before_window_opens_conflicts() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    let mut request = fx.request("doc-1", WorkflowType::Delegation);
    request.start_date = Some(fx.clock_now() + Duration::minutes(30));
    let delegation = fx.engine.create("alice", request).await.unwrap();

    let err = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(&ConflictReason::NotYetValid));

    fx.clock.advance(Duration::minutes(31));
    service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expired_delegation_cannot_be_signed() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    let delegation = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();
    fx.clock.advance(Duration::hours(2));

    let err = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(&ConflictReason::Expired));
    assert!(fx.store.find_by_document("doc-1").await.unwrap().is_none());
}

/// Backend that lets the validity window close while it is signing.
struct SlowBackend {
    inner: CertificateBackend,
    clock: Arc<ManualClock>,
}

#[async_trait]
impl SigningBackend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn sign(&self, digest: &Sha256Digest) -> countersign::Result<BackendSignature> {
        self.clock.advance(Duration::hours(2));
        self.inner.sign(digest).await
    }
}

#[tokio::test]
async fn test_expiry_during_signing_discards_signature() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let backend = SlowBackend {
        inner: CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap(),
        clock: fx.clock.clone(),
    };

    let delegation = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();

    let err = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(&ConflictReason::Expired));

    let stored = fx.store.get(delegation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DelegationStatus::Expired);
    assert!(fx.store.find_by_document("doc-1").await.unwrap().is_none());
    assert!(!service.locks().is_locked("doc-1"));
}

#[tokio::test]
async fn test_document_signed_once_across_delegations() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    let first = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();
    let mut second = fx.request("doc-1", WorkflowType::Delegation);
    second.delegate_id = "dave".into();
    let second = fx.engine.create("alice", second).await.unwrap();

    service
        .sign_delegation(first.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap();
    let err = service
        .sign_delegation(second.id, "dave", &backend, sign_request(), None)
        .await
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(&ConflictReason::AlreadySigned));

    let untouched = fx.store.get(second.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, DelegationStatus::Pending);
}

#[tokio::test]
async fn test_missing_document_leaves_delegation_unchanged() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    let delegation = fx
        .engine
        .create("alice", fx.request("doc-missing", WorkflowType::Delegation))
        .await
        .unwrap();
    let err = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let stored = fx.store.get(delegation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DelegationStatus::Pending);
    assert!(!service.locks().is_locked("doc-missing"));
}

#[tokio::test]
async fn test_hsm_backend_signs_and_revoked_key_conflicts() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let hsm = Arc::new(InMemoryHsm::new());
    let key = hsm
        .generate_key(
            "bob",
            KeyGenerationParams {
                key_type: KeyType::Ec,
                key_size: 256,
                label: "bob-signing".into(),
                usage: KeyUsage::Sign,
            },
        )
        .await
        .unwrap();
    let backend = HsmBackend::with_default_key(hsm.clone()).await.unwrap();
    assert_eq!(backend.key_id(), key.key_id);

    let revoked_first = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();
    hsm.revoke_key(&key.key_id).await.unwrap();

    let err = service
        .sign_delegation(revoked_first.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap_err();
    assert_eq!(err.conflict_reason(), Some(&ConflictReason::KeyRevoked));
    let stored = fx.store.get(revoked_first.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DelegationStatus::Pending);

    hsm.generate_key(
        "bob",
        KeyGenerationParams {
            key_type: KeyType::Ec,
            key_size: 256,
            label: "bob-replacement".into(),
            usage: KeyUsage::Both,
        },
    )
    .await
    .unwrap();
    let backend = HsmBackend::with_default_key(hsm.clone()).await.unwrap();
    let outcome = service
        .sign_delegation(revoked_first.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap();
    assert!(outcome.record.certificate_chain.is_empty());
    assert!(outcome.record.verify(DOCUMENT).is_ok());
}

#[tokio::test]
async fn test_timestamp_attached_from_tsa() {
    let fx = TestFixture::new();
    let token = b"\x30\x82\x01\x0atimestamp-token".to_vec();
    let (_server, tsa) = tsa_server(
        ResponseTemplate::new(200).set_body_json(json!({ "token": BASE64.encode(&token) })),
    )
    .await;
    let service = fx.signing_service(SignatureAssembler::new(
        Some(tsa),
        TimestampPolicy::BestEffort,
    ));
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    let delegation = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();
    let outcome = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap();

    assert_eq!(outcome.timestamp, TimestampOutcome::Attached);
    assert_eq!(outcome.record.timestamp_token, Some(token));
}

#[tokio::test]
async fn test_tsa_request_carries_signature_digest() {
    let fx = TestFixture::new();
    let server = MockServer::start().await;
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();
    Mock::given(method("POST"))
        .and(path("/tsa"))
        .and(body_partial_json(json!({ "alg": "sha256" })))
        .respond_with(ResponseTemplate::new(200).set_body_string(BASE64.encode(b"tok")))
        .expect(1)
        .mount(&server)
        .await;
    let tsa_url = Url::parse(&format!("{}/tsa", server.uri())).unwrap();
    let tsa = Arc::new(TsaClient::new(tsa_url).unwrap());
    let service = fx.signing_service(SignatureAssembler::new(Some(tsa), TimestampPolicy::Required));

    let delegation = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();
    let outcome = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body["hash"],
        json!(Sha256Digest::of(&outcome.record.signature_bytes).to_hex())
    );
}

#[tokio::test]
async fn test_tsa_failure_degrades_unless_required() {
    let fx = TestFixture::new();
    let (_server, tsa) = tsa_server(ResponseTemplate::new(503)).await;
    let service = fx.signing_service(SignatureAssembler::new(
        Some(tsa),
        TimestampPolicy::BestEffort,
    ));
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();
    fx.documents.insert("doc-2", b"second document".to_vec());

    let required = fx
        .engine
        .create("alice", fx.request("doc-2", WorkflowType::Delegation))
        .await
        .unwrap();
    let err = service
        .sign_delegation(
            required.id,
            "bob",
            &backend,
            SignRequest {
                signer_info: signer("Bob"),
                timestamp_policy: Some(TimestampPolicy::Required),
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    let stored = fx.store.get(required.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DelegationStatus::Pending);
    assert!(fx.store.find_by_document("doc-2").await.unwrap().is_none());

    let degraded = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();
    let outcome = service
        .sign_delegation(degraded.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap();
    assert_eq!(outcome.delegation.status, DelegationStatus::Signed);
    assert!(!outcome.record.has_timestamp());
    assert!(matches!(
        outcome.timestamp,
        TimestampOutcome::Unavailable { .. }
    ));
}

#[tokio::test]
async fn test_detached_export_verifies() {
    let fx = TestFixture::new();
    let service = fx.signing_service(SignatureAssembler::without_timestamps());
    let backend = CertificateBackend::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    let delegation = fx
        .engine
        .create("alice", fx.request("doc-1", WorkflowType::Delegation))
        .await
        .unwrap();
    let outcome = service
        .sign_delegation(delegation.id, "bob", &backend, sign_request(), None)
        .await
        .unwrap();

    let detached = DetachedSignature::from_record(&outcome.record);
    assert_eq!(detached.certificate_chain.len(), 2);
    assert_eq!(detached.key_fingerprint, backend.bundle().fingerprint());

    let parsed = DetachedSignature::from_json(&detached.to_json().unwrap()).unwrap();
    assert!(parsed.verify(DOCUMENT).is_ok());
}
