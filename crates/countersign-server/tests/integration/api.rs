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

use crate::fixtures::{TestApp, DOCUMENT};
use axum::http::{Method, StatusCode};
use chrono::Duration;
use countersign::signing::DetachedSignature;
use serde_json::json;

#[tokio::test]
async fn test_health_needs_no_actor() {
    let app = TestApp::new().await;
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));
}

#[tokio::test]
async fn test_missing_actor_is_unauthenticated() {
    let app = TestApp::new().await;
    let (status, body) = app.call(Method::GET, "/delegations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn test_create_and_fetch_delegation() {
    let app = TestApp::new().await;
    let id = app.create("doc-1", "delegation").await;

    let (status, body) = app
        .call(Method::GET, &format!("/delegations/{id}"), Some("bob"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["delegator_id"], "alice");
    assert_eq!(body["delegate_id"], "bob");
    assert_eq!(body["workflow_type"], "delegation");

    let (status, body) = app
        .call(Method::GET, "/delegations/not-a-uuid", Some("bob"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/delegations/{}", uuid::Uuid::new_v4()),
            Some("bob"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_create_rejections() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/delegations",
            Some("alice"),
            Some(json!({
                "document_id": "doc-1",
                "delegate_id": "alice",
                "workflow_type": "delegation",
                "end_date": "2026-03-02T09:00:00Z",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = app
        .call(
            Method::POST,
            "/delegations",
            Some("bob"),
            Some(json!({
                "document_id": "doc-1",
                "delegate_id": "alice",
                "workflow_type": "delegation",
                "end_date": "2026-03-02T09:00:00Z",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_denied");
}

#[tokio::test]
async fn test_malformed_create_bodies_are_validation_errors() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/delegations",
            Some("alice"),
            Some(json!({
                "delegate_id": "bob",
                "workflow_type": "delegation",
                "end_date": "2026-03-02T09:00:00Z",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("document_id"));

    let (status, body) = app
        .call(
            Method::POST,
            "/delegations",
            Some("alice"),
            Some(json!({
                "document_id": "doc-1",
                "delegate_id": "bob",
                "workflow_type": "delegation",
                "end_date": 5,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = app
        .call(Method::GET, "/delegations?page=first", Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_approval_then_sign_produces_verifiable_signature() {
    let app = TestApp::new().await;
    let id = app.create("doc-1", "approval").await;
    let uri = format!("/delegations/{id}");

    let (status, body) = app
        .call(Method::PATCH, &uri, Some("bob"), Some(json!({ "status": "signed" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = app
        .call(Method::PATCH, &uri, Some("alice"), Some(json!({ "status": "approved" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let (status, body) = app
        .call(
            Method::PATCH,
            &uri,
            Some("bob"),
            Some(json!({
                "status": "signed",
                "signer_info": { "name": "Bob Builder", "reason": "on behalf of Alice" }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "signed");
    assert_eq!(body["timestamp"], "not_requested");
    let signature_id = body["signature_id"].as_str().unwrap().to_string();

    let (status, record) = app
        .call(Method::GET, &format!("/signatures/{signature_id}"), Some("bob"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["document_id"], "doc-1");
    assert_eq!(record["signer_info"]["name"], "Bob Builder");
    assert_eq!(record["delegation_id"], id.as_str());

    let (status, detached) = app
        .call(
            Method::GET,
            &format!("/signatures/{signature_id}/detached"),
            Some("bob"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let detached: DetachedSignature = serde_json::from_value(detached).unwrap();
    assert!(detached.verify(DOCUMENT).is_ok());
    assert!(detached.verify(b"tampered").is_err());

    // Terminal: a second sign attempt conflicts
    let (status, _) = app
        .call(Method::PATCH, &uri, Some("bob"), Some(json!({ "status": "signed" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reads_are_limited_to_parties_and_readers() {
    let app = TestApp::new().await;
    let id = app.create("doc-1", "delegation").await;
    let uri = format!("/delegations/{id}");

    for (actor, expected) in [
        ("alice", StatusCode::OK),
        ("bob", StatusCode::OK),
        ("mallory", StatusCode::FORBIDDEN),
    ] {
        let (status, _) = app.call(Method::GET, &uri, Some(actor), None).await;
        assert_eq!(status, expected, "{actor}");
    }

    // bob has no read grant, so may only list his own delegations
    let (status, body) = app.call(Method::GET, "/delegations", Some("bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_denied");
    let (status, body) = app
        .call(Method::GET, "/delegations?delegate_id=bob", Some("bob"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    let (status, _) = app
        .call(Method::GET, "/delegations?delegate_id=bob", Some("mallory"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(Method::PATCH, &uri, Some("bob"), Some(json!({ "status": "signed" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let signature_id = body["signature_id"].as_str().unwrap().to_string();

    for path in [
        format!("/signatures/{signature_id}"),
        format!("/signatures/{signature_id}/detached"),
    ] {
        let (status, _) = app.call(Method::GET, &path, Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        let (status, _) = app.call(Method::GET, &path, Some("mallory"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
    }
}

#[tokio::test]
async fn test_only_delegate_may_sign() {
    let app = TestApp::new().await;
    let id = app.create("doc-1", "delegation").await;

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/delegations/{id}"),
            Some("alice"),
            Some(json!({ "status": "signed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_denied");
}

#[tokio::test]
async fn test_patch_rejects_unreachable_targets_and_empty_bodies() {
    let app = TestApp::new().await;
    let id = app.create("doc-1", "delegation").await;
    let uri = format!("/delegations/{id}");

    for target in ["pending", "expired"] {
        let (status, _) = app
            .call(Method::PATCH, &uri, Some("alice"), Some(json!({ "status": target })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{target}");
    }

    let (status, _) = app
        .call(Method::PATCH, &uri, Some("alice"), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(Method::PATCH, &uri, Some("alice"), Some(json!({ "colour": "red" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_refused_transition_leaves_details_untouched() {
    let app = TestApp::new().await;
    let id = app.create("doc-1", "delegation").await;
    let uri = format!("/delegations/{id}");

    // bob may annotate, but not cancel alice's delegation
    let (status, body) = app
        .call(
            Method::PATCH,
            &uri,
            Some("bob"),
            Some(json!({ "metadata": { "sneaky": 1 }, "status": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission_denied");

    // Approval does not apply to a direct delegation
    let (status, _) = app
        .call(
            Method::PATCH,
            &uri,
            Some("alice"),
            Some(json!({ "reason": "rerouted", "status": "approved" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Only the delegate signs
    let (status, _) = app
        .call(
            Method::PATCH,
            &uri,
            Some("alice"),
            Some(json!({ "metadata": { "pre_sign": true }, "status": "signed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.call(Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["reason"], "travelling");
    assert!(body["metadata"].get("sneaky").is_none());
    assert!(body["metadata"].get("pre_sign").is_none());

    // Both parts together succeed once the transition is allowed
    let (status, body) = app
        .call(
            Method::PATCH,
            &uri,
            Some("alice"),
            Some(json!({ "metadata": { "closed_by": "alice" }, "status": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["metadata"]["closed_by"], "alice");
}

#[tokio::test]
async fn test_detail_updates() {
    let app = TestApp::new().await;
    let id = app.create("doc-1", "delegation").await;
    let uri = format!("/delegations/{id}");

    let (status, body) = app
        .call(Method::PATCH, &uri, Some("alice"), Some(json!({ "reason": "on leave" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reason"], "on leave");

    let (status, _) = app
        .call(Method::PATCH, &uri, Some("bob"), Some(json!({ "reason": "mine now" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::PATCH, &uri, Some("alice"), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Annotation survives the terminal state; terms do not
    let (status, body) = app
        .call(
            Method::PATCH,
            &uri,
            Some("bob"),
            Some(json!({ "metadata": { "note": "acknowledged" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["note"], "acknowledged");
    assert_eq!(body["status"], "cancelled");

    let (status, _) = app
        .call(Method::PATCH, &uri, Some("alice"), Some(json!({ "reason": "late" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_filters_and_pages() {
    let app = TestApp::new().await;
    let first = app.create("doc-1", "delegation").await;
    app.create("doc-2", "delegation").await;
    app.create("doc-2", "approval").await;

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/delegations/{first}"),
            Some("alice"),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(
            Method::GET,
            "/delegations?delegate_id=bob&status=pending",
            Some("alice"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert!(body["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|d| d["document_id"] == "doc-2"));

    let (_, body) = app
        .call(Method::GET, "/delegations?page=2&limit=2", Some("alice"), None)
        .await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .call(Method::GET, "/delegations?status=bogus", Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_expired_delegation_cannot_be_signed() {
    let app = TestApp::new().await;
    let id = app.create("doc-1", "delegation").await;
    app.clock.advance(Duration::days(2));

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/delegations/{id}"),
            Some("bob"),
            Some(json!({ "status": "signed" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (_, body) = app
        .call(Method::GET, &format!("/delegations/{id}"), Some("bob"), None)
        .await;
    assert_eq!(body["status"], "expired");
}

#[tokio::test]
async fn test_sign_without_backend_is_refused() {
    let app = TestApp::without_backend().await;
    let id = app.create("doc-1", "delegation").await;

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/delegations/{id}"),
            Some("bob"),
            Some(json!({ "status": "signed" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("backend"));
}

#[tokio::test]
async fn test_shutdown_cancels_signing_without_state_change() {
    let app = TestApp::new().await;
    let id = app.create("doc-1", "delegation").await;
    app.shutdown.cancel();

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/delegations/{id}"),
            Some("bob"),
            Some(json!({ "status": "signed" })),
        )
        .await;
    assert_eq!(status.as_u16(), 499);
    assert_eq!(body["error"], "cancelled");

    let (_, body) = app
        .call(Method::GET, &format!("/delegations/{id}"), Some("bob"), None)
        .await;
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn test_unknown_signature_is_not_found() {
    let app = TestApp::new().await;
    let (status, _) = app
        .call(
            Method::GET,
            &format!("/signatures/{}/detached", uuid::Uuid::new_v4()),
            Some("alice"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
