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

//! Timestamp client tests against a mock TSA.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use countersign::crypto::Sha256Digest;
use countersign::timestamp::{TimestampAuthority, TsaClient};
use countersign::ExternalServiceError;
use serde_json::json;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &[u8] = &[0x30, 0x82, 0x02, 0x11, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7];

async fn client_for(response: ResponseTemplate) -> (MockServer, TsaClient) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/timestamp"))
        .respond_with(response)
        .mount(&server)
        .await;
    let url = Url::parse(&format!("{}/timestamp", server.uri())).unwrap();
    (server, TsaClient::new(url).unwrap())
}

#[tokio::test]
async fn test_all_response_shapes_yield_same_token() {
    let digest = Sha256Digest::of(b"signature bytes");
    let shapes = [
        ResponseTemplate::new(200).set_body_json(json!({ "token": BASE64.encode(TOKEN) })),
        ResponseTemplate::new(200).set_body_json(json!({ "der": hex::encode(TOKEN) })),
        ResponseTemplate::new(200).set_body_string(BASE64.encode(TOKEN)),
    ];

    for shape in shapes {
        let (_server, client) = client_for(shape).await;
        assert_eq!(client.timestamp(&digest).await.unwrap(), TOKEN);
    }
}

#[tokio::test]
async fn test_request_body_format() {
    let digest = Sha256Digest::of(b"signature bytes");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/timestamp"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "hash": digest.to_hex(), "alg": "sha256" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token": BASE64.encode(TOKEN) })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/timestamp", server.uri())).unwrap();
    let client = TsaClient::new(url).unwrap();
    client.timestamp(&digest).await.unwrap();
}

#[tokio::test]
async fn test_unrecognised_shape_is_unsupported() {
    let (_server, client) =
        client_for(ResponseTemplate::new(200).set_body_json(json!({ "timestamp": "2026-01-01" })))
            .await;
    let err = client
        .timestamp(&Sha256Digest::of(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExternalServiceError::UnsupportedResponse { .. }));
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (_server, client) =
        client_for(ResponseTemplate::new(500).set_body_string("tsa exploded")).await;
    let err = client
        .timestamp(&Sha256Digest::of(b"x"))
        .await
        .unwrap_err();
    match err {
        ExternalServiceError::Status { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "tsa exploded");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_tsa_times_out_as_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": BASE64.encode(TOKEN) }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = TsaClient::with_timeout(
        Url::parse(&server.uri()).unwrap(),
        Duration::from_millis(100),
    )
    .unwrap();
    let err = client
        .timestamp(&Sha256Digest::of(b"x"))
        .await
        .unwrap_err();
    match err {
        ExternalServiceError::Unreachable { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("expected unreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_refused_is_unreachable() {
    // Grab a free port, then close it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let url = Url::parse(&format!("http://127.0.0.1:{port}/tsa")).unwrap();
    let client = TsaClient::new(url).unwrap();
    let err = client
        .timestamp(&Sha256Digest::of(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExternalServiceError::Unreachable { .. }));
}
