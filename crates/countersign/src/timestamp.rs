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

//! Timestamp authority client.
//!
//! Sends `{"hash": <hex sha256>, "alg": "sha256"}` to the configured TSA and
//! accepts three response shapes, tried in order:
//!
//! 1. a JSON object with a base64 `token` field
//! 2. a JSON object with a hex-encoded DER `der` field
//! 3. a bare base64 body (optionally a JSON string)
//!
//! Nothing else about the response is trusted. The token is returned as
//! opaque bytes.

use crate::config::DEFAULT_TSA_TIMEOUT;
use crate::crypto::{DigestAlgorithm, Sha256Digest};
use crate::error::ExternalServiceError;
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const SERVICE: &str = "timestamp authority";

/// Anything that can produce a timestamp token for a digest.
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    async fn timestamp(&self, digest: &Sha256Digest) -> Result<Vec<u8>, ExternalServiceError>;
}

#[derive(Serialize)]
struct TimestampRequest<'a> {
    hash: String,
    alg: &'a str,
}

/// HTTP client for a TSA endpoint.
#[derive(Debug, Clone)]
pub struct TsaClient {
    url: Url,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl TsaClient {
    /// Creates a client with the default 20 second bound.
    pub fn new(url: Url) -> Result<Self, ExternalServiceError> {
        Self::with_timeout(url, DEFAULT_TSA_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, ExternalServiceError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("countersign/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExternalServiceError::Unreachable {
                service: SERVICE,
                reason: format!("HTTP client initialisation failed: {e}"),
            })?;
        Ok(Self {
            url,
            timeout,
            http_client,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn unreachable(&self, err: reqwest::Error) -> ExternalServiceError {
        let reason = if err.is_timeout() {
            format!("timed out after {:?}", self.timeout)
        } else {
            err.to_string()
        };
        ExternalServiceError::Unreachable {
            service: SERVICE,
            reason,
        }
    }
}

#[async_trait]
impl TimestampAuthority for TsaClient {
    async fn timestamp(&self, digest: &Sha256Digest) -> Result<Vec<u8>, ExternalServiceError> {
        let request = TimestampRequest {
            hash: digest.to_hex(),
            alg: DigestAlgorithm::Sha256.name(),
        };

        let response = self
            .http_client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.unreachable(e))?;

        if !status.is_success() {
            return Err(ExternalServiceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).chars().take(256).collect(),
            });
        }

        let token = decode_timestamp_response(&body)?;
        tracing::debug!(tsa = %self.url, token_len = token.len(), "Timestamp token received");
        Ok(token)
    }
}

/// Extracts the token from a TSA response body.
pub fn decode_timestamp_response(body: &[u8]) -> Result<Vec<u8>, ExternalServiceError> {
    let unsupported = ExternalServiceError::UnsupportedResponse { service: SERVICE };
    let text = std::str::from_utf8(body).map_err(|_| unsupported.clone())?.trim();

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        match &value {
            Value::Object(fields) => {
                if let Some(token) = fields
                    .get("token")
                    .and_then(Value::as_str)
                    .and_then(decode_base64)
                {
                    return Ok(token);
                }
                if let Some(der) = fields.get("der").and_then(Value::as_str).and_then(decode_hex) {
                    return Ok(der);
                }
                return Err(unsupported);
            }
            Value::String(s) => {
                if let Some(token) = decode_base64(s) {
                    return Ok(token);
                }
            }
            _ => {}
        }
    }

    decode_base64(text).ok_or(unsupported)
}

fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    STANDARD
        .decode(&compact)
        .or_else(|_| STANDARD_NO_PAD.decode(&compact))
        .ok()
        .filter(|bytes| !bytes.is_empty())
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    hex::decode(input.trim()).ok().filter(|bytes| !bytes.is_empty())
}
