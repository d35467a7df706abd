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

//! HTTP client for a remote HSM.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list keys | `GET keys?status=&keyType=&page=&limit=` |
//! | generate key | `POST keys` |
//! | get key | `GET keys/{keyId}` |
//! | revoke key | `POST keys/{keyId}/revoke` |
//! | sign digest | `POST keys/{keyId}/sign` |
//! | sign file | `POST files/{fileId}/sign` |
//! | download | `GET signatures/{signatureId}/download` |
//!
//! Error bodies are `{"code": "...", "message": "..."}`. A `409` is mapped
//! onto [`ConflictReason`] by its `code`; a `404` becomes `NotFound`.

use super::{
    resolve_signing_key, FileSigningRequest, FileSigningResult, HsmService, HsmSignature,
    SignedFile,
};
use crate::config::DEFAULT_HSM_TIMEOUT;
use crate::crypto::{Sha256Digest, SignatureAlgorithm};
use crate::error::{ConflictReason, Error, ExternalServiceError, Result};
use crate::models::{HsmKey, KeyFilter, KeyGenerationParams, Page};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const SERVICE: &str = "hsm";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateKeyRequest<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    params: KeyGenerationParams,
}

#[derive(Serialize)]
struct SignDigestRequest<'a> {
    digest: String,
    algorithm: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignDigestResponse {
    signature: String,
    algorithm: String,
    #[serde(default)]
    certificate_chain: Vec<String>,
    public_key: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Remote HSM reached over HTTP with a bearer API key.
#[derive(Clone)]
pub struct HttpHsmClient {
    base_url: Url,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for HttpHsmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHsmClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpHsmClient {
    pub fn new(base_url: Url, api_key: Option<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, DEFAULT_HSM_TIMEOUT)
    }

    pub fn with_timeout(base_url: Url, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("countersign/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExternalServiceError::Unreachable {
                service: SERVICE,
                reason: format!("HTTP client initialisation failed: {e}"),
            })?;

        // `Url::join` drops the last segment unless the path ends in '/'
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            api_key,
            http_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let path = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let url = self
            .base_url
            .join(&path)
            .map_err(|e| Error::validation(format!("invalid HSM path '{path}': {e}")))?;

        let builder = self.http_client.request(method, url);
        Ok(match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        })
    }

    /// Sends the request and maps non-success statuses onto the taxonomy.
    async fn send(
        &self,
        builder: RequestBuilder,
        kind: &'static str,
        id: &str,
    ) -> Result<Response> {
        let response = builder.send().await.map_err(unreachable)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let error: ErrorBody = serde_json::from_slice(&body).unwrap_or_default();
        tracing::debug!(
            status = status.as_u16(),
            code = error.code.as_deref().unwrap_or(""),
            "HSM request rejected"
        );

        Err(match status {
            StatusCode::NOT_FOUND => Error::not_found(kind, id),
            StatusCode::CONFLICT => conflict_from_code(error.code.as_deref()).into(),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::validation(
                error
                    .message
                    .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned()),
            ),
            _ => ExternalServiceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).chars().take(256).collect(),
            }
            .into(),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        kind: &'static str,
        id: &str,
    ) -> Result<T> {
        let response = self.send(builder, kind, id).await?;
        let body = response.bytes().await.map_err(unreachable)?;
        serde_json::from_slice(&body).map_err(|e| {
            ExternalServiceError::MalformedResponse {
                service: SERVICE,
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn unreachable(err: reqwest::Error) -> Error {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    ExternalServiceError::Unreachable {
        service: SERVICE,
        reason,
    }
    .into()
}

fn malformed(reason: impl Into<String>) -> Error {
    ExternalServiceError::MalformedResponse {
        service: SERVICE,
        reason: reason.into(),
    }
    .into()
}

fn conflict_from_code(code: Option<&str>) -> ConflictReason {
    match code {
        Some("KEY_REVOKED") => ConflictReason::KeyRevoked,
        Some("KEY_INACTIVE") => ConflictReason::KeyInactive,
        Some("KEY_NOT_FOR_SIGNING") => ConflictReason::KeyNotForSigning,
        Some("FILE_ALREADY_SIGNED") | Some("ALREADY_SIGNED") => ConflictReason::AlreadySigned,
        Some(other) => ConflictReason::Remote(other.to_string()),
        None => ConflictReason::Remote("unspecified".to_string()),
    }
}

/// Pulls the filename out of a `Content-Disposition` header value.
fn filename_from_disposition(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[async_trait]
impl HsmService for HttpHsmClient {
    async fn list_keys(&self, filter: &KeyFilter) -> Result<Page<HsmKey>> {
        let builder = self.request(Method::GET, &["keys"])?.query(filter);
        self.send_json(builder, "keys", "list").await
    }

    async fn generate_key(&self, owner: &str, params: KeyGenerationParams) -> Result<HsmKey> {
        let builder = self.request(Method::POST, &["keys"])?.json(&GenerateKeyRequest {
            user_id: owner,
            params,
        });
        self.send_json(builder, "key", "new").await
    }

    async fn get_key(&self, key_id: &str) -> Result<HsmKey> {
        let builder = self.request(Method::GET, &["keys", key_id])?;
        self.send_json(builder, "key", key_id).await
    }

    async fn revoke_key(&self, key_id: &str) -> Result<HsmKey> {
        let builder = self.request(Method::POST, &["keys", key_id, "revoke"])?;
        self.send_json(builder, "key", key_id).await
    }

    async fn sign_digest(&self, key_id: &str, digest: &Sha256Digest) -> Result<HsmSignature> {
        let key = resolve_signing_key(self, Some(key_id)).await?;

        let builder = self
            .request(Method::POST, &["keys", key_id, "sign"])?
            .json(&SignDigestRequest {
                digest: digest.to_hex(),
                algorithm: "sha256",
            });
        let response: SignDigestResponse = self.send_json(builder, "key", key_id).await?;

        let algorithm = SignatureAlgorithm::from_name(&response.algorithm)
            .ok_or_else(|| malformed(format!("unknown algorithm '{}'", response.algorithm)))?;
        let signature = BASE64
            .decode(&response.signature)
            .map_err(|e| malformed(format!("signature: {e}")))?;
        let public_key = BASE64
            .decode(&response.public_key)
            .map_err(|e| malformed(format!("publicKey: {e}")))?;
        let certificate_chain = response
            .certificate_chain
            .iter()
            .map(|c| BASE64.decode(c).map_err(|e| malformed(format!("certificateChain: {e}"))))
            .collect::<Result<Vec<_>>>()?;

        Ok(HsmSignature {
            key_id: key.key_id,
            signature,
            algorithm,
            certificate_chain,
            public_key,
        })
    }

    async fn sign_file(&self, mut request: FileSigningRequest) -> Result<FileSigningResult> {
        if request.file_id.trim().is_empty() {
            return Err(Error::validation("fileId is required"));
        }
        let key = resolve_signing_key(self, request.key_id.as_deref()).await?;
        request.key_id = Some(key.key_id);

        let file_id = request.file_id.clone();
        let builder = self
            .request(Method::POST, &["files", &file_id, "sign"])?
            .json(&request);
        self.send_json(builder, "file", &file_id).await
    }

    async fn download_signed_file(&self, signature_id: &str) -> Result<SignedFile> {
        let builder = self.request(Method::GET, &["signatures", signature_id, "download"])?;
        let response = self.send(builder, "signature", signature_id).await?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| format!("{signature_id}.sig"));
        let bytes = response.bytes().await.map_err(unreachable)?.to_vec();

        Ok(SignedFile { bytes, filename })
    }
}
