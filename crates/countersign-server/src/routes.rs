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

//! HTTP routes for the delegation API.
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | POST | /delegations | create |
//! | GET | /delegations | list |
//! | GET | /delegations/{id} | fetch one |
//! | PATCH | /delegations/{id} | status change and/or detail update |
//! | GET | /signatures/{id} | signature record |
//! | GET | /signatures/{id}/detached | detached signature |
//! | GET | /health | liveness |
//!
//! Every route except `/health` requires an `x-actor-id` header naming the
//! authenticated principal.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use countersign::models::{
    DelegationDetails, DelegationEvent, DelegationFilter, DelegationStatus, NewDelegation, Page,
    SignatureDelegation, SignatureRecord, SignerInfo,
};
use countersign::security::RolePermissions;
use countersign::signing::{DetachedSignature, SignRequest, TimestampOutcome, TimestampPolicy};
use countersign::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const ACTOR_HEADER: &str = "x-actor-id";

type ApiResult<T> = Result<T, ApiError>;

/// The principal a request acts for.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Actor(v.to_string()))
            .ok_or(ApiError::MissingActor)
    }
}

/// `Json` whose rejections answer with the API's error body.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// `Query` counterpart of [`ApiJson`].
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/delegations", get(list_delegations).post(create_delegation))
        .route("/delegations/{id}", get(get_delegation).patch(patch_delegation))
        .route("/signatures/{id}", get(get_signature))
        .route("/signatures/{id}/detached", get(get_detached_signature))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_id(raw: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(raw).map_err(|_| Error::validation(format!("invalid id '{raw}'")))
}

async fn health() -> impl IntoResponse {
    "ok"
}

async fn create_delegation(
    State(state): State<AppState>,
    Actor(actor): Actor,
    ApiJson(request): ApiJson<NewDelegation>,
) -> ApiResult<(StatusCode, Json<SignatureDelegation>)> {
    let delegation = state.service.engine().create(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(delegation)))
}

async fn get_delegation(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<SignatureDelegation>> {
    let delegation = state.service.engine().get_for(parse_id(&id)?, &actor).await?;
    Ok(Json(delegation))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListParams {
    pub delegate_id: Option<String>,
    pub delegator_id: Option<String>,
    pub status: Option<DelegationStatus>,
    pub document_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

async fn list_delegations(
    State(state): State<AppState>,
    Actor(actor): Actor,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<Page<SignatureDelegation>>> {
    let filter = DelegationFilter {
        delegate_id: params.delegate_id,
        delegator_id: params.delegator_id,
        status: params.status,
        document_id: params.document_id,
        page: params.page,
        limit: params.limit,
    };
    Ok(Json(state.service.engine().list_for(&actor, filter).await?))
}

/// Body of `PATCH /delegations/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchDelegation {
    pub status: Option<DelegationStatus>,
    pub reason: Option<String>,
    pub permissions: Option<RolePermissions>,
    pub metadata: Option<Map<String, Value>>,
    /// Only read when `status` is `signed`; defaults to the actor's id
    pub signer_info: Option<SignerInfo>,
    pub timestamp_policy: Option<TimestampPolicy>,
}

#[derive(Debug, Serialize)]
pub struct PatchResponse {
    #[serde(flatten)]
    pub delegation: SignatureDelegation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

async fn patch_delegation(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PatchDelegation>,
) -> ApiResult<Json<PatchResponse>> {
    let id = parse_id(&id)?;
    let engine = state.service.engine();

    // Resolve the event up front so a bad status leaves details untouched
    let event = match body.status {
        Some(status) => Some(DelegationEvent::for_target(status).ok_or_else(|| {
            Error::validation(format!("cannot transition a delegation to '{status}'"))
        })?),
        None => None,
    };

    let details = DelegationDetails {
        reason: body.reason,
        permissions: body.permissions,
        metadata: body.metadata,
    };
    let backend = match event {
        Some(DelegationEvent::Sign) => Some(
            state
                .backend
                .as_deref()
                .ok_or_else(|| Error::validation("no signing backend is configured"))?,
        ),
        _ => None,
    };

    // Nothing is written unless the details and the transition both pass
    engine.check_change(id, &actor, &details, event).await?;

    let updated = if details.is_empty() {
        None
    } else {
        Some(engine.update(id, &actor, details).await?)
    };

    let response = match (event, backend) {
        (Some(DelegationEvent::Sign), Some(backend)) => {
            let request = SignRequest {
                signer_info: body.signer_info.unwrap_or_else(|| SignerInfo {
                    name: actor.clone(),
                    ..Default::default()
                }),
                timestamp_policy: body.timestamp_policy,
            };
            let outcome = state
                .service
                .sign_delegation(id, &actor, backend, request, Some(&state.shutdown))
                .await?;
            PatchResponse {
                delegation: outcome.delegation,
                signature_id: Some(outcome.record.signature_id),
                timestamp: Some(timestamp_label(&outcome.timestamp).to_string()),
            }
        }
        (Some(event), _) => PatchResponse {
            delegation: engine.transition(id, event, &actor).await?,
            signature_id: None,
            timestamp: None,
        },
        (None, _) => PatchResponse {
            delegation: match updated {
                Some(d) => d,
                None => engine.get(id).await?,
            },
            signature_id: None,
            timestamp: None,
        },
    };
    Ok(Json(response))
}

fn timestamp_label(outcome: &TimestampOutcome) -> &'static str {
    match outcome {
        TimestampOutcome::NotRequested => "not_requested",
        TimestampOutcome::Attached => "attached",
        TimestampOutcome::Unavailable { .. } => "unavailable",
    }
}

async fn get_signature(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<SignatureRecord>> {
    Ok(Json(state.service.get_record_for(parse_id(&id)?, &actor).await?))
}

async fn get_detached_signature(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<DetachedSignature>> {
    let record = state.service.get_record_for(parse_id(&id)?, &actor).await?;
    Ok(Json(DetachedSignature::from_record(&record)))
}
