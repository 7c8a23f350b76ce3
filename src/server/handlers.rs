//! Axum handlers for the check and admin endpoints.
//!
//! Every business outcome is a `{"status": ...}` body. Only infrastructure
//! faults take the [`ApiError`] shape.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::authority::{
    Admin, AdminAccess, Authority, IssueOutcome, RevokeOutcome, ValidationOutcome,
};
use crate::license::format_timestamp;
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::logging::HealthResponse;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub authority: Arc<Authority>,
}

impl AppState {
    pub fn new(authority: Authority) -> Self {
        Self {
            authority: Arc::new(authority),
        }
    }
}

/// Request body for `POST /check`.
///
/// Fields are loosely typed so a missing or mistyped value becomes the
/// `error` status rather than a transport rejection.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub license_key: Option<Value>,
    #[serde(default)]
    pub machine_id: Option<Value>,
}

/// Request body for `POST /admin/licenses`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct IssueRequest {
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default)]
    pub days: Option<Value>,
}

/// Status reply shared by the check and admin endpoints.
#[derive(Debug, Deserialize, Serialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            expires_at: None,
        }
    }

    fn with_expiry(status: &str, expires_at: &DateTime<Utc>) -> Self {
        Self {
            status: status.to_string(),
            expires_at: Some(format_timestamp(expires_at)),
        }
    }
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, Json(StatusResponse::new("forbidden"))).into_response()
}

/// Bearer credential presented for admin endpoints, if any.
#[derive(Debug, Clone)]
pub struct AdminCredential(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for AdminCredential
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        Ok(AdminCredential(token))
    }
}

/// Resolve the credential to an admin handle or a ready `403` response.
fn admin_or_forbidden<'a>(
    authority: &'a Authority,
    credential: &AdminCredential,
) -> Result<Result<Admin<'a>, Response>, ApiError> {
    match authority.authorize(credential.0.as_deref())? {
        AdminAccess::Granted(admin) => Ok(Ok(admin)),
        AdminAccess::Forbidden => Ok(Err(forbidden())),
    }
}

/// Validate a license for a machine.
///
/// `POST /check`
///
/// Always answers `200` with a status unless the store or configuration
/// fails.
pub async fn check_handler(
    State(state): State<AppState>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Unreadable check request: {rejection}");
            return Ok(Json(StatusResponse::new("error")));
        }
    };

    let license_key = request.license_key.as_ref().and_then(Value::as_str);
    let machine_id = request.machine_id.as_ref().and_then(Value::as_str);

    info!("Check request for license_key={:?}", license_key);

    let outcome = state.authority.validate(license_key, machine_id).await?;

    let body = match &outcome {
        ValidationOutcome::Ok { expires_at } => {
            StatusResponse::with_expiry(outcome.status(), expires_at)
        }
        _ => StatusResponse::new(outcome.status()),
    };

    Ok(Json(body))
}

/// Issue or re-issue a license.
///
/// `POST /admin/licenses`
pub async fn issue_handler(
    State(state): State<AppState>,
    credential: AdminCredential,
    payload: Result<Json<IssueRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let admin = match admin_or_forbidden(&state.authority, &credential)? {
        Ok(admin) => admin,
        Err(denied) => return Ok(denied),
    };

    let Json(request) = payload.map_err(|rejection| {
        ApiError::with_message(ErrorCode::InvalidRequest, rejection.body_text())
    })?;

    let key = request.key.as_ref().and_then(Value::as_str);
    let days = request.days.as_ref().and_then(Value::as_i64);

    let outcome = admin.issue(key, days).await?;

    let response = match &outcome {
        IssueOutcome::Added { expires_at } => (
            StatusCode::CREATED,
            Json(StatusResponse::with_expiry(outcome.status(), expires_at)),
        ),
        IssueOutcome::InvalidKey | IssueOutcome::InvalidDays => (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse::new(outcome.status())),
        ),
    };

    Ok(response.into_response())
}

/// Revoke a license.
///
/// `DELETE /admin/licenses/{key}`
pub async fn revoke_handler(
    State(state): State<AppState>,
    credential: AdminCredential,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let admin = match admin_or_forbidden(&state.authority, &credential)? {
        Ok(admin) => admin,
        Err(denied) => return Ok(denied),
    };

    let outcome = admin.revoke(&key).await?;

    let code = match outcome {
        RevokeOutcome::Deleted => StatusCode::OK,
        RevokeOutcome::NotFound => StatusCode::NOT_FOUND,
    };

    Ok((code, Json(StatusResponse::new(outcome.status()))).into_response())
}

/// List every license, latest expiry first.
///
/// `GET /admin/licenses`
pub async fn list_handler(
    State(state): State<AppState>,
    credential: AdminCredential,
) -> Result<Response, ApiError> {
    let admin = match admin_or_forbidden(&state.authority, &credential)? {
        Ok(admin) => admin,
        Err(denied) => return Ok(denied),
    };

    let licenses = admin.list_all().await?;
    Ok(Json(licenses).into_response())
}

/// Service and store health.
///
/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.authority.store();
    let connected = store.ping().await.is_ok();
    Json(HealthResponse::healthy(connected, store.backend()))
}
