//! License endpoints used by the desktop app and the dashboard.
//!
//! # Endpoints
//!
//! - `POST /api/license/activate` - Activate a device (rate limited)
//! - `POST /api/license/deactivate` - Deactivate a device (license key or session)
//! - `POST /api/license/validate` - Periodic online check (rate limited)
//! - `GET /api/license/devices` - Devices of the session's account

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;

use crate::errors::LicenseError;
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::auth::{OptionalSession, Session};
use crate::server::handlers::AppState;
use crate::server::license_manager::{
    ActivateRequest, ActivationData, DeactivateRequest, DeactivationAuth, DeactivationData,
    DeviceListing, ValidateRequest, ValidationData,
};
use crate::server::rate_limit::RateLimitAction;
use crate::server::validation::rate_limit_identifier;

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub success: bool,
    pub message: String,
    pub data: ActivationData,
}

#[derive(Debug, Serialize)]
pub struct DeactivateResponse {
    pub success: bool,
    pub message: String,
    pub data: DeactivationData,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub success: bool,
    pub valid: bool,
    pub message: String,
    pub data: ValidationData,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub success: bool,
    pub data: DeviceListing,
}

// ============================================================================
// Helpers
// ============================================================================

/// Map a JSON body rejection to a 400 with the standard envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        ApiError::with_message(
            ErrorCode::InvalidRequest,
            format!("Invalid request data: {}", rejection.body_text()),
        )
    })
}

fn throttle(
    state: &AppState,
    action: RateLimitAction,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<(), ApiError> {
    let identifier = rate_limit_identifier(headers, peer.map(|ConnectInfo(addr)| addr));
    state
        .rate_limiter
        .check(action, &identifier)
        .map_err(|err| match err {
            LicenseError::RateLimited { retry_after_secs } => {
                let what = match action {
                    RateLimitAction::Activation => "activation",
                    RateLimitAction::Validation => "validation",
                };
                ApiError::rate_limited(what, retry_after_secs)
            }
            other => other.into(),
        })
}

/// Domain error to API error, pointing device-limit errors at the dashboard.
fn license_error(state: &AppState, err: LicenseError) -> ApiError {
    let is_limit = matches!(err, LicenseError::DeviceLimitReached { .. });
    let mut api = ApiError::from(err);

    if is_limit {
        if let Some(serde_json::Value::Object(details)) = api.error.details.as_mut() {
            details.insert(
                "dashboardUrl".to_string(),
                serde_json::Value::String(state.licenses.dashboard_url().to_string()),
            );
        }
    }

    api
}

// ============================================================================
// Handlers
// ============================================================================

/// Activate a device.
///
/// `200` with a signed license, `400` invalid body, `401` invalid key,
/// `403` unverified email, lapsed trial or subscription, device limit,
/// `429` too many attempts.
pub async fn activate_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<Json<ActivateResponse>, ApiError> {
    throttle(&state, RateLimitAction::Activation, &headers, peer)?;
    let request = json_body(payload)?;

    let outcome = state
        .licenses
        .activate(&request, Utc::now().naive_utc())
        .await
        .map_err(|e| license_error(&state, e))?;

    Ok(Json(ActivateResponse {
        success: true,
        message: outcome.message,
        data: outcome.data,
    }))
}

/// Deactivate a device.
///
/// The desktop app sends its `licenseKey`; the dashboard relies on its
/// session token instead.
pub async fn deactivate_handler(
    State(state): State<AppState>,
    OptionalSession(session): OptionalSession,
    payload: Result<Json<DeactivateRequest>, JsonRejection>,
) -> Result<Json<DeactivateResponse>, ApiError> {
    let request = json_body(payload)?;

    let license_key = request
        .license_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());

    let auth = match (license_key, &session) {
        (Some(key), _) => DeactivationAuth::LicenseKey(key),
        (None, Some(session)) => DeactivationAuth::Session(&session.email),
        (None, None) => return Err(LicenseError::Unauthenticated.into()),
    };

    let data = state
        .licenses
        .deactivate(auth, &request)
        .await
        .map_err(|e| match e {
            LicenseError::AccountNotFound if license_key.is_some() => {
                ApiError::with_message(ErrorCode::AccountNotFound, "Invalid license key")
            }
            other => license_error(&state, other),
        })?;

    Ok(Json(DeactivateResponse {
        success: true,
        message: "Device deactivated successfully".to_string(),
        data,
    }))
}

/// Periodic online validation of an activated device.
pub async fn validate_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidateResponse>, ApiError> {
    throttle(&state, RateLimitAction::Validation, &headers, peer)?;
    let request = json_body(payload)?;

    let outcome = state
        .licenses
        .validate(&request, Utc::now().naive_utc())
        .await
        .map_err(|e| license_error(&state, e))?;

    Ok(Json(ValidateResponse {
        success: true,
        valid: outcome.valid,
        message: outcome.message().to_string(),
        data: outcome.data,
    }))
}

/// All devices (active and inactive) of the session's account.
pub async fn devices_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<DevicesResponse>, ApiError> {
    let data = state
        .licenses
        .list_devices(&session.email, Utc::now().naive_utc())
        .await
        .map_err(|e| license_error(&state, e))?;

    Ok(Json(DevicesResponse {
        success: true,
        data,
    }))
}
