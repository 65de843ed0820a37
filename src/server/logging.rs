//! Request logging middleware and structured license events.
//!
//! Every request gets an `X-Request-Id` (reused from the client when it sent
//! a valid one), a tracing span, and a completion line with status and
//! duration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::middleware;
//! use fitflow::server::logging::request_logging_middleware;
//!
//! let app = Router::new()
//!     .route("/health", get(health_handler))
//!     .layer(middleware::from_fn(request_logging_middleware));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// License and account events worth an audit line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// New device activated with a fresh trial
    Activated,
    /// Previously deactivated device activated again
    Reactivated,
    /// Activation request for a device that was already active
    AlreadyActive,
    Deactivated,
    Validated,
    /// Activation refused (unverified, expired, device limit)
    ActivationDenied,
    ValidationFailed,
    AccountCreated,
    EmailVerified,
    /// Plan purchase applied to an account
    Purchase,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Activated => "activated",
            LicenseEvent::Reactivated => "reactivated",
            LicenseEvent::AlreadyActive => "already_active",
            LicenseEvent::Deactivated => "deactivated",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ActivationDenied => "activation_denied",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::AccountCreated => "account_created",
            LicenseEvent::EmailVerified => "email_verified",
            LicenseEvent::Purchase => "purchase",
        };
        write!(f, "{}", s)
    }
}

/// Shorten a license key for logs: `FFAB-CDEF-...` becomes `FFAB-****`.
pub fn mask_license_key(key: &str) -> String {
    match key.split_once('-') {
        Some((first, _)) => format!("{first}-****"),
        None => "****".to_string(),
    }
}

/// Log a license event.
///
/// Denials and failures log at `warn`, everything else at `info`. The
/// license key is masked.
pub fn log_license_event(
    event: LicenseEvent,
    license_key: &str,
    device_id: Option<&str>,
    details: Option<&str>,
) {
    let span = info_span!(
        "license_event",
        event = %event,
        license = %mask_license_key(license_key),
        device_id = device_id.unwrap_or("-"),
    );
    let _enter = span.enter();

    match (event, details) {
        (LicenseEvent::ActivationDenied | LicenseEvent::ValidationFailed, Some(d)) => {
            warn!(reason = %d, "License event occurred")
        }
        (LicenseEvent::ActivationDenied | LicenseEvent::ValidationFailed, None) => {
            warn!("License event occurred")
        }
        (_, Some(d)) => info!(details = %d, "License event occurred"),
        (_, None) => info!("License event occurred"),
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn incoming_request_id(request: &Request) -> Option<String> {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .map(|id| id.to_string())
}

/// Logging middleware that tracks request timing and request IDs.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = incoming_request_id(&request).unwrap_or_else(generate_request_id);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    let status = response.status();

    let _enter = span.enter();
    if status.is_server_error() {
        warn!(
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request failed"
        );
    } else {
        info!(
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Health check response structure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: DatabaseHealth,
}

/// Database health status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub db_type: String,
}

impl HealthResponse {
    pub fn healthy(db_connected: bool) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: "fitflow".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: "sqlite".to_string(),
            },
        }
    }
}
