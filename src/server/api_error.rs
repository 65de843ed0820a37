//! Standardized API error responses for all FitFlow endpoints.
//!
//! # Response Format
//!
//! All error responses follow this JSON structure:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "DEVICE_LIMIT_REACHED",
//!     "message": "Device limit reached (1/1). Please deactivate a device from your dashboard to activate a new one.",
//!     "details": { "devicesUsed": 1, "deviceLimit": 1, "dashboardUrl": "https://fitflow.com/dashboard" }
//!   }
//! }
//! ```
//!
//! The `details` field is optional and may contain additional context.
//! Rate-limited responses also carry a `Retry-After` header.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::LicenseError;

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Validation Errors (400) ===
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// A field value is invalid
    InvalidField,
    /// Currency code is not supported
    UnsupportedCurrency,

    // === Authentication Errors (401) ===
    /// License key is malformed or unknown
    InvalidLicenseKey,
    /// No session token provided
    MissingToken,
    /// Session token is invalid
    InvalidToken,
    /// Session token has expired
    TokenExpired,
    /// Signed license envelope failed verification
    InvalidSignature,

    // === Authorization Errors (403) ===
    /// Account email is not verified
    EmailNotVerified,
    /// Subscription is expired or cancelled
    SubscriptionInactive,
    /// Account trial has ended
    TrialExpired,
    /// Activating another device would exceed the plan limit
    DeviceLimitReached,
    /// Device is not activated with this license
    DeviceNotActivated,

    // === Resource Errors (404) ===
    /// Device is unknown or already deactivated
    DeviceNotFound,
    /// Account was not found
    AccountNotFound,

    // === Throttling (429) ===
    /// Too many attempts from this client
    RateLimited,

    // === Server Errors (5xx) ===
    /// Server configuration error
    ConfigError,
    /// External service communication failed
    NetworkError,
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest
            | ErrorCode::InvalidField
            | ErrorCode::UnsupportedCurrency => StatusCode::BAD_REQUEST,

            ErrorCode::InvalidLicenseKey
            | ErrorCode::MissingToken
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired
            | ErrorCode::InvalidSignature => StatusCode::UNAUTHORIZED,

            ErrorCode::EmailNotVerified
            | ErrorCode::SubscriptionInactive
            | ErrorCode::TrialExpired
            | ErrorCode::DeviceLimitReached
            | ErrorCode::DeviceNotActivated => StatusCode::FORBIDDEN,

            ErrorCode::DeviceNotFound | ErrorCode::AccountNotFound => StatusCode::NOT_FOUND,

            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::ConfigError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,

            ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "Invalid request data",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::UnsupportedCurrency => "Invalid or unsupported target currency",
            ErrorCode::InvalidLicenseKey => "Invalid license key",
            ErrorCode::MissingToken => "Authentication required",
            ErrorCode::InvalidToken => "Session token is invalid",
            ErrorCode::TokenExpired => "Session token has expired",
            ErrorCode::InvalidSignature => "License signature is invalid",
            ErrorCode::EmailNotVerified => "Please verify your email before activating devices",
            ErrorCode::SubscriptionInactive => {
                "Your subscription has expired. Please renew to activate devices."
            }
            ErrorCode::TrialExpired => {
                "Your trial has expired. Please upgrade to continue using FitFlow."
            }
            ErrorCode::DeviceLimitReached => "Device limit reached",
            ErrorCode::DeviceNotActivated => "Device not activated with this license",
            ErrorCode::DeviceNotFound => "Device not found or already deactivated",
            ErrorCode::AccountNotFound => "Account not found",
            ErrorCode::RateLimited => "Too many requests",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::NetworkError => "Failed to communicate with external service",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorBody,
    /// Seconds for the `Retry-After` header
    #[serde(skip)]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Creates a new API error with the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
            retry_after_secs: None,
        }
    }

    /// Creates a new API error with a custom message and details.
    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::with_message(code, message).details(details)
    }

    /// Adds details to an existing error.
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    // === Convenience constructors for common errors ===

    /// Invalid request error with field details.
    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_details(
            ErrorCode::InvalidField,
            format!("Invalid value for '{}': {}", field, reason),
            serde_json::json!({ "field": field }),
        )
    }

    /// Throttled request; `what` names the attempt ("activation", "validation").
    pub fn rate_limited(what: &str, retry_after_secs: u64) -> Self {
        let minutes = retry_after_secs.div_ceil(60).max(1);
        let mut err = Self::with_details(
            ErrorCode::RateLimited,
            format!("Too many {what} attempts. Try again in {minutes} minutes."),
            serde_json::json!({ "retryAfter": retry_after_secs }),
        );
        err.retry_after_secs = Some(retry_after_secs);
        err
    }

    /// Internal server error.
    pub fn internal_error() -> Self {
        Self::new(ErrorCode::InternalError)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs;
        let mut response = (status, Json(self)).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.error.code.default_message(),
            self.error.message
        )
    }
}

impl std::error::Error for ApiError {}

// === Conversions from domain errors ===

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::InvalidRequest(msg) => ApiError::with_message(ErrorCode::InvalidRequest, msg),
            LicenseError::InvalidLicenseKey => ApiError::new(ErrorCode::InvalidLicenseKey),
            LicenseError::Unauthenticated => ApiError::with_message(
                ErrorCode::MissingToken,
                "Authentication required. Provide either licenseKey or valid session.",
            ),
            LicenseError::EmailNotVerified => ApiError::new(ErrorCode::EmailNotVerified),
            LicenseError::SubscriptionInactive => ApiError::new(ErrorCode::SubscriptionInactive),
            LicenseError::TrialExpired => ApiError::new(ErrorCode::TrialExpired),
            LicenseError::DeviceLimitReached { used, limit } => ApiError::with_details(
                ErrorCode::DeviceLimitReached,
                format!(
                    "Device limit reached ({used}/{limit}). Please deactivate a device from your dashboard to activate a new one."
                ),
                serde_json::json!({ "devicesUsed": used, "deviceLimit": limit }),
            ),
            LicenseError::DeviceNotActivated => ApiError::new(ErrorCode::DeviceNotActivated),
            LicenseError::DeviceNotFound => ApiError::new(ErrorCode::DeviceNotFound),
            LicenseError::AccountNotFound => ApiError::new(ErrorCode::AccountNotFound),
            LicenseError::RateLimited { retry_after_secs } => {
                ApiError::rate_limited("request", retry_after_secs)
            }
            LicenseError::InvalidSignature => ApiError::new(ErrorCode::InvalidSignature),
            LicenseError::UnsupportedCurrency(code) => ApiError::with_message(
                ErrorCode::UnsupportedCurrency,
                format!("Invalid or unsupported target currency: {code}"),
            ),
            LicenseError::ConfigError(msg) => {
                error!("Configuration error while handling request: {msg}");
                ApiError::new(ErrorCode::ConfigError)
            }
            LicenseError::NetworkError(e) => {
                error!("Upstream request failed: {e}");
                ApiError::new(ErrorCode::NetworkError)
            }
            LicenseError::ServerError(msg) => {
                error!("Internal error while handling request: {msg}");
                ApiError::internal_error()
            }
        }
    }
}
