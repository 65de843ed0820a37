//! Domain error type shared by the library and the server.

use thiserror::Error;

/// Errors produced by license, signing, currency and storage operations.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Malformed request input (missing field, bad platform, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// License key is malformed, fails its checksum, or is unknown.
    #[error("invalid license key")]
    InvalidLicenseKey,

    /// No usable session or license key was presented.
    #[error("authentication required")]
    Unauthenticated,

    #[error("email address has not been verified")]
    EmailNotVerified,

    /// Subscription is `expired` or `cancelled`.
    #[error("subscription is inactive")]
    SubscriptionInactive,

    #[error("trial period has ended")]
    TrialExpired,

    /// Activating another device would exceed the account's device limit.
    #[error("device limit reached ({used}/{limit})")]
    DeviceLimitReached { used: u32, limit: u32 },

    /// The device is not an active activation of this license.
    #[error("device is not activated with this license")]
    DeviceNotActivated,

    /// Device is unknown or already deactivated.
    #[error("device not found or already deactivated")]
    DeviceNotFound,

    #[error("account not found")]
    AccountNotFound,

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Signed license envelope is malformed or its signature does not match.
    #[error("invalid license signature")]
    InvalidSignature,

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Upstream HTTP service failed (geolocation, exchange rates).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Storage or other internal failure.
    #[error("server error: {0}")]
    ServerError(String),
}

pub type LicenseResult<T> = Result<T, LicenseError>;
