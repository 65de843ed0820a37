//! Request validation utilities for the license API.
//!
//! This module provides validation functions for the fields accepted by the
//! public endpoints, plus client address extraction for rate limiting.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::errors::LicenseError;

/// Validation error type.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field_name: &str, message: impl Into<String>) -> Self {
        Self {
            field: field_name.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for LicenseError {
    fn from(err: ValidationError) -> Self {
        LicenseError::InvalidRequest(err.to_string())
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted device identifier, name or version string.
pub const MAX_FIELD_LENGTH: usize = 255;

/// Desktop platform, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Mac,
    Linux,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Linux => "linux",
        }
    }
}

impl FromStr for Platform {
    type Err = ValidationError;

    /// Accepts `windows`, `mac`, `linux` and the Node-style aliases
    /// `win32` and `darwin`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "windows" | "win32" => Ok(Platform::Windows),
            "mac" | "darwin" => Ok(Platform::Mac),
            "linux" => Ok(Platform::Linux),
            _ => Err(ValidationError::new(
                "platform",
                "must be one of: windows, mac, linux, win32, darwin",
            )),
        }
    }
}

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use fitflow::server::validation::validate_not_empty;
///
/// assert!(validate_not_empty("hello", "name").is_ok());
/// assert!(validate_not_empty("", "name").is_err());
/// assert!(validate_not_empty("   ", "name").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::new(field_name, "cannot be empty"))
    } else {
        Ok(())
    }
}

/// Validate string length is within bounds.
pub fn validate_length(
    value: &str,
    min: usize,
    max: usize,
    field_name: &str,
) -> ValidationResult<()> {
    let len = value.chars().count();
    if len < min {
        Err(ValidationError::new(
            field_name,
            format!("must be at least {} characters", min),
        ))
    } else if len > max {
        Err(ValidationError::new(
            field_name,
            format!("must be at most {} characters", max),
        ))
    } else {
        Ok(())
    }
}

/// A required, non-blank field of bounded length.
pub fn validate_required(value: &str, field_name: &str) -> ValidationResult<()> {
    validate_not_empty(value, field_name)?;
    validate_length(value, 1, MAX_FIELD_LENGTH, field_name)
}

/// Normalize an optional free-text field: blank becomes `None`.
pub fn normalize_optional(value: Option<&str>, field_name: &str) -> ValidationResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => {
            validate_length(v, 1, MAX_FIELD_LENGTH, field_name)?;
            Ok(Some(v.to_string()))
        }
        None => Ok(None),
    }
}

/// Validate an email address (shape only).
pub fn validate_email(value: &str, field_name: &str) -> ValidationResult<()> {
    let valid = regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|re| re.is_match(value))
        .unwrap_or(false);

    if valid && value.len() <= MAX_FIELD_LENGTH {
        Ok(())
    } else {
        Err(ValidationError::new(field_name, "invalid email address"))
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Identifier used for rate limiting: the first `x-forwarded-for` entry,
/// then `x-real-ip`, then the peer address, else `"unknown"`.
pub fn rate_limit_identifier(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_value(headers, "x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
