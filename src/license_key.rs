//! License key generation and validation.
//!
//! Keys look like `FF4A-9B2C-D8E1-7F3A-C5B9`:
//!
//! - the first segment is the two-character prefix plus two random characters
//! - segments two to four are random
//! - the fifth segment is a checksum: the first four hex digits (uppercase) of
//!   SHA-256 over the first four segments concatenated without dashes
//!
//! The checksum lets the server reject mistyped or tampered keys before any
//! database lookup. It is not a secret.
//!
//! # Example
//!
//! ```rust
//! use fitflow::license_key::{generate_license_key, validate_license_key_format, verify_checksum, LicenseKeyConfig};
//!
//! let config = LicenseKeyConfig::default();
//! let key = generate_license_key(&config);
//! assert!(validate_license_key_format(&key, &config));
//! assert!(verify_checksum(&key));
//! ```

use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::config::LicenseConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Character set for the random key segments.
/// Excludes look-alike characters: I, O, 0, 1
const LICENSE_KEY_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of dash-separated segments in a key (including the checksum).
pub const KEY_SEGMENTS: usize = 5;

/// Characters per segment.
pub const SEGMENT_LENGTH: usize = 4;

/// Maximum attempts when searching for an unused key.
pub const MAX_GENERATION_ATTEMPTS: u32 = 10;

/// Configuration for license key generation.
#[derive(Debug, Clone)]
pub struct LicenseKeyConfig {
    /// Two-character prefix of the first segment (e.g., "FF")
    pub prefix: String,
}

impl Default for LicenseKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "FF".to_string(),
        }
    }
}

impl From<&LicenseConfig> for LicenseKeyConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
        }
    }
}

/// Generate `length` random characters from the key alphabet.
fn generate_segment(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..LICENSE_KEY_CHARSET.len());
            LICENSE_KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Compute the checksum segment for the concatenated body segments.
pub fn compute_checksum(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    hex::encode(digest)[..SEGMENT_LENGTH].to_uppercase()
}

/// Generate a license key with the given configuration.
pub fn generate_license_key(config: &LicenseKeyConfig) -> String {
    let first = format!(
        "{}{}",
        config.prefix,
        generate_segment(SEGMENT_LENGTH.saturating_sub(config.prefix.len()))
    );
    let body = [
        first,
        generate_segment(SEGMENT_LENGTH),
        generate_segment(SEGMENT_LENGTH),
        generate_segment(SEGMENT_LENGTH),
    ];

    let checksum = compute_checksum(&body.concat());
    format!("{}-{}", body.join("-"), checksum)
}

/// Validate that a license key matches the `PPxx-xxxx-xxxx-xxxx-cccc` structure.
///
/// Only the shape is checked here; see [`verify_checksum`] for integrity.
pub fn validate_license_key_format(key: &str, config: &LicenseKeyConfig) -> bool {
    let pattern = format!(
        r"^{}[A-Z0-9]{{2}}-[A-Z0-9]{{4}}-[A-Z0-9]{{4}}-[A-Z0-9]{{4}}-[A-Za-z0-9]{{4}}$",
        regex::escape(&config.prefix)
    );

    Regex::new(&pattern)
        .map(|re| re.is_match(key))
        .unwrap_or(false)
}

/// Recompute the checksum from the first four segments and compare it with the fifth.
pub fn verify_checksum(key: &str) -> bool {
    let parts: Vec<&str> = key.split('-').collect();
    if parts.len() != KEY_SEGMENTS {
        return false;
    }

    let expected = compute_checksum(&parts[..KEY_SEGMENTS - 1].concat());
    parts[KEY_SEGMENTS - 1] == expected
}

/// Format and checksum check combined; the gate applied to client-supplied keys.
pub fn is_well_formed(key: &str, config: &LicenseKeyConfig) -> bool {
    validate_license_key_format(key, config) && verify_checksum(key)
}

/// Split a license key into its body segments and checksum.
///
/// Returns `None` if the key does not have exactly five segments.
pub fn parse_license_key(key: &str) -> Option<(Vec<String>, String)> {
    let parts: Vec<&str> = key.split('-').collect();
    if parts.len() != KEY_SEGMENTS {
        return None;
    }

    let body = parts[..KEY_SEGMENTS - 1]
        .iter()
        .map(|s| s.to_string())
        .collect();
    Some((body, parts[KEY_SEGMENTS - 1].to_string()))
}

/// Generate a unique license key, checking against existing keys.
///
/// # Errors
///
/// Returns an error if a unique key cannot be generated within `max_retries`
/// attempts, or if `exists_fn` fails.
pub async fn generate_unique_license_key<F, Fut>(
    config: &LicenseKeyConfig,
    exists_fn: F,
    max_retries: u32,
) -> LicenseResult<String>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = LicenseResult<bool>>,
{
    for _ in 0..max_retries {
        let key = generate_license_key(config);
        if !exists_fn(key.clone()).await? {
            return Ok(key);
        }
    }

    Err(LicenseError::ServerError(format!(
        "failed to generate unique license key after {max_retries} attempts"
    )))
}
