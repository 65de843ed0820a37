//! Signed license payloads for offline use by the desktop client.
//!
//! An envelope is `base64(JSON{"payload": <json string>, "signature": <hex>})`
//! where the signature is HMAC-SHA256 over the payload string. Verification
//! needs the same shared secret as signing.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{resolve_secret, LicenseConfig};
use crate::errors::{LicenseError, LicenseResult};

/// Claims carried inside a signed envelope.
///
/// Field names match what shipped desktop builds parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePayload {
    /// License key
    pub key: String,
    /// Device identifier
    pub device: String,
    /// Device trial end as RFC 3339, if any
    #[serde(rename = "trialEnd")]
    pub trial_end: Option<String>,
    /// Account subscription status at issue time
    pub status: String,
    /// Issue time in milliseconds since the epoch
    pub timestamp: i64,
}

impl LicensePayload {
    pub fn new(
        license_key: &str,
        device_id: &str,
        trial_ends_at: Option<NaiveDateTime>,
        subscription_status: &str,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: license_key.to_string(),
            device: device_id.to_string(),
            trial_end: trial_ends_at.map(iso_timestamp),
            status: subscription_status.to_string(),
            timestamp: issued_at.timestamp_millis(),
        }
    }

    /// Parsed trial end, if present and well-formed.
    pub fn trial_ends_at(&self) -> Option<DateTime<Utc>> {
        self.trial_end
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Naive UTC time as RFC 3339 with milliseconds and a `Z` suffix.
pub fn iso_timestamp(t: NaiveDateTime) -> String {
    t.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    payload: String,
    signature: String,
}

/// HMAC-SHA256 signer/verifier for license payloads.
#[derive(Clone)]
pub struct LicenseSigner {
    key: hmac::Key,
}

impl LicenseSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Build a signer from `license.signing_secret`.
    pub fn from_config(config: &LicenseConfig) -> LicenseResult<Self> {
        let secret = resolve_secret(&config.signing_secret, "license.signing_secret")?;
        Ok(Self::new(secret.as_bytes()))
    }

    /// Serialize and sign a payload into a transportable envelope.
    pub fn sign(&self, payload: &LicensePayload) -> LicenseResult<String> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| LicenseError::ServerError(format!("failed to encode payload: {e}")))?;
        let tag = hmac::sign(&self.key, payload.as_bytes());

        let envelope = Envelope {
            signature: hex::encode(tag.as_ref()),
            payload,
        };
        let json = serde_json::to_vec(&envelope)
            .map_err(|e| LicenseError::ServerError(format!("failed to encode envelope: {e}")))?;

        Ok(B64.encode(json))
    }

    /// Verify an envelope and return its payload.
    ///
    /// The comparison is constant-time. Any decoding problem is reported as
    /// [`LicenseError::InvalidSignature`].
    pub fn verify(&self, envelope: &str) -> LicenseResult<LicensePayload> {
        let raw = B64
            .decode(envelope.trim())
            .map_err(|_| LicenseError::InvalidSignature)?;
        let envelope: Envelope =
            serde_json::from_slice(&raw).map_err(|_| LicenseError::InvalidSignature)?;
        let signature = hex::decode(&envelope.signature).map_err(|_| LicenseError::InvalidSignature)?;

        hmac::verify(&self.key, envelope.payload.as_bytes(), &signature)
            .map_err(|_| LicenseError::InvalidSignature)?;

        serde_json::from_str(&envelope.payload).map_err(|_| LicenseError::InvalidSignature)
    }
}

impl std::fmt::Debug for LicenseSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseSigner").finish_non_exhaustive()
    }
}

/// Short, secret-free fingerprint of a key/device pair (first 16 hex chars
/// of SHA-256 over `key:device`).
pub fn verification_hash(license_key: &str, device_id: &str) -> String {
    let digest = Sha256::digest(format!("{license_key}:{device_id}").as_bytes());
    hex::encode(digest)[..16].to_string()
}
