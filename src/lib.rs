//! FitFlow licensing - device activation, offline license signing and
//! localized pricing for the FitFlow desktop app.
//!
//! # Features
//!
//! - `server` - HTTP server, SQLite storage, session tokens, rate limiting
//!   and the exchange-rate cache. Enabled by default.
//!
//! Without `server` the crate still provides everything the desktop client
//! needs offline: license key checks, signed payload verification, plan
//! rules and price conversion.
//!
//! # Example
//!
//! ```toml
//! # Full server
//! fitflow-licensing = { path = "." }
//!
//! # Client-side core only
//! fitflow-licensing = { path = ".", default-features = false }
//! ```

// Core modules (always available)
pub mod config;
pub mod currency;
pub mod errors;
pub mod license_key;
pub mod plans;
pub mod signing;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;

pub use errors::{LicenseError, LicenseResult};
pub use license_key::{
    generate_license_key, is_well_formed, validate_license_key_format, verify_checksum,
    LicenseKeyConfig,
};
pub use signing::{verification_hash, LicensePayload, LicenseSigner};
