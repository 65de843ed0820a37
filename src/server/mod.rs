//! Server-side components for FitFlow licensing.
//!
//! This module contains:
//! - `database`        → SQLite storage for accounts, devices and rates
//! - `license_manager` → activation, deactivation and validation flows
//! - `license_api`     → axum handlers for `/api/license/*`
//! - `currency_api`    → axum handlers for `/api/currency/*`
//! - `handlers`        → shared `AppState` and the health check
//! - `routes`          → router builder
//! - `auth`            → dashboard session tokens
//! - `rate_limit`      → in-process per-IP rate limiting
//! - `validation`      → request field validation
//! - `api_error`       → standardized error responses
//! - `logging`         → request logging and license events
//! - `cli`             → operator subcommands

pub mod api_error;
pub mod auth;
pub mod cli;
pub mod currency_api;
pub mod database;
pub mod handlers;
pub mod license_api;
pub mod license_manager;
pub mod logging;
pub mod rate_limit;
pub mod routes;
pub mod validation;

pub use api_error::{ApiError, ErrorCode};
pub use auth::{AuthError, Claims, OptionalSession, Session, SessionTokens};
pub use cli::{execute_command, parse_command, Command};
pub use database::{Account, ActivatedDevice, Database};
pub use handlers::{health_handler, AppState};
pub use license_manager::{
    ActivateRequest, ActivationKind, ActivationOutcome, DeactivateRequest, DeactivationAuth,
    DeviceListing, LicenseManager, ValidateRequest, ValidationOutcome,
};
pub use logging::{log_license_event, request_logging_middleware, HealthResponse, LicenseEvent};
pub use rate_limit::{RateLimitAction, RateLimiter, SweeperHandle};
pub use routes::build_router;
pub use validation::{Platform, ValidationError, ValidationResult};
