use std::sync::Arc;

use axum::{extract::FromRef, extract::State, Json};

use crate::config::FitflowConfig;
use crate::currency::{GeoLocator, RateService};
use crate::errors::LicenseResult;
use crate::server::auth::SessionTokens;
use crate::server::database::Database;
use crate::server::license_manager::LicenseManager;
use crate::server::logging::HealthResponse;
use crate::server::rate_limit::RateLimiter;

/// Shared application state for handlers.
///
/// Each field can be extracted on its own through [`FromRef`].
#[derive(Clone, FromRef)]
pub struct AppState {
    pub db: Arc<Database>,
    pub licenses: Arc<LicenseManager>,
    /// Process-scoped; see `RateLimiter::spawn_sweeper` for cleanup
    pub rate_limiter: RateLimiter,
    pub sessions: Arc<SessionTokens>,
    pub geo: GeoLocator,
    pub rates: RateService,
}

impl AppState {
    /// Wire every service from configuration.
    ///
    /// Fails when the license signing secret or the session secret is missing.
    pub fn from_config(db: Arc<Database>, config: &FitflowConfig) -> LicenseResult<Self> {
        Ok(Self {
            licenses: Arc::new(LicenseManager::from_config(Arc::clone(&db), config)?),
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            sessions: Arc::new(SessionTokens::from_config(&config.auth)?),
            geo: GeoLocator::from_config(&config.currency),
            rates: RateService::from_config(Arc::clone(&db), &config.currency),
            db,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("licenses", &self.licenses)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.db.ping().await))
}
