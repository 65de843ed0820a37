use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;

use crate::server::currency_api::{convert_handler, detect_handler, pricing_handler};
use crate::server::handlers::{health_handler, AppState};
use crate::server::license_api::{
    activate_handler, deactivate_handler, devices_handler, validate_handler,
};
use crate::server::logging::request_logging_middleware;

/// Build the application router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// rate limiter can fall back to the peer address when no proxy headers are
/// present.
///
/// # Routes
///
/// - `GET /health` - Service and database status
/// - `POST /api/license/activate` - Activate a device
/// - `POST /api/license/deactivate` - Deactivate a device
/// - `POST /api/license/validate` - Validate an activated device
/// - `GET /api/license/devices` - List devices (session token)
/// - `GET|POST /api/currency/detect` - Detect the visitor's currency
/// - `POST /api/currency/convert` - Convert USD prices
/// - `GET /api/currency/convert` - Pricing tiers for `?currency=`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/license/activate", post(activate_handler))
        .route("/api/license/deactivate", post(deactivate_handler))
        .route("/api/license/validate", post(validate_handler))
        .route("/api/license/devices", get(devices_handler))
        .route(
            "/api/currency/detect",
            get(detect_handler).post(detect_handler),
        )
        .route(
            "/api/currency/convert",
            get(pricing_handler).post(convert_handler),
        )
        .layer(ServiceBuilder::new().layer(middleware::from_fn(request_logging_middleware)))
        .with_state(state)
}
