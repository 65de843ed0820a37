//! Currency detection and price conversion endpoints.
//!
//! - `GET|POST /api/currency/detect` - Visitor currency from IP geolocation
//! - `POST /api/currency/convert` - Single, batch or pricing-tier conversion
//! - `GET /api/currency/convert?currency=EUR` - Pricing tiers

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::currency::{ConvertedPrice, CurrencyCode, GeoLocation, PricingTiers};
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::handlers::AppState;
use crate::server::license_api::json_body;

/// Standard success envelope for currency endpoints.
#[derive(Debug, Serialize)]
pub struct CurrencyResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> CurrencyResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Body of `POST /api/currency/convert`.
///
/// Exactly one mode is used, checked in this order: `getPricingTiers`,
/// `amounts`, `amount`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvertRequest {
    pub target_currency: Option<String>,
    pub amount: Option<f64>,
    pub amounts: Option<Vec<f64>>,
    pub get_pricing_tiers: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ConversionData {
    Tiers(PricingTiers),
    Batch(Vec<ConvertedPrice>),
    Single(ConvertedPrice),
}

fn target_currency(code: Option<&str>) -> Result<CurrencyCode, ApiError> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .and_then(|c| c.parse::<CurrencyCode>().ok())
        .ok_or_else(|| ApiError::new(ErrorCode::UnsupportedCurrency))
}

/// Detect the caller's currency. Always succeeds, falling back to USD.
pub async fn detect_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<CurrencyResponse<GeoLocation>> {
    CurrencyResponse::ok(state.geo.detect_from_headers(&headers).await)
}

/// Convert USD prices into `targetCurrency`.
pub async fn convert_handler(
    State(state): State<AppState>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Json<CurrencyResponse<ConversionData>>, ApiError> {
    let request = json_body(payload)?;
    let currency = target_currency(request.target_currency.as_deref())?;

    if request.get_pricing_tiers {
        let tiers = state.rates.pricing_tiers(currency).await;
        return Ok(CurrencyResponse::ok(ConversionData::Tiers(tiers)));
    }

    if let Some(amounts) = request.amounts {
        if amounts.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(ApiError::invalid_field(
                "amounts",
                "all amounts must be positive numbers",
            ));
        }
        let prices = state.rates.convert_prices(&amounts, currency).await;
        return Ok(CurrencyResponse::ok(ConversionData::Batch(prices)));
    }

    if let Some(amount) = request.amount {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ApiError::invalid_field(
                "amount",
                "must be a positive number",
            ));
        }
        let price = state.rates.convert_price(amount, currency).await;
        return Ok(CurrencyResponse::ok(ConversionData::Single(price)));
    }

    Err(ApiError::with_message(
        ErrorCode::InvalidRequest,
        "Invalid request. Provide either 'amount', 'amounts', or 'getPricingTiers: true'",
    ))
}

/// Pricing tiers for `?currency=` (USD when omitted).
pub async fn pricing_handler(
    State(state): State<AppState>,
    Query(query): Query<PricingQuery>,
) -> Result<Json<CurrencyResponse<PricingTiers>>, ApiError> {
    let currency = target_currency(Some(query.currency.as_deref().unwrap_or("USD")))?;
    Ok(CurrencyResponse::ok(
        state.rates.pricing_tiers(currency).await,
    ))
}
