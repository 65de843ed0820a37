//! Localized pricing: currency detection, exchange rates and price rounding.
//!
//! - `constants` → supported currencies, country mapping, formatting
//! - `convert`   → USD conversion with per-currency rounding
//! - `detect`    → IP geolocation to currency
//! - `rates`     → cached exchange rates (requires `server` feature)

pub mod constants;
pub mod convert;
pub mod detect;

#[cfg(feature = "server")]
pub mod rates;

pub use constants::{
    currency_for_country, format_currency, is_supported_currency, validate_currency_preference,
    CurrencyCode, CurrencyInfo, RoundingStrategy, CURRENCIES,
};
pub use convert::{
    apply_rounding, calculate_savings, convert_price, convert_prices, format_converted_price,
    pricing_tiers, ConvertedPrice, PricingTiers,
};
pub use detect::{client_ip_from_headers, GeoLocation, GeoLocator};

#[cfg(feature = "server")]
pub use rates::{RateService, RefreshResult};
