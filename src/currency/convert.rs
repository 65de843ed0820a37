//! USD to local-currency conversion with per-currency price endings.
//!
//! Conversion here is pure: callers supply the exchange rate (see
//! `currency::rates` on the server for the cached lookup).

use serde::Serialize;

use super::constants::{format_currency, CurrencyCode, RoundingStrategy};

/// Monthly and perpetual list prices in USD, per tier.
pub const BASIC_PRICES_USD: (f64, f64) = (29.0, 299.0);
pub const PRO_PRICES_USD: (f64, f64) = (59.0, 599.0);
pub const ENTERPRISE_PRICES_USD: (f64, f64) = (99.0, 999.0);

pub const TRIAL_DURATION: &str = "30 days";

/// Result of converting one USD price.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedPrice {
    /// Rounded amount in the target currency
    pub amount: f64,
    #[serde(rename = "originalUSD")]
    pub original_usd: f64,
    pub currency: CurrencyCode,
    pub exchange_rate: f64,
    /// Converted amount before rounding
    pub raw_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierPrices {
    pub subscription: ConvertedPrice,
    pub perpetual: ConvertedPrice,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialPrice {
    pub duration: &'static str,
    pub price: ConvertedPrice,
}

/// Every plan's price in one currency, for the pricing page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingTiers {
    pub trial: TrialPrice,
    pub basic: TierPrices,
    pub pro: TierPrices,
    pub enterprise: TierPrices,
}

fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Apply a rounding strategy to a converted amount.
pub fn apply_rounding(amount: f64, strategy: RoundingStrategy) -> f64 {
    match strategy {
        RoundingStrategy::Point99 => amount.floor() + 0.99,
        RoundingStrategy::Point95 => amount.floor() + 0.95,
        RoundingStrategy::Whole99 => {
            if amount < 100.0 {
                amount.floor() + 0.99
            } else if amount < 1000.0 {
                (amount / 100.0).floor() * 100.0 + 99.0
            } else {
                (amount / 1000.0).floor() * 1000.0 + 999.0
            }
        }
        RoundingStrategy::Whole => amount.round(),
        RoundingStrategy::Hundred => (amount / 100.0).round() * 100.0,
    }
}

/// Convert a USD amount at `rate` (units of `currency` per USD).
///
/// USD conversions always use a rate of exactly 1.0.
pub fn convert_price(usd_amount: f64, currency: CurrencyCode, rate: f64) -> ConvertedPrice {
    let rate = if currency == CurrencyCode::USD { 1.0 } else { rate };
    let info = currency.info();
    let raw_amount = usd_amount * rate;

    ConvertedPrice {
        amount: round_to_decimals(apply_rounding(raw_amount, info.rounding), info.decimals),
        original_usd: usd_amount,
        currency,
        exchange_rate: rate,
        raw_amount,
    }
}

/// Convert several USD amounts with one rate.
pub fn convert_prices(usd_amounts: &[f64], currency: CurrencyCode, rate: f64) -> Vec<ConvertedPrice> {
    usd_amounts
        .iter()
        .map(|&amount| convert_price(amount, currency, rate))
        .collect()
}

pub fn pricing_tiers(currency: CurrencyCode, rate: f64) -> PricingTiers {
    let tier = |(monthly, perpetual): (f64, f64)| TierPrices {
        subscription: convert_price(monthly, currency, rate),
        perpetual: convert_price(perpetual, currency, rate),
    };

    PricingTiers {
        trial: TrialPrice {
            duration: TRIAL_DURATION,
            price: ConvertedPrice {
                amount: 0.0,
                original_usd: 0.0,
                currency,
                exchange_rate: 1.0,
                raw_amount: 0.0,
            },
        },
        basic: tier(BASIC_PRICES_USD),
        pro: tier(PRO_PRICES_USD),
        enterprise: tier(ENTERPRISE_PRICES_USD),
    }
}

pub fn format_converted_price(price: &ConvertedPrice) -> String {
    format_currency(price.amount, price.currency)
}

/// Percentage saved by buying perpetual instead of paying monthly for `months`.
pub fn calculate_savings(monthly_price: f64, perpetual_price: f64, months: u32) -> i64 {
    let total = monthly_price * f64::from(months);
    if total <= 0.0 {
        return 0;
    }
    (((total - perpetual_price) / total) * 100.0).round() as i64
}
