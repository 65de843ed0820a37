//! Exchange rates with a persisted cache.
//!
//! Rates are USD based (units of currency per 1 USD). The cache is fresh while
//! its newest row is younger than `currency.cache_ttl_hours`. A stale or empty
//! cache triggers a fetch; the fetched rates are written back in the
//! background. When the upstream fetch fails only `USD = 1.0` is returned, so
//! every other currency converts at 1.0.

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::constants::CurrencyCode;
use super::convert::{self, ConvertedPrice, PricingTiers};
use crate::config::CurrencyConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::server::database::Database;

pub type RateTable = BTreeMap<CurrencyCode, f64>;

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

/// Outcome of a manual refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub success: bool,
    pub rates_updated: usize,
}

fn usd_only() -> RateTable {
    RateTable::from([(CurrencyCode::USD, 1.0)])
}

/// Cached exchange-rate lookup backed by the `currency_rates` table.
#[derive(Debug, Clone)]
pub struct RateService {
    db: Arc<Database>,
    client: Client,
    rates_url: String,
    ttl: Duration,
}

impl RateService {
    pub fn new(db: Arc<Database>, rates_url: impl Into<String>, ttl_hours: i64) -> Self {
        Self {
            db,
            client: Client::new(),
            rates_url: rates_url.into(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn from_config(db: Arc<Database>, config: &CurrencyConfig) -> Self {
        Self::new(db, config.rates_url.clone(), config.cache_ttl_hours)
    }

    /// Fetch current rates from upstream, keeping supported currencies only.
    pub async fn fetch(&self) -> LicenseResult<RateTable> {
        let resp = self.client.get(&self.rates_url).send().await?;

        if !resp.status().is_success() {
            return Err(LicenseError::ServerError(format!(
                "exchange rate service returned HTTP status {}",
                resp.status()
            )));
        }

        let body: RatesResponse = resp.json().await?;

        let mut table = usd_only();
        for currency in CurrencyCode::all().filter(|c| *c != CurrencyCode::USD) {
            match body.rates.get(currency.as_str()) {
                Some(rate) if *rate > 0.0 => {
                    table.insert(currency, *rate);
                }
                _ => debug!("Exchange rate service has no rate for {}", currency),
            }
        }

        Ok(table)
    }

    async fn fetch_or_fallback(&self) -> RateTable {
        match self.fetch().await {
            Ok(table) => table,
            Err(e) => {
                warn!("Failed to fetch exchange rates, using USD only: {}", e);
                usd_only()
            }
        }
    }

    async fn cached_if_fresh(&self) -> LicenseResult<Option<RateTable>> {
        let Some(latest) = self.db.latest_rate_update().await? else {
            return Ok(None);
        };

        if Utc::now().naive_utc() - latest >= self.ttl {
            return Ok(None);
        }

        let table: RateTable = self
            .db
            .get_cached_rates()
            .await?
            .into_iter()
            .filter_map(|row| {
                row.currency
                    .parse::<CurrencyCode>()
                    .ok()
                    .map(|code| (code, row.rate_to_usd))
            })
            .collect();

        Ok((!table.is_empty()).then_some(table))
    }

    /// Current rates, from cache when fresh.
    pub async fn get_exchange_rates(&self) -> RateTable {
        match self.cached_if_fresh().await {
            Ok(Some(table)) => {
                debug!("Using cached exchange rates");
                return table;
            }
            Ok(None) => {}
            Err(e) => warn!("Exchange rate cache unavailable: {}", e),
        }

        info!("Fetching fresh exchange rates");
        let fresh = self.fetch_or_fallback().await;

        let db = Arc::clone(&self.db);
        let rows = to_rows(&fresh);
        tokio::spawn(async move {
            if let Err(e) = db.upsert_rates(&rows, Utc::now().naive_utc()).await {
                error!("Background exchange rate cache update failed: {}", e);
            }
        });

        fresh
    }

    /// Units of `currency` per USD; 1.0 for USD or when no rate is known.
    pub async fn get_exchange_rate(&self, currency: CurrencyCode) -> f64 {
        if currency == CurrencyCode::USD {
            return 1.0;
        }
        self.get_exchange_rates()
            .await
            .get(&currency)
            .copied()
            .unwrap_or(1.0)
    }

    /// Fetch and store rates now, regardless of cache age.
    pub async fn refresh(&self) -> RefreshResult {
        let table = match self.fetch().await {
            Ok(table) => table,
            Err(e) => {
                error!("Failed to refresh exchange rates: {}", e);
                return RefreshResult {
                    success: false,
                    rates_updated: 0,
                };
            }
        };

        match self
            .db
            .upsert_rates(&to_rows(&table), Utc::now().naive_utc())
            .await
        {
            Ok(count) => {
                info!("Updated {} currency rates in cache", count);
                RefreshResult {
                    success: true,
                    rates_updated: count,
                }
            }
            Err(e) => {
                error!("Failed to store refreshed exchange rates: {}", e);
                RefreshResult {
                    success: false,
                    rates_updated: 0,
                }
            }
        }
    }

    pub async fn convert_price(&self, usd_amount: f64, currency: CurrencyCode) -> ConvertedPrice {
        let rate = self.get_exchange_rate(currency).await;
        convert::convert_price(usd_amount, currency, rate)
    }

    pub async fn convert_prices(
        &self,
        usd_amounts: &[f64],
        currency: CurrencyCode,
    ) -> Vec<ConvertedPrice> {
        let rate = self.get_exchange_rate(currency).await;
        convert::convert_prices(usd_amounts, currency, rate)
    }

    pub async fn pricing_tiers(&self, currency: CurrencyCode) -> PricingTiers {
        let rate = self.get_exchange_rate(currency).await;
        convert::pricing_tiers(currency, rate)
    }
}

fn to_rows(table: &RateTable) -> Vec<(String, f64)> {
    table
        .iter()
        .map(|(code, rate)| (code.as_str().to_string(), *rate))
        .collect()
}
