//! Visitor currency detection from IP geolocation.
//!
//! Detection never fails: any upstream problem (unreachable service, rate
//! limit response, malformed IP) yields the US/USD fallback.

use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{debug, warn};

use super::constants::{currency_for_country, CurrencyCode};
use crate::config::CurrencyConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Detected location and the currency shown for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    pub country_name: String,
    pub currency: CurrencyCode,
    pub ip: String,
}

impl GeoLocation {
    pub fn fallback() -> Self {
        Self {
            country: "US".to_string(),
            country_name: "United States".to_string(),
            currency: CurrencyCode::USD,
            ip: "unknown".to_string(),
        }
    }
}

/// Response shape of the geolocation service (ipapi.co compatible).
#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    country_code: Option<String>,
    country: Option<String>,
    country_name: Option<String>,
    ip: Option<String>,
}

/// Client for the IP geolocation service.
#[derive(Debug, Clone)]
pub struct GeoLocator {
    client: Client,
    base_url: String,
    user_agent: String,
}

impl GeoLocator {
    pub fn new(base_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
        }
    }

    pub fn from_config(config: &CurrencyConfig) -> Self {
        Self::new(config.geo_url.clone(), config.user_agent.clone())
    }

    /// Look up `ip` (or the caller's own address when `None`) and map its
    /// country to a currency.
    pub async fn detect(&self, ip: Option<&str>) -> GeoLocation {
        let ip = ip.map(str::trim).filter(|ip| !ip.is_empty());

        if let Some(ip) = ip {
            if ip.parse::<IpAddr>().is_err() {
                debug!("Skipping geolocation for malformed IP '{}'", ip);
                return GeoLocation::fallback();
            }
        }

        match self.lookup(ip).await {
            Ok(location) => location,
            Err(e) => {
                warn!("Currency detection failed, using USD: {}", e);
                GeoLocation::fallback()
            }
        }
    }

    async fn lookup(&self, ip: Option<&str>) -> LicenseResult<GeoLocation> {
        let url = match ip {
            Some(ip) => format!("{}/{}/json/", self.base_url, ip),
            None => format!("{}/json/", self.base_url),
        };

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LicenseError::ServerError(format!(
                "geolocation service returned HTTP status {}",
                resp.status()
            )));
        }

        let body: GeoResponse = resp.json().await?;
        if body.error {
            return Err(LicenseError::ServerError(format!(
                "geolocation service error: {}",
                body.reason.as_deref().unwrap_or("unknown")
            )));
        }

        let country = body
            .country_code
            .or(body.country)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "US".to_string());

        Ok(GeoLocation {
            currency: currency_for_country(&country),
            country,
            country_name: body
                .country_name
                .unwrap_or_else(|| "United States".to_string()),
            ip: body.ip.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Detect using the client address found in proxy headers.
    pub async fn detect_from_headers(&self, headers: &HeaderMap) -> GeoLocation {
        let ip = client_ip_from_headers(headers);
        self.detect(ip.as_deref()).await
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client IP from `cf-connecting-ip`, then `x-real-ip`, then the first
/// entry of `x-forwarded-for`.
pub fn client_ip_from_headers(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "cf-connecting-ip")
        .or_else(|| header_str(headers, "x-real-ip"))
        .or_else(|| {
            header_str(headers, "x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
}
