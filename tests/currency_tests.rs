//! Exchange-rate cache and geolocation against local mock services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use fitflow::currency::{CurrencyCode, GeoLocation, GeoLocator, RateService, RefreshResult};
use fitflow::server::Database;
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Rates endpoint answering with `status`; returns its URL and a hit counter.
async fn rates_server(status: StatusCode) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let app = Router::new().route(
        "/latest/USD",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let body = json!({
                    "result": "success",
                    "rates": { "USD": 1, "EUR": 0.92, "SAR": 3.75, "INR": 83.2, "XXX": 5 }
                });
                (status, Json(body))
            }
        }),
    );

    let base = spawn(app).await;
    (format!("{base}/latest/USD"), hits)
}

async fn geo_server() -> String {
    async fn by_ip(Path(ip): Path<String>) -> Json<Value> {
        match ip.as_str() {
            "81.2.69.142" => Json(json!({
                "ip": &ip,
                "country_code": "GB",
                "country_name": "United Kingdom"
            })),
            "186.0.0.1" => Json(json!({ "ip": &ip, "country": "AR" })),
            _ => Json(json!({ "error": true, "reason": "RateLimited" })),
        }
    }

    let app = Router::new()
        .route("/:ip/json/", get(by_ip))
        .route(
            "/json/",
            get(|| async {
                Json(json!({ "ip": "2.88.0.1", "country_code": "SA", "country_name": "Saudi Arabia" }))
            }),
        );
    spawn(app).await
}

/// Wait for the background cache write that follows a fetch.
async fn wait_for_cache(db: &Database) {
    for _ in 0..100 {
        if db.latest_rate_update().await.unwrap().is_some() {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("exchange rate cache was never written");
}

#[tokio::test]
async fn test_fetch_keeps_supported_currencies() {
    let db = Database::in_memory().await.unwrap();
    let (url, hits) = rates_server(StatusCode::OK).await;
    let service = RateService::new(db, url, 24);

    let table = service.fetch().await.unwrap();
    assert_eq!(table.len(), 4);
    assert_eq!(table[&CurrencyCode::USD], 1.0);
    assert_eq!(table[&CurrencyCode::SAR], 3.75);
    assert!(!table.contains_key(&CurrencyCode::GBP));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rates_are_served_from_cache_once_written() {
    let db = Database::in_memory().await.unwrap();
    let (url, hits) = rates_server(StatusCode::OK).await;
    let service = RateService::new(Arc::clone(&db), url, 24);

    assert_eq!(service.get_exchange_rate(CurrencyCode::EUR).await, 0.92);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    wait_for_cache(&db).await;

    assert_eq!(service.get_exchange_rate(CurrencyCode::INR).await, 83.2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fresh_cache_skips_upstream() {
    let db = Database::in_memory().await.unwrap();
    let (url, hits) = rates_server(StatusCode::OK).await;
    db.upsert_rates(
        &[("EUR".to_string(), 0.5)],
        Utc::now().naive_utc() - Duration::hours(1),
    )
    .await
    .unwrap();

    let service = RateService::new(Arc::clone(&db), url, 24);
    assert_eq!(service.get_exchange_rate(CurrencyCode::EUR).await, 0.5);
    // Not cached and not USD.
    assert_eq!(service.get_exchange_rate(CurrencyCode::SAR).await, 1.0);
    assert_eq!(service.get_exchange_rate(CurrencyCode::USD).await, 1.0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stale_cache_is_refetched() {
    let db = Database::in_memory().await.unwrap();
    let (url, hits) = rates_server(StatusCode::OK).await;
    db.upsert_rates(
        &[("EUR".to_string(), 0.5)],
        Utc::now().naive_utc() - Duration::hours(25),
    )
    .await
    .unwrap();

    let service = RateService::new(db, url, 24);
    assert_eq!(service.get_exchange_rate(CurrencyCode::EUR).await, 0.92);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upstream_failure_converts_at_one() {
    let db = Database::in_memory().await.unwrap();
    let (url, _hits) = rates_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let service = RateService::new(db, url, 24);

    assert!(service.fetch().await.is_err());
    assert_eq!(service.get_exchange_rate(CurrencyCode::EUR).await, 1.0);

    let price = service.convert_price(29.0, CurrencyCode::EUR).await;
    assert_eq!(price.exchange_rate, 1.0);
    assert_eq!(price.original_usd, 29.0);
}

#[tokio::test]
async fn test_conversion_uses_current_rate() {
    let db = Database::in_memory().await.unwrap();
    let (url, _hits) = rates_server(StatusCode::OK).await;
    let service = RateService::new(db, url, 24);

    let price = service.convert_price(29.0, CurrencyCode::SAR).await;
    assert_eq!(price.currency, CurrencyCode::SAR);
    assert_eq!(price.exchange_rate, 3.75);
    assert_eq!(price.raw_amount, 108.75);

    let prices = service.convert_prices(&[10.0, 20.0], CurrencyCode::SAR).await;
    assert_eq!(prices.len(), 2);
    assert_eq!(prices[1].raw_amount, 75.0);

    let tiers = service.pricing_tiers(CurrencyCode::SAR).await;
    assert_eq!(tiers.trial.price.amount, 0.0);
    assert_eq!(tiers.pro.subscription.original_usd, 59.0);
    assert_eq!(tiers.pro.subscription.exchange_rate, 3.75);
}

#[tokio::test]
async fn test_refresh_reports_rows_written() {
    let db = Database::in_memory().await.unwrap();
    let (url, _hits) = rates_server(StatusCode::OK).await;
    let service = RateService::new(Arc::clone(&db), url, 24);

    assert_eq!(
        service.refresh().await,
        RefreshResult {
            success: true,
            rates_updated: 4
        }
    );
    assert_eq!(db.get_cached_rates().await.unwrap().len(), 4);

    let (url, _hits) = rates_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let failing = RateService::new(db, url, 24);
    assert_eq!(
        failing.refresh().await,
        RefreshResult {
            success: false,
            rates_updated: 0
        }
    );
}

#[tokio::test]
async fn test_geolocation_maps_country_to_currency() {
    let base = geo_server().await;
    let locator = GeoLocator::new(base, "fitflow-test");

    let uk = locator.detect(Some("81.2.69.142")).await;
    assert_eq!(uk.country, "GB");
    assert_eq!(uk.country_name, "United Kingdom");
    assert_eq!(uk.currency, CurrencyCode::GBP);
    assert_eq!(uk.ip, "81.2.69.142");

    let ar = locator.detect(Some("186.0.0.1")).await;
    assert_eq!(ar.country, "AR");
    assert_eq!(ar.currency, CurrencyCode::ARS);

    let own = locator.detect(None).await;
    assert_eq!(own.currency, CurrencyCode::SAR);
}

#[tokio::test]
async fn test_geolocation_errors_fall_back_to_usd() {
    let base = geo_server().await;
    let locator = GeoLocator::new(base, "fitflow-test");

    assert_eq!(
        locator.detect(Some("10.0.0.1")).await,
        GeoLocation::fallback()
    );
    assert_eq!(
        locator.detect(Some("999.1.1.1")).await,
        GeoLocation::fallback()
    );
}
