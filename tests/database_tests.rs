//! Storage-level behavior of the SQLite database.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use fitflow::errors::LicenseError;
use fitflow::plans::{DeviceLimit, PlanTier, SubscriptionStatus, SubscriptionType};
use fitflow::server::database::{Account, ActivatedDevice, Database};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn account(id: &str, email: &str, license_key: &str) -> Account {
    Account {
        id: id.to_string(),
        email: email.to_string(),
        name: None,
        email_verified: false,
        license_key: license_key.to_string(),
        subscription_status: "trial".to_string(),
        subscription_type: None,
        plan_tier: None,
        device_limit: Some(1),
        trial_start_at: t0(),
        trial_end_at: t0() + Duration::days(30),
        perpetual_purchased_at: None,
        perpetual_updates_until: None,
        created_at: t0(),
        updated_at: t0(),
    }
}

fn device(id: &str, account_id: &str, device_id: &str) -> ActivatedDevice {
    ActivatedDevice {
        id: id.to_string(),
        account_id: account_id.to_string(),
        device_id: device_id.to_string(),
        device_name: Some("Front desk".to_string()),
        platform: "windows".to_string(),
        app_version: "2.0.0".to_string(),
        is_active: true,
        activated_at: t0(),
        last_validated_at: t0(),
        trial_started_at: Some(t0()),
        trial_ends_at: Some(t0() + Duration::days(30)),
        trial_used: true,
    }
}

#[tokio::test]
async fn test_in_memory_database_is_reachable() {
    let db = Database::in_memory().await.unwrap();
    assert!(db.ping().await);
    // Migrations are idempotent.
    db.migrate().await.unwrap();
}

#[tokio::test]
async fn test_account_lookup_by_key_and_email() {
    let db = Database::in_memory().await.unwrap();
    db.insert_account(&account("acc-1", "Owner@Gym.example", "FFAB-CDEF-GHJK-LMNP-25B5"))
        .await
        .unwrap();

    assert!(db.license_key_exists("FFAB-CDEF-GHJK-LMNP-25B5").await.unwrap());
    assert!(!db.license_key_exists("FFZZ-CDEF-GHJK-LMNP-25B5").await.unwrap());

    let by_key = db
        .get_account_by_license_key("FFAB-CDEF-GHJK-LMNP-25B5")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_key.id, "acc-1");
    assert_eq!(by_key.trial_end_at, t0() + Duration::days(30));
    assert_eq!(by_key.device_limit(), DeviceLimit::Limited(1));

    let by_email = db.get_account_by_email("owner@gym.example").await.unwrap();
    assert_eq!(by_email.map(|a| a.id).as_deref(), Some("acc-1"));
    assert!(db.get_account_by_email("other@gym.example").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_account_is_invalid_request() {
    let db = Database::in_memory().await.unwrap();
    db.insert_account(&account("acc-1", "owner@gym.example", "FFAB-CDEF-GHJK-LMNP-25B5"))
        .await
        .unwrap();

    let err = db
        .insert_account(&account("acc-2", "owner@gym.example", "FFQR-CDEF-GHJK-LMNP-0000"))
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_verify_email_and_purchase() {
    let db = Database::in_memory().await.unwrap();
    db.insert_account(&account("acc-1", "owner@gym.example", "FFAB-CDEF-GHJK-LMNP-25B5"))
        .await
        .unwrap();

    assert!(db.verify_email("OWNER@gym.example", t0()).await.unwrap());
    assert!(!db.verify_email("nobody@gym.example", t0()).await.unwrap());

    let purchased = t0() + Duration::days(3);
    let until = purchased + Duration::days(365);
    assert!(db
        .apply_purchase(
            "acc-1",
            PlanTier::Enterprise,
            SubscriptionType::Perpetual,
            Some((purchased, until)),
            purchased,
        )
        .await
        .unwrap());

    let stored = db.get_account_by_email("owner@gym.example").await.unwrap().unwrap();
    assert!(stored.email_verified);
    assert_eq!(stored.status().unwrap(), SubscriptionStatus::Active);
    assert_eq!(stored.plan_tier(), Some(PlanTier::Enterprise));
    assert_eq!(stored.subscription_type(), Some(SubscriptionType::Perpetual));
    assert_eq!(stored.device_limit, None);
    assert_eq!(stored.device_limit(), DeviceLimit::Unlimited);
    assert_eq!(stored.perpetual_purchased_at, Some(purchased));
    assert_eq!(stored.perpetual_updates_until, Some(until));

    assert!(db
        .set_subscription_status("acc-1", SubscriptionStatus::PastDue, purchased)
        .await
        .unwrap());
    let stored = db.get_account_by_email("owner@gym.example").await.unwrap().unwrap();
    assert_eq!(stored.subscription_status, "past_due");
}

#[tokio::test]
async fn test_device_insert_conflict_keeps_first_row() {
    let db = Database::in_memory().await.unwrap();
    db.insert_account(&account("acc-1", "owner@gym.example", "FFAB-CDEF-GHJK-LMNP-25B5"))
        .await
        .unwrap();

    assert!(db.insert_device(&device("row-1", "acc-1", "device-a")).await.unwrap());
    assert!(!db.insert_device(&device("row-2", "acc-1", "device-a")).await.unwrap());

    let stored = db.get_device("acc-1", "device-a").await.unwrap().unwrap();
    assert_eq!(stored.id, "row-1");
    assert_eq!(db.count_active_devices("acc-1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_deactivate_and_reactivate_device() {
    let db = Database::in_memory().await.unwrap();
    db.insert_account(&account("acc-1", "owner@gym.example", "FFAB-CDEF-GHJK-LMNP-25B5"))
        .await
        .unwrap();
    db.insert_device(&device("row-1", "acc-1", "device-a")).await.unwrap();

    assert!(db.deactivate_device("acc-1", "device-a").await.unwrap());
    assert!(!db.deactivate_device("acc-1", "device-a").await.unwrap());
    assert_eq!(db.count_active_devices("acc-1").await.unwrap(), 0);

    let later = t0() + Duration::days(40);
    let device = db
        .reactivate_device("row-1", None, "mac", "2.2.0", later)
        .await
        .unwrap()
        .unwrap();

    assert!(device.is_active);
    assert_eq!(device.device_name.as_deref(), Some("Front desk"));
    assert_eq!(device.platform, "mac");
    assert_eq!(device.app_version, "2.2.0");
    assert_eq!(device.last_validated_at, later);
    assert_eq!(device.activated_at, t0());
    assert_eq!(device.trial_ends_at, Some(t0() + Duration::days(30)));
    assert!(device.is_trial_expired(later));
    assert!(!device.is_trial_active(later));

    assert!(db
        .reactivate_device("missing", None, "mac", "2.2.0", later)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_list_devices_newest_first() {
    let db = Database::in_memory().await.unwrap();
    db.insert_account(&account("acc-1", "owner@gym.example", "FFAB-CDEF-GHJK-LMNP-25B5"))
        .await
        .unwrap();

    let mut older = device("row-1", "acc-1", "device-a");
    older.activated_at = t0() - Duration::days(1);
    db.insert_device(&older).await.unwrap();
    db.insert_device(&device("row-2", "acc-1", "device-b")).await.unwrap();

    let ids: Vec<String> = db
        .list_devices("acc-1")
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.device_id)
        .collect();
    assert_eq!(ids, ["device-b", "device-a"]);

    db.touch_device("row-1", t0() + Duration::hours(1)).await.unwrap();
    let touched = db.get_device("acc-1", "device-a").await.unwrap().unwrap();
    assert_eq!(touched.last_validated_at, t0() + Duration::hours(1));
}

#[tokio::test]
async fn test_rate_cache_upsert() {
    let db = Database::in_memory().await.unwrap();
    assert!(db.latest_rate_update().await.unwrap().is_none());
    assert!(db.get_cached_rates().await.unwrap().is_empty());

    let rates = vec![("EUR".to_string(), 0.92), ("SAR".to_string(), 3.75)];
    assert_eq!(db.upsert_rates(&rates, t0()).await.unwrap(), 2);

    let later = t0() + Duration::hours(2);
    let rates = vec![("EUR".to_string(), 0.95)];
    db.upsert_rates(&rates, later).await.unwrap();

    let mut cached = db.get_cached_rates().await.unwrap();
    cached.sort_by(|a, b| a.currency.cmp(&b.currency));
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0].currency, "EUR");
    assert_eq!(cached[0].rate_to_usd, 0.95);
    assert_eq!(cached[0].last_updated, later);
    assert_eq!(cached[1].rate_to_usd, 3.75);

    assert_eq!(db.latest_rate_update().await.unwrap(), Some(later));
}
