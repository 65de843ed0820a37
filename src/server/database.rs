//! SQLite storage for accounts, activated devices and cached exchange rates.
//!
//! Timestamps are stored as naive UTC. `accounts.device_limit` is `NULL` for
//! unlimited plans.

use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{query, query_as, query_scalar, FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::get_config;
use crate::errors::{LicenseError, LicenseResult};
use crate::plans::{DeviceLimit, PlanTier, SubscriptionStatus, SubscriptionType};

/// An account owning one license key.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub email_verified: bool,
    pub license_key: String,
    pub subscription_status: String,
    pub subscription_type: Option<String>,
    pub plan_tier: Option<String>,
    pub device_limit: Option<i64>,
    pub trial_start_at: NaiveDateTime,
    pub trial_end_at: NaiveDateTime,
    pub perpetual_purchased_at: Option<NaiveDateTime>,
    pub perpetual_updates_until: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Parsed subscription status.
    ///
    /// An unrecognized stored value is treated as a storage error.
    pub fn status(&self) -> LicenseResult<SubscriptionStatus> {
        self.subscription_status.parse().map_err(|_| {
            LicenseError::ServerError(format!(
                "account {} has unknown subscription status '{}'",
                self.id, self.subscription_status
            ))
        })
    }

    pub fn subscription_type(&self) -> Option<SubscriptionType> {
        self.subscription_type.as_deref().and_then(|t| t.parse().ok())
    }

    pub fn plan_tier(&self) -> Option<PlanTier> {
        self.plan_tier.as_deref().and_then(|t| t.parse().ok())
    }

    pub fn device_limit(&self) -> DeviceLimit {
        DeviceLimit::from_column(self.device_limit)
    }
}

/// One installation of the desktop app bound to an account.
#[derive(Debug, Clone, FromRow)]
pub struct ActivatedDevice {
    pub id: String,
    pub account_id: String,
    pub device_id: String,
    pub device_name: Option<String>,
    pub platform: String,
    pub app_version: String,
    pub is_active: bool,
    pub activated_at: NaiveDateTime,
    pub last_validated_at: NaiveDateTime,
    pub trial_started_at: Option<NaiveDateTime>,
    pub trial_ends_at: Option<NaiveDateTime>,
    pub trial_used: bool,
}

impl ActivatedDevice {
    pub fn is_trial_active(&self, now: NaiveDateTime) -> bool {
        self.trial_ends_at.is_some_and(|end| now < end)
    }

    pub fn is_trial_expired(&self, now: NaiveDateTime) -> bool {
        self.trial_ends_at.is_some_and(|end| now >= end)
    }
}

/// A cached USD exchange rate.
#[derive(Debug, Clone, FromRow)]
pub struct CachedRate {
    pub currency: String,
    pub rate_to_usd: f64,
    pub last_updated: NaiveDateTime,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id                      TEXT PRIMARY KEY,
        email                   TEXT NOT NULL UNIQUE,
        name                    TEXT,
        email_verified          INTEGER NOT NULL DEFAULT 0,
        license_key             TEXT NOT NULL UNIQUE,
        subscription_status     TEXT NOT NULL,
        subscription_type       TEXT,
        plan_tier               TEXT,
        device_limit            INTEGER,
        trial_start_at          TEXT NOT NULL,
        trial_end_at            TEXT NOT NULL,
        perpetual_purchased_at  TEXT,
        perpetual_updates_until TEXT,
        created_at              TEXT NOT NULL,
        updated_at              TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activated_devices (
        id                TEXT PRIMARY KEY,
        account_id        TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        device_id         TEXT NOT NULL,
        device_name       TEXT,
        platform          TEXT NOT NULL,
        app_version       TEXT NOT NULL,
        is_active         INTEGER NOT NULL DEFAULT 1,
        activated_at      TEXT NOT NULL,
        last_validated_at TEXT NOT NULL,
        trial_started_at  TEXT,
        trial_ends_at     TEXT,
        trial_used        INTEGER NOT NULL DEFAULT 0,
        UNIQUE(account_id, device_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_activated_devices_account
        ON activated_devices(account_id, is_active)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS currency_rates (
        currency     TEXT PRIMARY KEY,
        rate_to_usd  REAL NOT NULL,
        last_updated TEXT NOT NULL
    )
    "#,
];

fn db_err(op: &'static str) -> impl Fn(sqlx::Error) -> LicenseError {
    move |e| {
        error!("SQLite {op} failed: {e}");
        LicenseError::ServerError(format!("database error: {e}"))
    }
}

/// Database handle.
#[derive(Debug, Clone)]
pub enum Database {
    SQLite(SqlitePool),
}

impl Database {
    /// Connect using `database.url` from the global configuration.
    pub async fn new() -> LicenseResult<Arc<Self>> {
        let config = get_config()?;
        Self::connect(&config.database.url).await
    }

    pub async fn connect(url: &str) -> LicenseResult<Arc<Self>> {
        let pool = SqlitePoolOptions::new().connect(url).await.map_err(|e| {
            error!("Failed to connect to SQLite: {e}");
            LicenseError::ServerError(format!("failed to connect to SQLite: {e}"))
        })?;

        Ok(Arc::new(Database::SQLite(pool)))
    }

    /// A private in-memory database with the schema applied.
    ///
    /// Limited to one connection, since every SQLite memory connection is
    /// its own database.
    pub async fn in_memory() -> LicenseResult<Arc<Self>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err("connect"))?;

        let db = Arc::new(Database::SQLite(pool));
        db.migrate().await?;
        Ok(db)
    }

    fn pool(&self) -> &SqlitePool {
        match self {
            Database::SQLite(pool) => pool,
        }
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> LicenseResult<()> {
        for statement in SCHEMA {
            query(statement)
                .execute(self.pool())
                .await
                .map_err(db_err("migrate"))?;
        }
        info!("Database schema is up to date");
        Ok(())
    }

    /// Connectivity check for health responses.
    pub async fn ping(&self) -> bool {
        query("SELECT 1").execute(self.pool()).await.is_ok()
    }

    // === Accounts ===

    pub async fn insert_account(&self, account: &Account) -> LicenseResult<()> {
        query(
            r#"
            INSERT INTO accounts (
                id, email, name, email_verified, license_key,
                subscription_status, subscription_type, plan_tier, device_limit,
                trial_start_at, trial_end_at,
                perpetual_purchased_at, perpetual_updates_until,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.email)
        .bind(&account.name)
        .bind(account.email_verified)
        .bind(&account.license_key)
        .bind(&account.subscription_status)
        .bind(&account.subscription_type)
        .bind(&account.plan_tier)
        .bind(account.device_limit)
        .bind(account.trial_start_at)
        .bind(account.trial_end_at)
        .bind(account.perpetual_purchased_at)
        .bind(account.perpetual_updates_until)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                LicenseError::InvalidRequest("an account with this email already exists".into())
            } else {
                db_err("insert_account")(e)
            }
        })?;

        Ok(())
    }

    pub async fn license_key_exists(&self, license_key: &str) -> LicenseResult<bool> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM accounts WHERE license_key = ?")
            .bind(license_key)
            .fetch_one(self.pool())
            .await
            .map_err(db_err("license_key_exists"))?;
        Ok(count > 0)
    }

    pub async fn get_account_by_license_key(
        &self,
        license_key: &str,
    ) -> LicenseResult<Option<Account>> {
        query_as::<_, Account>("SELECT * FROM accounts WHERE license_key = ?")
            .bind(license_key)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err("get_account_by_license_key"))
    }

    pub async fn get_account_by_email(&self, email: &str) -> LicenseResult<Option<Account>> {
        query_as::<_, Account>("SELECT * FROM accounts WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err("get_account_by_email"))
    }

    /// Mark an account's email as verified. Returns `false` if no account matched.
    pub async fn verify_email(&self, email: &str, now: NaiveDateTime) -> LicenseResult<bool> {
        let result = query(
            "UPDATE accounts SET email_verified = 1, updated_at = ? WHERE email = ? COLLATE NOCASE",
        )
        .bind(now)
        .bind(email)
        .execute(self.pool())
        .await
        .map_err(db_err("verify_email"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a completed purchase: status `active`, plan tier and its device limit.
    ///
    /// Perpetual purchases also set the purchase time and update window.
    pub async fn apply_purchase(
        &self,
        account_id: &str,
        tier: PlanTier,
        subscription_type: SubscriptionType,
        perpetual: Option<(NaiveDateTime, NaiveDateTime)>,
        now: NaiveDateTime,
    ) -> LicenseResult<bool> {
        let (purchased_at, updates_until) = match perpetual {
            Some((p, u)) => (Some(p), Some(u)),
            None => (None, None),
        };

        let result = query(
            r#"
            UPDATE accounts SET
                subscription_status     = ?,
                subscription_type       = ?,
                plan_tier               = ?,
                device_limit            = ?,
                perpetual_purchased_at  = COALESCE(?, perpetual_purchased_at),
                perpetual_updates_until = COALESCE(?, perpetual_updates_until),
                updated_at              = ?
            WHERE id = ?
            "#,
        )
        .bind(SubscriptionStatus::Active.as_str())
        .bind(subscription_type.as_str())
        .bind(tier.as_str())
        .bind(tier.device_limit().to_column())
        .bind(purchased_at)
        .bind(updates_until)
        .bind(now)
        .bind(account_id)
        .execute(self.pool())
        .await
        .map_err(db_err("apply_purchase"))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_subscription_status(
        &self,
        account_id: &str,
        status: SubscriptionStatus,
        now: NaiveDateTime,
    ) -> LicenseResult<bool> {
        let result =
            query("UPDATE accounts SET subscription_status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(now)
                .bind(account_id)
                .execute(self.pool())
                .await
                .map_err(db_err("set_subscription_status"))?;

        Ok(result.rows_affected() > 0)
    }

    // === Devices ===

    pub async fn get_device(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> LicenseResult<Option<ActivatedDevice>> {
        query_as::<_, ActivatedDevice>(
            "SELECT * FROM activated_devices WHERE account_id = ? AND device_id = ?",
        )
        .bind(account_id)
        .bind(device_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err("get_device"))
    }

    /// All devices of an account, most recently activated first.
    pub async fn list_devices(&self, account_id: &str) -> LicenseResult<Vec<ActivatedDevice>> {
        query_as::<_, ActivatedDevice>(
            "SELECT * FROM activated_devices WHERE account_id = ? ORDER BY activated_at DESC",
        )
        .bind(account_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err("list_devices"))
    }

    pub async fn count_active_devices(&self, account_id: &str) -> LicenseResult<u32> {
        let count: i64 = query_scalar(
            "SELECT COUNT(*) FROM activated_devices WHERE account_id = ? AND is_active = 1",
        )
        .bind(account_id)
        .fetch_one(self.pool())
        .await
        .map_err(db_err("count_active_devices"))?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Insert a new device row.
    ///
    /// Returns `false` when a row for `(account_id, device_id)` already exists,
    /// e.g. a concurrent activation of the same device won the insert.
    pub async fn insert_device(&self, device: &ActivatedDevice) -> LicenseResult<bool> {
        let result = query(
            r#"
            INSERT INTO activated_devices (
                id, account_id, device_id, device_name, platform, app_version,
                is_active, activated_at, last_validated_at,
                trial_started_at, trial_ends_at, trial_used
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, device_id) DO NOTHING
            "#,
        )
        .bind(&device.id)
        .bind(&device.account_id)
        .bind(&device.device_id)
        .bind(&device.device_name)
        .bind(&device.platform)
        .bind(&device.app_version)
        .bind(device.is_active)
        .bind(device.activated_at)
        .bind(device.last_validated_at)
        .bind(device.trial_started_at)
        .bind(device.trial_ends_at)
        .bind(device.trial_used)
        .execute(self.pool())
        .await
        .map_err(db_err("insert_device"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Flip an inactive device back to active and refresh its metadata.
    ///
    /// The trial window is left untouched.
    pub async fn reactivate_device(
        &self,
        id: &str,
        device_name: Option<&str>,
        platform: &str,
        app_version: &str,
        now: NaiveDateTime,
    ) -> LicenseResult<Option<ActivatedDevice>> {
        query_as::<_, ActivatedDevice>(
            r#"
            UPDATE activated_devices SET
                is_active         = 1,
                last_validated_at = ?,
                device_name       = COALESCE(?, device_name),
                platform          = ?,
                app_version       = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(device_name)
        .bind(platform)
        .bind(app_version)
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err("reactivate_device"))
    }

    pub async fn touch_device(&self, id: &str, now: NaiveDateTime) -> LicenseResult<()> {
        query("UPDATE activated_devices SET last_validated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_err("touch_device"))?;
        Ok(())
    }

    /// Deactivate an active device. Returns `false` if it was not active.
    pub async fn deactivate_device(&self, account_id: &str, device_id: &str) -> LicenseResult<bool> {
        let result = query(
            r#"
            UPDATE activated_devices SET is_active = 0
            WHERE account_id = ? AND device_id = ? AND is_active = 1
            "#,
        )
        .bind(account_id)
        .bind(device_id)
        .execute(self.pool())
        .await
        .map_err(db_err("deactivate_device"))?;

        Ok(result.rows_affected() > 0)
    }

    // === Currency rate cache ===

    pub async fn get_cached_rates(&self) -> LicenseResult<Vec<CachedRate>> {
        query_as::<_, CachedRate>("SELECT * FROM currency_rates")
            .fetch_all(self.pool())
            .await
            .map_err(db_err("get_cached_rates"))
    }

    pub async fn latest_rate_update(&self) -> LicenseResult<Option<NaiveDateTime>> {
        query_scalar("SELECT MAX(last_updated) FROM currency_rates")
            .fetch_one(self.pool())
            .await
            .map_err(db_err("latest_rate_update"))
    }

    /// Upsert rates in one transaction. Returns the number of rows written.
    pub async fn upsert_rates(
        &self,
        rates: &[(String, f64)],
        now: NaiveDateTime,
    ) -> LicenseResult<usize> {
        let mut tx = self.pool().begin().await.map_err(db_err("upsert_rates"))?;

        for (currency, rate) in rates {
            query(
                r#"
                INSERT INTO currency_rates (currency, rate_to_usd, last_updated)
                VALUES (?, ?, ?)
                ON CONFLICT(currency) DO UPDATE SET
                    rate_to_usd  = excluded.rate_to_usd,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(currency)
            .bind(rate)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err("upsert_rates"))?;
        }

        tx.commit().await.map_err(db_err("upsert_rates"))?;
        Ok(rates.len())
    }
}
