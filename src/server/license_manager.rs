//! Device activation, deactivation and validation against stored accounts.
//!
//! Every operation takes the current time as `now` (naive UTC) so the trial
//! arithmetic can be exercised deterministically.
//!
//! # Activation order
//!
//! 1. Request fields are checked, then the key's format and checksum.
//! 2. The account must exist, have a verified email, not be `expired` or
//!    `cancelled`, and not be a lapsed `trial`.
//! 3. A known active device is touched and answered as already active.
//! 4. Anything that would add an active device (new or reactivated) is
//!    refused once the plan's device limit is filled. Nothing is evicted.
//! 5. A new device gets its own trial of `license.trial_days` days. A
//!    reactivated device keeps the trial it had.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::FitflowConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::license_key::{
    generate_unique_license_key, is_well_formed, LicenseKeyConfig, MAX_GENERATION_ATTEMPTS,
};
use crate::plans::{
    days_remaining, has_active_subscription, has_update_access, perpetual_updates_until,
    PlanTier, SubscriptionStatus, SubscriptionType, TRIAL_DEVICE_LIMIT,
};
use crate::server::database::{Account, ActivatedDevice, Database};
use crate::server::logging::{log_license_event, LicenseEvent};
use crate::server::validation::{
    normalize_optional, validate_email, validate_required, Platform, ValidationError,
};
use crate::signing::{iso_timestamp, LicensePayload, LicenseSigner};

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /api/license/activate`.
///
/// Fields are optional at the serde level so that a missing field is
/// reported like any other invalid value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivateRequest {
    pub license_key: Option<String>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub platform: Option<String>,
    pub app_version: Option<String>,
}

/// Body of `POST /api/license/validate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidateRequest {
    pub license_key: Option<String>,
    pub device_id: Option<String>,
}

/// Body of `POST /api/license/deactivate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeactivateRequest {
    pub device_id: Option<String>,
    /// Desktop flow; without it the dashboard session is used
    pub license_key: Option<String>,
}

fn required(value: &Option<String>, field: &str) -> Result<String, ValidationError> {
    let value = value.as_deref().unwrap_or_default().trim();
    validate_required(value, field)?;
    Ok(value.to_string())
}

/// An activation request whose fields passed validation.
#[derive(Debug, Clone)]
pub struct DeviceActivation {
    pub license_key: String,
    pub device_id: String,
    pub device_name: Option<String>,
    pub platform: Platform,
    pub app_version: String,
}

impl ActivateRequest {
    pub fn validate(&self) -> Result<DeviceActivation, ValidationError> {
        Ok(DeviceActivation {
            license_key: required(&self.license_key, "licenseKey")?,
            device_id: required(&self.device_id, "deviceId")?,
            device_name: normalize_optional(self.device_name.as_deref(), "deviceName")?,
            platform: required(&self.platform, "platform")?.parse()?,
            app_version: required(&self.app_version, "appVersion")?,
        })
    }
}

/// How a deactivation request authenticated.
#[derive(Debug, Clone, Copy)]
pub enum DeactivationAuth<'a> {
    /// License key from the desktop app
    LicenseKey(&'a str),
    /// Email of a dashboard session
    Session(&'a str),
}

// ============================================================================
// Results
// ============================================================================

/// Which activation path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    Activated,
    Reactivated,
    AlreadyActive,
}

impl ActivationKind {
    pub fn message(&self, trial_days: i64) -> String {
        match self {
            ActivationKind::Activated => {
                format!("Device activated successfully! {trial_days}-day trial started.")
            }
            ActivationKind::Reactivated => "Device reactivated successfully".to_string(),
            ActivationKind::AlreadyActive => "Device already activated".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationData {
    pub device_id: String,
    pub device_name: Option<String>,
    pub activated_at: String,
    pub devices_used: u32,
    /// `null` for unlimited plans
    pub device_limit: Option<u32>,
    pub trial_ends_at: Option<String>,
    pub trial_used: bool,
    pub subscription_status: String,
    pub is_trial_active: bool,
    /// Envelope for offline validation
    pub signed_license: String,
}

#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    pub kind: ActivationKind,
    pub message: String,
    pub data: ActivationData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivationData {
    pub device_id: String,
    pub device_name: Option<String>,
    pub devices_used: u32,
    pub device_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationData {
    pub device_id: String,
    pub device_name: Option<String>,
    pub activated_at: String,
    pub last_validated_at: String,
    pub subscription_status: String,
    pub is_trial_active: bool,
    pub is_trial_expired: bool,
    pub trial_ends_at: Option<String>,
    pub trial_days_remaining: i64,
    pub has_active_subscription: bool,
    pub requires_payment: bool,
    /// Perpetual licenses only: whether the update window is still open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates_available: Option<bool>,
    pub dashboard_url: String,
    pub signed_license: String,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub data: ValidationData,
}

impl ValidationOutcome {
    pub fn message(&self) -> &'static str {
        if self.valid {
            "License is valid"
        } else {
            "License expired or subscription required"
        }
    }
}

/// One device as shown on the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub device_id: String,
    pub device_name: Option<String>,
    pub platform: String,
    pub app_version: String,
    pub activated_at: String,
    pub last_validated_at: String,
    pub is_active: bool,
    pub trial_started_at: Option<String>,
    pub trial_ends_at: Option<String>,
    pub trial_used: bool,
    pub is_trial_active: bool,
    pub is_trial_expired: bool,
    pub trial_days_remaining: i64,
}

impl DeviceInfo {
    fn from_device(device: &ActivatedDevice, now: NaiveDateTime) -> Self {
        let is_trial_active = device.is_trial_active(now);
        Self {
            id: device.id.clone(),
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            platform: device.platform.clone(),
            app_version: device.app_version.clone(),
            activated_at: iso_timestamp(device.activated_at),
            last_validated_at: iso_timestamp(device.last_validated_at),
            is_active: device.is_active,
            trial_started_at: device.trial_started_at.map(iso_timestamp),
            trial_ends_at: device.trial_ends_at.map(iso_timestamp),
            trial_used: device.trial_used,
            is_trial_active,
            is_trial_expired: device.is_trial_expired(now),
            trial_days_remaining: trial_days_left(device, now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListing {
    pub license_key: String,
    pub devices: Vec<DeviceInfo>,
    pub device_limit: Option<u32>,
    pub devices_used: u32,
    pub subscription_status: String,
    pub has_active_subscription: bool,
    pub plan_tier: Option<String>,
    pub subscription_type: Option<String>,
}

fn trial_days_left(device: &ActivatedDevice, now: NaiveDateTime) -> i64 {
    match device.trial_ends_at {
        Some(end) if device.is_trial_active(now) => days_remaining(end, now),
        _ => 0,
    }
}

fn paid_entitlement(account: &Account) -> LicenseResult<bool> {
    Ok(has_active_subscription(
        account.status()?,
        account.subscription_type(),
        account.perpetual_purchased_at,
    ))
}

// ============================================================================
// Manager
// ============================================================================

/// License operations over the account and device tables.
#[derive(Debug, Clone)]
pub struct LicenseManager {
    db: Arc<Database>,
    signer: LicenseSigner,
    key_config: LicenseKeyConfig,
    trial_days: i64,
    dashboard_url: String,
}

impl LicenseManager {
    pub fn new(
        db: Arc<Database>,
        signer: LicenseSigner,
        key_config: LicenseKeyConfig,
        trial_days: i64,
        dashboard_base_url: &str,
    ) -> Self {
        Self {
            db,
            signer,
            key_config,
            trial_days,
            dashboard_url: format!("{}/dashboard", dashboard_base_url.trim_end_matches('/')),
        }
    }

    /// Build from configuration; fails when no signing secret is configured.
    pub fn from_config(db: Arc<Database>, config: &FitflowConfig) -> LicenseResult<Self> {
        Ok(Self::new(
            db,
            LicenseSigner::from_config(&config.license)?,
            LicenseKeyConfig::from(&config.license),
            config.license.trial_days,
            &config.server.dashboard_url,
        ))
    }

    /// Dashboard URL shown to clients that must act on the web.
    pub fn dashboard_url(&self) -> &str {
        &self.dashboard_url
    }

    pub fn trial_days(&self) -> i64 {
        self.trial_days
    }

    pub fn signer(&self) -> &LicenseSigner {
        &self.signer
    }

    /// Account for a client-supplied key.
    ///
    /// Malformed keys and keys with a bad checksum are rejected before any
    /// lookup.
    async fn account_for_key(&self, license_key: &str) -> LicenseResult<Account> {
        if !is_well_formed(license_key, &self.key_config) {
            return Err(LicenseError::InvalidLicenseKey);
        }
        self.db
            .get_account_by_license_key(license_key)
            .await?
            .ok_or(LicenseError::InvalidLicenseKey)
    }

    async fn account_for_email(&self, email: &str) -> LicenseResult<Account> {
        self.db
            .get_account_by_email(email)
            .await?
            .ok_or(LicenseError::AccountNotFound)
    }

    fn sign_for(
        &self,
        account: &Account,
        device: &ActivatedDevice,
        now: NaiveDateTime,
    ) -> LicenseResult<String> {
        self.signer.sign(&LicensePayload::new(
            &account.license_key,
            &device.device_id,
            device.trial_ends_at,
            &account.subscription_status,
            now.and_utc(),
        ))
    }

    // === Activation ===

    /// Activate a device for the account owning `request.licenseKey`.
    ///
    /// An unknown device gets a fresh trial, an already active one is
    /// touched, and an inactive one is reactivated with its original trial.
    /// Reactivation counts as adding an active device, so it is refused with
    /// [`LicenseError::DeviceLimitReached`] while the limit is filled.
    pub async fn activate(
        &self,
        request: &ActivateRequest,
        now: NaiveDateTime,
    ) -> LicenseResult<ActivationOutcome> {
        let activation = request.validate()?;

        match self.activate_device(&activation, now).await {
            Ok(outcome) => {
                let event = match outcome.kind {
                    ActivationKind::Activated => LicenseEvent::Activated,
                    ActivationKind::Reactivated => LicenseEvent::Reactivated,
                    ActivationKind::AlreadyActive => LicenseEvent::AlreadyActive,
                };
                log_license_event(
                    event,
                    &activation.license_key,
                    Some(&activation.device_id),
                    Some(activation.platform.as_str()),
                );
                Ok(outcome)
            }
            Err(e) => {
                if !matches!(e, LicenseError::ServerError(_)) {
                    log_license_event(
                        LicenseEvent::ActivationDenied,
                        &activation.license_key,
                        Some(&activation.device_id),
                        Some(&e.to_string()),
                    );
                }
                Err(e)
            }
        }
    }

    async fn activate_device(
        &self,
        activation: &DeviceActivation,
        now: NaiveDateTime,
    ) -> LicenseResult<ActivationOutcome> {
        let account = self.account_for_key(&activation.license_key).await?;

        if !account.email_verified {
            return Err(LicenseError::EmailNotVerified);
        }

        let status = account.status()?;
        if status.blocks_activation() {
            return Err(LicenseError::SubscriptionInactive);
        }
        if status == SubscriptionStatus::Trial && now > account.trial_end_at {
            return Err(LicenseError::TrialExpired);
        }

        let limit = account.device_limit();
        let active = self.db.count_active_devices(&account.id).await?;
        let limit_reached = || LicenseError::DeviceLimitReached {
            used: active,
            limit: limit.as_reported().unwrap_or(u32::MAX),
        };

        let existing = self
            .db
            .get_device(&account.id, &activation.device_id)
            .await?;

        let (kind, device, devices_used) = match existing {
            Some(device) if device.is_active => {
                self.db.touch_device(&device.id, now).await?;
                (ActivationKind::AlreadyActive, device, active)
            }
            Some(device) => {
                if limit.is_reached(active) {
                    return Err(limit_reached());
                }
                let device = self
                    .db
                    .reactivate_device(
                        &device.id,
                        activation.device_name.as_deref(),
                        activation.platform.as_str(),
                        &activation.app_version,
                        now,
                    )
                    .await?
                    .ok_or(LicenseError::DeviceNotFound)?;
                (ActivationKind::Reactivated, device, active + 1)
            }
            None => {
                if limit.is_reached(active) {
                    return Err(limit_reached());
                }
                self.create_device(&account, activation, active, now).await?
            }
        };

        let signed_license = self.sign_for(&account, &device, now)?;

        Ok(ActivationOutcome {
            kind,
            message: kind.message(self.trial_days),
            data: ActivationData {
                device_id: device.device_id.clone(),
                device_name: device.device_name.clone(),
                activated_at: iso_timestamp(device.activated_at),
                devices_used,
                device_limit: limit.as_reported(),
                trial_ends_at: device.trial_ends_at.map(iso_timestamp),
                trial_used: device.trial_used,
                subscription_status: account.subscription_status.clone(),
                is_trial_active: device.is_trial_active(now),
                signed_license,
            },
        })
    }

    /// Insert a new device with a fresh trial.
    ///
    /// When a concurrent request inserted the same device first, that row is
    /// answered as already active.
    async fn create_device(
        &self,
        account: &Account,
        activation: &DeviceActivation,
        active: u32,
        now: NaiveDateTime,
    ) -> LicenseResult<(ActivationKind, ActivatedDevice, u32)> {
        let device = ActivatedDevice {
            id: Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            device_id: activation.device_id.clone(),
            device_name: activation.device_name.clone(),
            platform: activation.platform.as_str().to_string(),
            app_version: activation.app_version.clone(),
            is_active: true,
            activated_at: now,
            last_validated_at: now,
            trial_started_at: Some(now),
            trial_ends_at: Some(now + Duration::days(self.trial_days)),
            trial_used: true,
        };

        if self.db.insert_device(&device).await? {
            return Ok((ActivationKind::Activated, device, active + 1));
        }

        let winner = self
            .db
            .get_device(&account.id, &activation.device_id)
            .await?
            .ok_or_else(|| {
                LicenseError::ServerError(format!(
                    "device {} vanished after conflicting insert",
                    activation.device_id
                ))
            })?;
        let used = self.db.count_active_devices(&account.id).await?;
        Ok((ActivationKind::AlreadyActive, winner, used))
    }

    // === Deactivation ===

    /// Deactivate an active device of the authenticated account.
    pub async fn deactivate(
        &self,
        auth: DeactivationAuth<'_>,
        request: &DeactivateRequest,
    ) -> LicenseResult<DeactivationData> {
        let device_id = required(&request.device_id, "deviceId")?;

        let account = match auth {
            DeactivationAuth::LicenseKey(key) => self
                .db
                .get_account_by_license_key(key.trim())
                .await?
                .ok_or(LicenseError::AccountNotFound)?,
            DeactivationAuth::Session(email) => self.account_for_email(email).await?,
        };

        let device = self
            .db
            .get_device(&account.id, &device_id)
            .await?
            .filter(|d| d.is_active)
            .ok_or(LicenseError::DeviceNotFound)?;

        if !self.db.deactivate_device(&account.id, &device_id).await? {
            return Err(LicenseError::DeviceNotFound);
        }

        let devices_used = self.db.count_active_devices(&account.id).await?;
        log_license_event(
            LicenseEvent::Deactivated,
            &account.license_key,
            Some(&device_id),
            None,
        );

        Ok(DeactivationData {
            device_id: device.device_id,
            device_name: device.device_name,
            devices_used,
            device_limit: account.device_limit().as_reported(),
        })
    }

    // === Validation ===

    /// Periodic online check for an activated device.
    pub async fn validate(
        &self,
        request: &ValidateRequest,
        now: NaiveDateTime,
    ) -> LicenseResult<ValidationOutcome> {
        let license_key = required(&request.license_key, "licenseKey")?;
        let device_id = required(&request.device_id, "deviceId")?;

        let account = self.account_for_key(&license_key).await?;
        let device = match self.db.get_device(&account.id, &device_id).await? {
            Some(device) if device.is_active => device,
            _ => {
                log_license_event(
                    LicenseEvent::ValidationFailed,
                    &license_key,
                    Some(&device_id),
                    Some("device not activated"),
                );
                return Err(LicenseError::DeviceNotActivated);
            }
        };

        self.db.touch_device(&device.id, now).await?;

        let is_trial_active = device.is_trial_active(now);
        let is_trial_expired = device.is_trial_expired(now);
        let has_active_subscription = paid_entitlement(&account)?;
        let valid = is_trial_active || has_active_subscription;
        let requires_payment = is_trial_expired && !has_active_subscription;

        let updates_available = (account.subscription_type() == Some(SubscriptionType::Perpetual))
            .then(|| {
                has_update_access(
                    account.perpetual_purchased_at,
                    account.perpetual_updates_until,
                    now,
                )
            });

        if valid {
            log_license_event(LicenseEvent::Validated, &license_key, Some(&device_id), None);
        } else {
            log_license_event(
                LicenseEvent::ValidationFailed,
                &license_key,
                Some(&device_id),
                Some("payment required"),
            );
        }

        Ok(ValidationOutcome {
            valid,
            data: ValidationData {
                device_id: device.device_id.clone(),
                device_name: device.device_name.clone(),
                activated_at: iso_timestamp(device.activated_at),
                last_validated_at: iso_timestamp(now),
                subscription_status: account.subscription_status.clone(),
                is_trial_active,
                is_trial_expired,
                trial_ends_at: device.trial_ends_at.map(iso_timestamp),
                trial_days_remaining: trial_days_left(&device, now),
                has_active_subscription,
                requires_payment,
                updates_available,
                dashboard_url: self.dashboard_url.clone(),
                signed_license: self.sign_for(&account, &device, now)?,
            },
        })
    }

    // === Dashboard ===

    /// All devices of the account with computed trial status.
    pub async fn list_devices(&self, email: &str, now: NaiveDateTime) -> LicenseResult<DeviceListing> {
        let account = self.account_for_email(email).await?;
        let devices: Vec<DeviceInfo> = self
            .db
            .list_devices(&account.id)
            .await?
            .iter()
            .map(|d| DeviceInfo::from_device(d, now))
            .collect();

        let devices_used = u32::try_from(devices.iter().filter(|d| d.is_active).count())
            .unwrap_or(u32::MAX);

        Ok(DeviceListing {
            has_active_subscription: paid_entitlement(&account)?,
            device_limit: account.device_limit().as_reported(),
            license_key: account.license_key,
            devices,
            devices_used,
            subscription_status: account.subscription_status,
            plan_tier: account.plan_tier,
            subscription_type: account.subscription_type,
        })
    }

    // === Accounts ===

    /// Create an account on a trial with a single device and a fresh key.
    pub async fn register_account(
        &self,
        email: &str,
        name: Option<&str>,
        now: NaiveDateTime,
    ) -> LicenseResult<Account> {
        let email = email.trim();
        validate_email(email, "email")?;
        let name = normalize_optional(name, "name")?;

        let db = Arc::clone(&self.db);
        let license_key = generate_unique_license_key(
            &self.key_config,
            |key| {
                let db = Arc::clone(&db);
                async move { db.license_key_exists(&key).await }
            },
            MAX_GENERATION_ATTEMPTS,
        )
        .await?;

        let account = Account {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name,
            email_verified: false,
            license_key,
            subscription_status: SubscriptionStatus::Trial.as_str().to_string(),
            subscription_type: None,
            plan_tier: None,
            device_limit: Some(i64::from(TRIAL_DEVICE_LIMIT)),
            trial_start_at: now,
            trial_end_at: now + Duration::days(self.trial_days),
            perpetual_purchased_at: None,
            perpetual_updates_until: None,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_account(&account).await?;
        log_license_event(LicenseEvent::AccountCreated, &account.license_key, None, None);

        Ok(account)
    }

    pub async fn verify_email(&self, email: &str, now: NaiveDateTime) -> LicenseResult<()> {
        if !self.db.verify_email(email.trim(), now).await? {
            return Err(LicenseError::AccountNotFound);
        }
        Ok(())
    }

    /// Record a completed plan purchase and return the updated account.
    pub async fn apply_purchase(
        &self,
        email: &str,
        tier: PlanTier,
        subscription_type: SubscriptionType,
        now: NaiveDateTime,
    ) -> LicenseResult<Account> {
        let account = self.account_for_email(email.trim()).await?;

        let perpetual = (subscription_type == SubscriptionType::Perpetual)
            .then(|| (now, perpetual_updates_until(now)));

        if !self
            .db
            .apply_purchase(&account.id, tier, subscription_type, perpetual, now)
            .await?
        {
            return Err(LicenseError::AccountNotFound);
        }

        log_license_event(
            LicenseEvent::Purchase,
            &account.license_key,
            None,
            Some(&format!("{tier} {subscription_type}")),
        );

        self.account_for_email(&account.email).await
    }

    /// Change an account's subscription status (billing events).
    pub async fn set_subscription_status(
        &self,
        email: &str,
        status: SubscriptionStatus,
        now: NaiveDateTime,
    ) -> LicenseResult<()> {
        let account = self.account_for_email(email.trim()).await?;
        self.db
            .set_subscription_status(&account.id, status, now)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_request_requires_fields() {
        let request = ActivateRequest {
            license_key: Some("FFAB-CDEF-GHJK-LMNP-1A2B".to_string()),
            device_id: Some("device-1".to_string()),
            platform: Some("darwin".to_string()),
            app_version: Some("2.4.1".to_string()),
            device_name: Some("   ".to_string()),
        };
        let activation = request.validate().unwrap();
        assert_eq!(activation.platform, Platform::Mac);
        assert_eq!(activation.device_name, None);

        let missing = ActivateRequest {
            app_version: None,
            ..request.clone()
        };
        let err = missing.validate().unwrap_err();
        assert_eq!(err.field, "appVersion");

        let bad_platform = ActivateRequest {
            platform: Some("beos".to_string()),
            ..request
        };
        assert_eq!(bad_platform.validate().unwrap_err().field, "platform");
    }

    #[test]
    fn activate_request_parses_camel_case() {
        let request: ActivateRequest = serde_json::from_str(
            r#"{"licenseKey":"k","deviceId":"d","platform":"linux","appVersion":"1.0"}"#,
        )
        .unwrap();
        assert_eq!(request.license_key.as_deref(), Some("k"));
        assert_eq!(request.device_name, None);
    }

    #[tokio::test]
    async fn lost_insert_answers_with_the_winning_row() {
        let now = chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let db = Database::in_memory().await.unwrap();
        let manager = LicenseManager::new(
            Arc::clone(&db),
            LicenseSigner::new(b"unit-test-secret"),
            LicenseKeyConfig::default(),
            30,
            "https://fitflow.test",
        );
        let account = manager
            .register_account("race@gym.example", None, now)
            .await
            .unwrap();

        let activation = ActivateRequest {
            license_key: Some(account.license_key.clone()),
            device_id: Some("device-a".to_string()),
            device_name: Some("Front desk".to_string()),
            platform: Some("win32".to_string()),
            app_version: Some("2.0.0".to_string()),
        }
        .validate()
        .unwrap();

        // The other request's row lands between lookup and insert.
        let winner = ActivatedDevice {
            id: "winner-row".to_string(),
            account_id: account.id.clone(),
            device_id: "device-a".to_string(),
            device_name: Some("Front desk".to_string()),
            platform: "windows".to_string(),
            app_version: "2.0.0".to_string(),
            is_active: true,
            activated_at: now - Duration::minutes(1),
            last_validated_at: now - Duration::minutes(1),
            trial_started_at: Some(now - Duration::minutes(1)),
            trial_ends_at: Some(now + Duration::days(29)),
            trial_used: true,
        };
        assert!(db.insert_device(&winner).await.unwrap());

        let (kind, device, used) = manager
            .create_device(&account, &activation, 0, now)
            .await
            .unwrap();
        assert_eq!(kind, ActivationKind::AlreadyActive);
        assert_eq!(device.id, "winner-row");
        assert_eq!(device.trial_ends_at, winner.trial_ends_at);
        assert_eq!(used, 1);
        assert_eq!(db.count_active_devices(&account.id).await.unwrap(), 1);
    }

    #[test]
    fn activation_messages() {
        assert_eq!(
            ActivationKind::Activated.message(30),
            "Device activated successfully! 30-day trial started."
        );
        assert_eq!(
            ActivationKind::AlreadyActive.message(30),
            "Device already activated"
        );
    }
}
