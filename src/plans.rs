//! Plans, subscription states and entitlement checks.
//!
//! Plan tiers determine how many devices an account may activate at once:
//!
//! | Tier         | Devices   |
//! |--------------|-----------|
//! | `basic`      | 1         |
//! | `pro`        | 3         |
//! | `enterprise` | unlimited |
//!
//! Accounts start on a 30-day account trial with a single device. A purchase
//! moves them to `active` with the tier's limit; perpetual purchases also
//! carry one year of update access.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::LicenseError;

/// Days of update access bundled with a perpetual purchase.
pub const PERPETUAL_UPDATE_DAYS: i64 = 365;

/// Device limit given to newly registered (trial) accounts.
pub const TRIAL_DEVICE_LIMIT: u32 = 1;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LicenseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(LicenseError::InvalidRequest(format!(
                        "unknown {}: '{other}'",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

/// Account subscription state as stored and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Cancelled,
    Expired,
    Paused,
}

string_enum!(SubscriptionStatus {
    Trial => "trial",
    Active => "active",
    PastDue => "past_due",
    Cancelled => "cancelled",
    Expired => "expired",
    Paused => "paused",
});

impl SubscriptionStatus {
    /// `expired` and `cancelled` accounts cannot activate new devices.
    pub fn blocks_activation(&self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Subscription,
    Perpetual,
}

string_enum!(SubscriptionType {
    Subscription => "subscription",
    Perpetual => "perpetual",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Basic,
    Pro,
    Enterprise,
}

string_enum!(PlanTier {
    Basic => "basic",
    Pro => "pro",
    Enterprise => "enterprise",
});

impl PlanTier {
    pub fn device_limit(&self) -> DeviceLimit {
        match self {
            Self::Basic => DeviceLimit::Limited(1),
            Self::Pro => DeviceLimit::Limited(3),
            Self::Enterprise => DeviceLimit::Unlimited,
        }
    }
}

/// Maximum number of simultaneously active devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLimit {
    Limited(u32),
    Unlimited,
}

impl DeviceLimit {
    /// Storage form: `NULL` means unlimited.
    pub fn from_column(value: Option<i64>) -> Self {
        match value {
            Some(n) => Self::Limited(u32::try_from(n.max(0)).unwrap_or(u32::MAX)),
            None => Self::Unlimited,
        }
    }

    pub fn to_column(self) -> Option<i64> {
        match self {
            Self::Limited(n) => Some(i64::from(n)),
            Self::Unlimited => None,
        }
    }

    /// Whether `active` devices already fill the limit.
    pub fn is_reached(&self, active: u32) -> bool {
        match self {
            Self::Limited(n) => active >= *n,
            Self::Unlimited => false,
        }
    }

    /// Number reported to clients; unlimited is `null`.
    pub fn as_reported(&self) -> Option<u32> {
        match self {
            Self::Limited(n) => Some(*n),
            Self::Unlimited => None,
        }
    }
}

/// Outcome of [`check_subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCheck {
    pub valid: bool,
    /// Machine-readable reason (`TRIAL_EXPIRED`, `PAYMENT_WARNING`, ...)
    pub code: Option<&'static str>,
    pub message: Option<&'static str>,
}

impl SubscriptionCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            code: None,
            message: None,
        }
    }

    fn with(valid: bool, code: &'static str, message: &'static str) -> Self {
        Self {
            valid,
            code: Some(code),
            message: Some(message),
        }
    }
}

/// Decide whether an account's subscription currently grants use.
///
/// `past_due` subscriptions stay valid with a payment warning. Perpetual
/// licenses never expire.
pub fn check_subscription(
    status: SubscriptionStatus,
    subscription_type: Option<SubscriptionType>,
    trial_ends_at: NaiveDateTime,
    now: NaiveDateTime,
) -> SubscriptionCheck {
    if status == SubscriptionStatus::Trial {
        if now > trial_ends_at {
            return SubscriptionCheck::with(
                false,
                "TRIAL_EXPIRED",
                "Your 30-day trial has ended. Upgrade to continue.",
            );
        }
        return SubscriptionCheck::ok();
    }

    match subscription_type {
        Some(SubscriptionType::Subscription) => match status {
            SubscriptionStatus::PastDue => SubscriptionCheck::with(
                true,
                "PAYMENT_WARNING",
                "Payment failed. Please update your payment method.",
            ),
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
                SubscriptionCheck::with(
                    false,
                    "SUBSCRIPTION_EXPIRED",
                    "Your subscription is inactive. Reactivate to continue.",
                )
            }
            _ => SubscriptionCheck::ok(),
        },
        Some(SubscriptionType::Perpetual) => SubscriptionCheck::ok(),
        None => SubscriptionCheck::with(false, "UNKNOWN_STATUS", "Unknown subscription status"),
    }
}

/// Paid entitlement independent of any device trial: an `active` subscription
/// or a recorded perpetual purchase.
pub fn has_active_subscription(
    status: SubscriptionStatus,
    subscription_type: Option<SubscriptionType>,
    perpetual_purchased_at: Option<NaiveDateTime>,
) -> bool {
    status == SubscriptionStatus::Active
        || (subscription_type == Some(SubscriptionType::Perpetual)
            && perpetual_purchased_at.is_some())
}

/// Whether a perpetual license still receives updates.
pub fn has_update_access(
    purchased_at: Option<NaiveDateTime>,
    updates_until: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> bool {
    match (purchased_at, updates_until) {
        (Some(_), Some(until)) => now < until,
        _ => false,
    }
}

/// End of the update window for a perpetual purchase made at `purchased_at`.
pub fn perpetual_updates_until(purchased_at: NaiveDateTime) -> NaiveDateTime {
    purchased_at + Duration::days(PERPETUAL_UPDATE_DAYS)
}

/// Whole days left until `end`, rounded up and never negative.
pub fn days_remaining(end: NaiveDateTime, now: NaiveDateTime) -> i64 {
    let millis = (end - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    (millis + DAY_MS - 1) / DAY_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn tier_device_limits() {
        assert_eq!(PlanTier::Basic.device_limit(), DeviceLimit::Limited(1));
        assert_eq!(PlanTier::Pro.device_limit(), DeviceLimit::Limited(3));
        assert_eq!(PlanTier::Enterprise.device_limit(), DeviceLimit::Unlimited);
    }

    #[test]
    fn device_limit_reached() {
        assert!(DeviceLimit::Limited(1).is_reached(1));
        assert!(!DeviceLimit::Limited(3).is_reached(2));
        assert!(!DeviceLimit::Unlimited.is_reached(10_000));
        assert_eq!(DeviceLimit::from_column(None), DeviceLimit::Unlimited);
        assert_eq!(DeviceLimit::from_column(Some(3)), DeviceLimit::Limited(3));
        assert_eq!(DeviceLimit::Limited(3).to_column(), Some(3));
    }

    #[test]
    fn status_parse_round_trip() {
        for s in ["trial", "active", "past_due", "cancelled", "expired", "paused"] {
            assert_eq!(s.parse::<SubscriptionStatus>().unwrap().as_str(), s);
        }
        assert!("lapsed".parse::<SubscriptionStatus>().is_err());
        assert_eq!("pro".parse::<PlanTier>().unwrap(), PlanTier::Pro);
    }

    #[test]
    fn trial_check_depends_on_end() {
        let check = check_subscription(SubscriptionStatus::Trial, None, at(10), at(5));
        assert!(check.valid);

        let check = check_subscription(SubscriptionStatus::Trial, None, at(10), at(11));
        assert!(!check.valid);
        assert_eq!(check.code, Some("TRIAL_EXPIRED"));
    }

    #[test]
    fn past_due_is_valid_with_warning() {
        let check = check_subscription(
            SubscriptionStatus::PastDue,
            Some(SubscriptionType::Subscription),
            at(1),
            at(20),
        );
        assert!(check.valid);
        assert_eq!(check.code, Some("PAYMENT_WARNING"));
    }

    #[test]
    fn cancelled_subscription_is_invalid_but_perpetual_never_expires() {
        let check = check_subscription(
            SubscriptionStatus::Cancelled,
            Some(SubscriptionType::Subscription),
            at(1),
            at(20),
        );
        assert!(!check.valid);

        let check = check_subscription(
            SubscriptionStatus::Expired,
            Some(SubscriptionType::Perpetual),
            at(1),
            at(20),
        );
        assert!(check.valid);
    }

    #[test]
    fn active_subscription_or_perpetual_purchase() {
        assert!(has_active_subscription(SubscriptionStatus::Active, None, None));
        assert!(has_active_subscription(
            SubscriptionStatus::Trial,
            Some(SubscriptionType::Perpetual),
            Some(at(1))
        ));
        assert!(!has_active_subscription(
            SubscriptionStatus::PastDue,
            Some(SubscriptionType::Subscription),
            None
        ));
    }

    #[test]
    fn update_access_window() {
        let until = perpetual_updates_until(at(1));
        assert!(has_update_access(Some(at(1)), Some(until), at(2)));
        assert!(!has_update_access(Some(at(1)), Some(at(3)), at(4)));
        assert!(!has_update_access(None, Some(until), at(2)));
    }

    #[test]
    fn days_remaining_rounds_up() {
        assert_eq!(days_remaining(at(11), at(1)), 10);
        assert_eq!(days_remaining(at(11), at(1) + Duration::hours(1)), 10);
        assert_eq!(days_remaining(at(1), at(2)), 0);
        assert_eq!(days_remaining(at(2), at(2)), 0);
    }
}
