//! In-process rate limiting for the public license endpoints.
//!
//! Each action allows at most N attempts per hour per client. Keys are
//! `action:identifier`, where the identifier is the caller's IP address, and
//! each key owns a fixed window: a counter plus the instant it resets. The
//! first attempt after the reset instant opens a new window.
//!
//! State lives in the [`RateLimiter`] owned by `AppState`: it is lost on
//! restart and not shared between server instances. Expired windows are
//! dropped by a sweeper task started with [`RateLimiter::spawn_sweeper`].
//!
//! # Configuration
//!
//! ```toml
//! [rate_limit]
//! activation_per_hour = 5
//! validation_per_hour = 10
//! sweep_interval_secs = 600
//! ```

use governor::clock::{Clock, DefaultClock, Reference};
use governor::nanos::Nanos;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::errors::{LicenseError, LicenseResult};

const WINDOW: Duration = Duration::from_secs(60 * 60);

/// Rate-limited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitAction {
    /// `POST /api/license/activate`
    Activation,
    /// `POST /api/license/validate`
    Validation,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::Activation => "license-activation",
            RateLimitAction::Validation => "license-validation",
        }
    }
}

impl fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Window<I> {
    count: u32,
    reset_at: I,
}

/// Per-action fixed-window counters, keyed by `action:identifier`.
///
/// Generic over the governor [`Clock`] so tests can drive time by hand.
#[derive(Clone)]
pub struct RateLimiter<C: Clock = DefaultClock> {
    windows: Arc<Mutex<HashMap<String, Window<C::Instant>>>>,
    activation_per_hour: u32,
    validation_per_hour: u32,
    clock: C,
}

impl RateLimiter {
    pub fn new(activation_per_hour: u32, validation_per_hour: u32) -> Self {
        Self::with_clock(activation_per_hour, validation_per_hour, DefaultClock::default())
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.activation_per_hour, config.validation_per_hour)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(activation_per_hour: u32, validation_per_hour: u32, clock: C) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            activation_per_hour: activation_per_hour.max(1),
            validation_per_hour: validation_per_hour.max(1),
            clock,
        }
    }

    fn max_attempts(&self, action: RateLimitAction) -> u32 {
        match action {
            RateLimitAction::Activation => self.activation_per_hour,
            RateLimitAction::Validation => self.validation_per_hour,
        }
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, Window<C::Instant>>> {
        // Counters stay consistent even if a holder panicked.
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one attempt for `identifier`.
    ///
    /// Returns [`LicenseError::RateLimited`] with the seconds until the
    /// window resets (at least 1).
    pub fn check(&self, action: RateLimitAction, identifier: &str) -> LicenseResult<()> {
        let key = format!("{action}:{identifier}");
        let max = self.max_attempts(action);
        let now = self.clock.now();
        let fresh = Window {
            count: 0,
            reset_at: now + Nanos::from(WINDOW),
        };

        let mut windows = self.windows();
        let window = windows.entry(key).or_insert(fresh);
        if now >= window.reset_at {
            *window = fresh;
        }

        window.count = window.count.saturating_add(1);
        if window.count <= max {
            return Ok(());
        }

        let wait = Duration::from(window.reset_at.duration_since(now));
        let retry_after_secs = (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1);
        debug!(%action, identifier, retry_after_secs, "Rate limit exceeded");
        Err(LicenseError::RateLimited { retry_after_secs })
    }

    /// Drop windows that have reset.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let mut windows = self.windows();
        windows.retain(|_, window| now < window.reset_at);
        windows.shrink_to_fit();
    }

    /// Number of tracked keys across all actions.
    pub fn tracked_keys(&self) -> usize {
        self.windows().len()
    }
}

impl<C> RateLimiter<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Start a background task that calls [`sweep`](Self::sweep) every `interval`.
    ///
    /// The task stops when the returned handle is shut down or dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let limiter = self.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        limiter.sweep();
                        debug!(tracked = limiter.tracked_keys(), "Swept rate limiter state");
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        SweeperHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

impl<C: Clock> fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("activation_per_hour", &self.activation_per_hour)
            .field("validation_per_hour", &self.validation_per_hour)
            .field("tracked_keys", &self.tracked_keys())
            .finish()
    }
}

/// Handle to the sweeper task started by [`RateLimiter::spawn_sweeper`].
#[derive(Debug)]
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    fn fake(activation: u32, validation: u32) -> (RateLimiter<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        (RateLimiter::with_clock(activation, validation, clock.clone()), clock)
    }

    #[test]
    fn allows_quota_then_blocks() {
        let limiter = RateLimiter::new(5, 10);
        for _ in 0..5 {
            assert!(limiter.check(RateLimitAction::Activation, "1.2.3.4").is_ok());
        }

        match limiter.check(RateLimitAction::Activation, "1.2.3.4") {
            Err(LicenseError::RateLimited { retry_after_secs }) => {
                assert!(retry_after_secs > 59 * 60 && retry_after_secs <= 60 * 60);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn at_most_quota_attempts_within_an_hour() {
        let (limiter, clock) = fake(5, 10);

        let mut allowed = 0;
        for _ in 0..59 {
            if limiter.check(RateLimitAction::Activation, "1.2.3.4").is_ok() {
                allowed += 1;
            }
            clock.advance(Duration::from_secs(60));
        }
        assert_eq!(allowed, 5);

        let mut allowed = 0;
        for _ in 0..59 {
            if limiter.check(RateLimitAction::Validation, "1.2.3.4").is_ok() {
                allowed += 1;
            }
            clock.advance(Duration::from_secs(60));
        }
        assert_eq!(allowed, 10);
    }

    #[test]
    fn retry_after_counts_down_to_window_reset() {
        let (limiter, clock) = fake(2, 10);
        assert!(limiter.check(RateLimitAction::Activation, "a").is_ok());
        clock.advance(Duration::from_secs(10 * 60));
        assert!(limiter.check(RateLimitAction::Activation, "a").is_ok());
        clock.advance(Duration::from_secs(30 * 60));

        match limiter.check(RateLimitAction::Activation, "a") {
            Err(LicenseError::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, 20 * 60);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        clock.advance(Duration::from_secs(20 * 60));
        assert!(limiter.check(RateLimitAction::Activation, "a").is_ok());
        assert!(limiter.check(RateLimitAction::Activation, "a").is_ok());
        assert!(limiter.check(RateLimitAction::Activation, "a").is_err());
    }

    #[test]
    fn keys_and_actions_are_independent() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.check(RateLimitAction::Activation, "a").is_ok());
        assert!(limiter.check(RateLimitAction::Activation, "a").is_err());

        assert!(limiter.check(RateLimitAction::Activation, "b").is_ok());
        assert!(limiter.check(RateLimitAction::Validation, "a").is_ok());
    }

    #[test]
    fn clones_share_state() {
        let limiter = RateLimiter::new(1, 1);
        let other = limiter.clone();
        assert!(limiter.check(RateLimitAction::Validation, "x").is_ok());
        assert!(other.check(RateLimitAction::Validation, "x").is_err());
        assert_eq!(other.tracked_keys(), 1);
    }

    #[test]
    fn sweep_drops_only_expired_windows() {
        let (limiter, clock) = fake(1, 1);
        let _ = limiter.check(RateLimitAction::Activation, "old");
        clock.advance(Duration::from_secs(30 * 60));
        let _ = limiter.check(RateLimitAction::Activation, "new");

        limiter.sweep();
        assert_eq!(limiter.tracked_keys(), 2);
        assert!(limiter.check(RateLimitAction::Activation, "old").is_err());

        clock.advance(Duration::from_secs(30 * 60));
        limiter.sweep();
        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.check(RateLimitAction::Activation, "new").is_err());
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let limiter = RateLimiter::new(5, 10);
        let handle = limiter.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("sweeper did not stop");
    }
}
