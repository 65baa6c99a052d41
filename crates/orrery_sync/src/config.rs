//! Configuration for the sync manager.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff parameters for failed mutations.
///
/// The delay for an item that has failed `attempts` times is
/// `min(max, base * 2^(attempts - 1))` plus full jitter drawn uniformly from
/// `0..=jitter`, all in milliseconds.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound for the exponential component.
    pub max: Duration,
    /// Upper bound for the uniformly-drawn jitter.
    pub jitter: Duration,
}

impl BackoffConfig {
    /// Sets the base delay.
    #[must_use]
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Sets the maximum exponential delay.
    #[must_use]
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Sets the jitter bound. Zero disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the retry delay after the given number of failed attempts.
    ///
    /// `attempts` counts failures so far and must be at least 1 for a
    /// non-zero delay; the exponent is capped so the arithmetic cannot
    /// overflow.
    #[must_use]
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }

        let exponent = attempts.saturating_sub(1).min(32);
        let base_ms = self.base.as_millis() as u64;
        let uncapped = base_ms.saturating_mul(1u64 << exponent);
        let capped = uncapped.min(self.max.as_millis() as u64);

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };

        Duration::from_millis(capped + jitter)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5 * 60),
            jitter: Duration::from_secs(1),
        }
    }
}

/// Configuration for the sync manager and scheduler.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Attempt budget given to newly enqueued mutations.
    pub max_attempts: u32,
    /// Periodic drain cadence.
    pub drain_interval: Duration,
    /// Settle time between an online transition and the triggered drain.
    pub online_debounce: Duration,
    /// Retry backoff parameters.
    pub backoff: BackoffConfig,
}

impl SyncConfig {
    /// Sets the attempt budget for new mutations.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the periodic drain cadence.
    #[must_use]
    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Sets the online-transition debounce.
    #[must_use]
    pub fn with_online_debounce(mut self, debounce: Duration) -> Self {
        self.online_debounce = debounce;
        self
    }

    /// Sets the backoff parameters.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            drain_interval: Duration::from_secs(30),
            online_debounce: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
        }
    }
}
