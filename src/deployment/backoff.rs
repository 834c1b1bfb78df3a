use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff schedule with a hard cap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    /// Delay before retry `n` (zero-based): `min(initial * multiplier^n, max)`
    pub fn delay_for(&self, n: u32) -> Duration {
        // Multipliers below 1.0 would make the schedule shrink
        let multiplier = self.multiplier.max(1.0);
        let exponent = i32::try_from(n).unwrap_or(i32::MAX);
        let delay = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
