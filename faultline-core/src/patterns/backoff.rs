//! Exponential backoff with jitter
//!
//! `delay = min(base * multiplier^(attempt - 1), max)`, plus, when jitter is
//! enabled, a uniform random addition in `[0, delay / 4)`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Share of the computed delay that jitter may add on top
const JITTER_FRACTION: f64 = 0.25;

/// Backoff parameters, also the `[recovery.backoff]` configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound for the un-jittered delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts
    pub multiplier: f64,
    /// Add random jitter to each delay
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Same policy without jitter
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Same policy with a different base delay
    pub fn with_base_delay(&self, base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..self.clone()
        }
    }

    /// Un-jittered delay after the given (1-based) attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = self.multiplier.powi(exponent.min(i32::MAX as u32) as i32);
        let delay_ms = self.base_delay.as_millis() as f64 * factor;
        let max_ms = self.max_delay.as_millis() as f64;

        if !delay_ms.is_finite() || delay_ms >= max_ms {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }

    /// Delay to actually sleep, jittered when enabled
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter {
            apply_jitter(delay)
        } else {
            delay
        }
    }

    /// Un-jittered delays for attempts `1..=attempts`
    pub fn schedule(&self, attempts: u32) -> Vec<Duration> {
        (1..=attempts).map(|attempt| self.delay(attempt)).collect()
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let spread_ms = (delay.as_millis() as f64 * JITTER_FRACTION) as u64;
    if spread_ms == 0 {
        return delay;
    }
    let extra = rand::thread_rng().gen_range(0..spread_ms);
    delay.saturating_add(Duration::from_millis(extra))
}
