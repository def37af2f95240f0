use std::time::Duration;

use rand::Rng;

use crate::types::constants::{
    DEFAULT_BACKOFF_CEILING, DEFAULT_BACKOFF_FLOOR, DEFAULT_BACKOFF_JITTER,
};

/// Reconnection delay policy.
///
/// Delays grow exponentially from the floor, carry proportional random
/// jitter, and never leave the `[floor, ceiling]` band.
#[derive(Debug)]
pub struct Backoff {
    attempts: u32,
    floor: Duration,
    ceiling: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration, jitter: f64) -> Self {
        Self {
            attempts: 0,
            floor,
            ceiling: ceiling.max(floor),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before the next attempt. Advances the cursor.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.floor.as_millis() as f64 * 2f64.powi(self.attempts.min(16) as i32);
        let base = base.min(self.ceiling.as_millis() as f64);
        let jittered = base + base * self.jitter * rand::rng().random_range(0.0..=1.0);

        self.attempts = self.attempts.saturating_add(1);
        Duration::from_millis(jittered as u64).clamp(self.floor, self.ceiling)
    }

    /// Restarts the policy from the floor.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    #[cfg(test)]
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_BACKOFF_FLOOR),
            Duration::from_millis(DEFAULT_BACKOFF_CEILING),
            DEFAULT_BACKOFF_JITTER,
        )
    }
}
