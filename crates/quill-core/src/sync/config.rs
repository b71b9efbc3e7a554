//! Tunables for the sync engine

use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings for sync cycles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Minimum gap between the starts of two cycles
    pub cooldown: Duration,
    /// Mutations drained per push batch
    pub push_batch_size: usize,
    /// Remote records fetched per pull
    pub pull_page_size: usize,
    /// Queued mutations older than this are purged after a complete cycle
    pub mutation_retention: Duration,
    /// Confirmed tombstones older than this are removed after a complete cycle
    pub tombstone_retention: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(2),
            push_batch_size: 50,
            pull_page_size: 200,
            mutation_retention: DAY * 30,
            tombstone_retention: DAY * 30,
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_pull_page_size(mut self, size: usize) -> Self {
        self.pull_page_size = size.max(1);
        self
    }

    #[must_use]
    pub const fn with_mutation_retention(mut self, retention: Duration) -> Self {
        self.mutation_retention = retention;
        self
    }

    #[must_use]
    pub const fn with_tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention = retention;
        self
    }
}

/// Bounded retry with exponential backoff for [`SyncEngine::sync_with_retry`].
///
/// [`SyncEngine::sync_with_retry`]: super::SyncEngine::sync_with_retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// A single attempt
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay before attempt `attempt` (0-indexed); the first attempt runs at once
    #[allow(clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}
