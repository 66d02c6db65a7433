//! Reconnection backoff.

use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay the backoff starts from and returns to once data flows again.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Growth factor applied on every disconnect.
    pub backoff_multiplier: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2,
        }
    }
}

impl ReconnectConfig {
    /// Sets the floor delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the ceiling delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: u32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }
}

/// Current reconnect delay.
///
/// Always stays within `[initial_delay, max_delay]`. There is no attempt limit:
/// the caller retries forever.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    current_delay: Duration,
}

impl Backoff {
    /// Creates a backoff sitting at its floor.
    ///
    /// A ceiling below the floor is raised to the floor.
    #[must_use]
    pub fn new(mut config: ReconnectConfig) -> Self {
        config.max_delay = config.max_delay.max(config.initial_delay);
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
        }
    }

    /// Grows the delay for a disconnect and returns the time to wait before
    /// the next attempt.
    pub fn on_disconnect(&mut self) -> Duration {
        self.current_delay = self
            .current_delay
            .saturating_mul(self.config.backoff_multiplier)
            .clamp(self.config.initial_delay, self.config.max_delay);
        self.current_delay
    }

    /// Drops back to the floor; called whenever data arrives.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
    }

    /// Returns the current delay.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current_delay
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
