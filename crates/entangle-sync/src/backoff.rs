//! Exponential reconnect backoff.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Doubling delay between reconnect attempts.
///
/// ```
/// use entangle_sync::{Backoff, BackoffConfig};
///
/// let mut backoff = Backoff::new(BackoffConfig::default());
/// assert_eq!(backoff.next_delay().as_millis(), 256);
/// assert_eq!(backoff.next_delay().as_millis(), 512);
/// backoff.reset();
/// assert_eq!(backoff.next_delay().as_millis(), 256);
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial.min(config.max);
        Self { config, current }
    }

    /// The delay the next failure will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the current delay and double it for next time, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.config.max);
        delay
    }

    /// Return to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.config.initial.min(self.config.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence_and_cap() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        let delays: Vec<u128> = (0..10).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(
            delays,
            vec![256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 32768, 32768]
        );
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_millis(1024));
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(256));
    }

    #[test]
    fn test_backoff_initial_above_max() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(1),
        });
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
