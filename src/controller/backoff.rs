//! # Exponential Backoff
//!
//! Backoff for transient reconcile errors (network failures, 5xx, store conflicts).
//!
//! The delay starts at a minimum, doubles on every consecutive error and is capped
//! at a maximum. A successful invocation drops the resource's backoff state.
//!
//! ## Usage
//!
//! ```rust
//! use service_broker_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(300));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(20));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each call to [`ExponentialBackoff::next_backoff`] returns the current delay and
/// doubles it for the next call, never exceeding `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay returned by the next call
    current: Duration,
    /// Cap
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff
    ///
    /// # Arguments
    ///
    /// * `min` - First delay (typically 5s)
    /// * `max` - Maximum delay (typically 5m)
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.min(max);
        Self { current: min, max }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(300));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(20));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(40));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(80));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(160));
        // Next would be 320s, capped at 300s
        assert_eq!(backoff.next_backoff(), Duration::from_secs(300));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(300));
    }

    #[test]
    fn test_min_above_max_is_clamped() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(600), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn test_per_resource_state_is_independent() {
        let mut backoff1 = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(8));
        let mut backoff2 = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(8));

        assert_eq!(backoff1.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff1.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff2.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff1.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff2.next_backoff(), Duration::from_secs(2));
    }
}
