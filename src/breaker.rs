//! Cooldown circuit breaker for rate-limited remote collaborators
//!
//! After a quota/rate-limit error, remote calls are suppressed for a fixed
//! window and callers fall back to local-only behavior.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Default suppression window after a rate-limit error
pub const DEFAULT_COOLDOWN_SECS: i64 = 300; // 5 minutes

/// Fixed-window circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    open_until: Mutex<Option<DateTime<Utc>>>,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Create a breaker with the default 5-minute cooldown
    #[must_use]
    pub fn new() -> Self {
        Self::with_cooldown_secs(DEFAULT_COOLDOWN_SECS)
    }

    /// Create a breaker with a custom cooldown
    #[must_use]
    pub fn with_cooldown_secs(secs: i64) -> Self {
        Self {
            open_until: Mutex::new(None),
            cooldown: Duration::seconds(secs),
        }
    }

    /// Whether remote calls are currently suppressed
    #[must_use]
    pub fn is_open(&self) -> bool {
        let mut open_until = self.open_until.lock().unwrap();
        match *open_until {
            Some(until) if Utc::now() < until => true,
            Some(_) => {
                *open_until = None;
                false
            }
            None => false,
        }
    }

    /// Open the breaker for the cooldown window
    pub fn trip(&self) {
        let until = Utc::now() + self.cooldown;
        *self.open_until.lock().unwrap() = Some(until);
        tracing::warn!(until = %until, "circuit breaker tripped, remote calls suppressed");
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an HTTP status or error text looks like a rate-limit failure
#[must_use]
pub fn is_rate_limit(status: Option<reqwest::StatusCode>, body: &str) -> bool {
    status == Some(reqwest::StatusCode::TOO_MANY_REQUESTS)
        || body.contains("429")
        || body.contains("RESOURCE_EXHAUSTED")
        || body.to_lowercase().contains("rate limit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::new();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_trip_opens_for_cooldown() {
        let breaker = CircuitBreaker::new();
        breaker.trip();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_reopens_after_cooldown() {
        let breaker = CircuitBreaker::with_cooldown_secs(0);
        breaker.trip();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limit(
            Some(reqwest::StatusCode::TOO_MANY_REQUESTS),
            ""
        ));
        assert!(is_rate_limit(None, "RESOURCE_EXHAUSTED: quota"));
        assert!(!is_rate_limit(Some(reqwest::StatusCode::BAD_REQUEST), "oops"));
    }
}
