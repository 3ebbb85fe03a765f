//! Per-client rate limiting.
//!
//! Provides a sliding window rate limiter keyed by client IP address. The
//! digest engine itself never limits re-challenges; this sits in front of it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A sliding window rate limiter that tracks requests per client address.
///
/// Each address can make at most `max_requests` within `window` duration.
pub struct RateLimiter {
    /// Request timestamps per client
    requests: Mutex<HashMap<IpAddr, Vec<Instant>>>,
    /// Maximum requests allowed per window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Maximum requests allowed per window
    /// * `window` - Duration of the sliding window
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Check if a request from `client` is allowed and record it.
    ///
    /// Returns `true` if the request is allowed, `false` if rate limited.
    pub fn check_and_record(&self, client: IpAddr) -> bool {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let entry = requests.entry(client).or_default();
        entry.retain(|&t| now.saturating_duration_since(t) < self.window);

        if entry.len() >= self.max_requests {
            return false;
        }

        entry.push(now);
        true
    }

    /// Drop clients with no requests inside the window.
    pub fn cleanup(&self) {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        requests.retain(|_, times| {
            times.retain(|&t| now.saturating_duration_since(t) < self.window);
            !times.is_empty()
        });
    }

    /// Get the number of clients being tracked.
    pub fn tracked_clients(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Start a background cleanup task.
    ///
    /// This spawns a tokio task that periodically cleans up stale entries
    /// to prevent unbounded memory growth.
    pub fn start_cleanup_task(self: &std::sync::Arc<Self>, interval: Duration) {
        let limiter = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                limiter.cleanup();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        assert!(limiter.check_and_record(ip(1)));
        assert!(limiter.check_and_record(ip(1)));
        assert!(limiter.check_and_record(ip(1)));

        // Should block the 4th request
        assert!(!limiter.check_and_record(ip(1)));
    }

    #[test]
    fn test_rate_limiter_separate_clients() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check_and_record(ip(1)));
        assert!(!limiter.check_and_record(ip(1)));
        assert!(limiter.check_and_record(ip(2)));
    }

    #[test]
    fn test_rate_limiter_window_expiry() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));

        assert!(limiter.check_and_record(ip(1)));
        assert!(limiter.check_and_record(ip(1)));
        assert!(!limiter.check_and_record(ip(1)));

        thread::sleep(Duration::from_millis(80));

        assert!(limiter.check_and_record(ip(1)));
    }

    #[test]
    fn test_rate_limiter_cleanup() {
        let limiter = RateLimiter::new(10, Duration::from_millis(50));

        limiter.check_and_record(ip(1));
        limiter.check_and_record(ip(2));
        assert_eq!(limiter.tracked_clients(), 2);

        thread::sleep(Duration::from_millis(80));

        limiter.cleanup();
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
