//! Request counters for the health endpoint and shutdown drain.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::auth::Verdict;

/// Request metrics for monitoring.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    /// Total guarded requests processed.
    pub requests_total: AtomicU64,
    /// Requests that ended in a 401 or 429.
    pub requests_rejected: AtomicU64,
    /// Requests currently inside the guard.
    pub active_requests: AtomicUsize,
}

/// Point-in-time copy of [`RequestMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_rejected: u64,
    pub active_requests: usize,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a request as in flight until the returned guard drops.
    pub fn begin(self: &Arc<Self>) -> ActiveRequest {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        ActiveRequest {
            metrics: Arc::clone(self),
        }
    }

    /// Count a finished authentication decision.
    pub fn record_verdict(&self, verdict: &Verdict) {
        self.record(matches!(verdict, Verdict::Authenticated { .. }));
    }

    /// Count a finished request.
    pub fn record(&self, accepted: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if !accepted {
            self.requests_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn rejected_requests(&self) -> u64 {
        self.requests_rejected.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> usize {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Wait until no request is inside the guard.
    ///
    /// Returns immediately if nothing is in flight.
    pub async fn wait_for_drain(&self) {
        let poll_interval = Duration::from_millis(100);

        while self.active() > 0 {
            debug!(active = self.active(), "Waiting for requests to drain");
            tokio::time::sleep(poll_interval).await;
        }

        info!("All requests drained");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.total_requests(),
            requests_rejected: self.rejected_requests(),
            active_requests: self.active(),
        }
    }
}

/// Decrements the active count on drop.
pub struct ActiveRequest {
    metrics: Arc<RequestMetrics>,
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.metrics.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_guard_decrements() {
        let metrics = Arc::new(RequestMetrics::new());
        {
            let _a = metrics.begin();
            let _b = metrics.begin();
            assert_eq!(metrics.active(), 2);
        }
        assert_eq!(metrics.active(), 0);
    }

    #[test]
    fn test_record_counts_rejections() {
        let metrics = RequestMetrics::new();
        metrics.record(true);
        metrics.record(false);
        metrics.record(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 3);
        assert_eq!(snapshot.requests_rejected, 2);
        assert_eq!(snapshot.active_requests, 0);
    }

    #[tokio::test]
    async fn test_wait_for_drain_returns_when_idle() {
        let metrics = Arc::new(RequestMetrics::new());
        let active = metrics.begin();

        let waiter = {
            let metrics = Arc::clone(&metrics);
            tokio::spawn(async move { metrics.wait_for_drain().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(active);
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
