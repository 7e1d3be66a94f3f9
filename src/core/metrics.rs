//! Appender metrics for observability
//!
//! Counters for monitoring delivery health: how many events reached the
//! endpoint, how many were lost to a full send queue or an exhausted quota,
//! and how often deliveries timed out.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for one appender
///
/// # Example
///
/// ```
/// use rust_remote_logger::AppenderMetrics;
///
/// let metrics = AppenderMetrics::new();
///
/// metrics.record_delivered(3);
/// metrics.record_skipped(1);
///
/// assert_eq!(metrics.delivered(), 3);
/// assert_eq!(metrics.skipped(), 1);
/// ```
#[derive(Debug)]
pub struct AppenderMetrics {
    /// Events acknowledged by the transport
    delivered: AtomicU64,

    /// Events dropped because the send queue was at its maximum batch size
    skipped: AtomicU64,

    /// Events refused because the global quota was used up
    quota_dropped: AtomicU64,

    /// Number of deliveries started
    delivery_attempts: AtomicU64,

    /// Deliveries that neither succeeded nor failed before the send timeout
    send_timeouts: AtomicU64,
}

impl AppenderMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            delivered: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            quota_dropped: AtomicU64::new(0),
            delivery_attempts: AtomicU64::new(0),
            send_timeouts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn quota_dropped(&self) -> u64 {
        self.quota_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivery_attempts(&self) -> u64 {
        self.delivery_attempts.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn send_timeouts(&self) -> u64 {
        self.send_timeouts.load(Ordering::Relaxed)
    }

    /// Returns the previous value, like the other `record_*` methods
    #[inline]
    pub fn record_delivered(&self, count: usize) -> u64 {
        self.delivered.fetch_add(count as u64, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_skipped(&self, count: usize) -> u64 {
        self.skipped.fetch_add(count as u64, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_quota_dropped(&self, count: usize) -> u64 {
        self.quota_dropped.fetch_add(count as u64, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_attempt(&self) -> u64 {
        self.delivery_attempts.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_timeout(&self) -> u64 {
        self.send_timeouts.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of events lost (skipped or refused by quota) as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been processed.
    pub fn loss_rate(&self) -> f64 {
        let lost = (self.skipped() + self.quota_dropped()) as f64;
        let total = self.delivered() as f64 + lost;
        if total == 0.0 {
            0.0
        } else {
            (lost / total) * 100.0
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.delivered.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.quota_dropped.store(0, Ordering::Relaxed);
        self.delivery_attempts.store(0, Ordering::Relaxed);
        self.send_timeouts.store(0, Ordering::Relaxed);
    }
}

impl Default for AppenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for AppenderMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            delivered: AtomicU64::new(self.delivered()),
            skipped: AtomicU64::new(self.skipped()),
            quota_dropped: AtomicU64::new(self.quota_dropped()),
            delivery_attempts: AtomicU64::new(self.delivery_attempts()),
            send_timeouts: AtomicU64::new(self.send_timeouts()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = AppenderMetrics::new();
        assert_eq!(metrics.delivered(), 0);
        assert_eq!(metrics.skipped(), 0);
        assert_eq!(metrics.quota_dropped(), 0);
        assert_eq!(metrics.delivery_attempts(), 0);
        assert_eq!(metrics.send_timeouts(), 0);
    }

    #[test]
    fn test_record_returns_previous() {
        let metrics = AppenderMetrics::new();
        assert_eq!(metrics.record_delivered(4), 0);
        assert_eq!(metrics.record_delivered(2), 4);
        assert_eq!(metrics.delivered(), 6);
    }

    #[test]
    fn test_loss_rate() {
        let metrics = AppenderMetrics::new();
        assert_eq!(metrics.loss_rate(), 0.0);

        metrics.record_delivered(90);
        metrics.record_skipped(6);
        metrics.record_quota_dropped(4);

        let rate = metrics.loss_rate();
        assert!((9.9..=10.1).contains(&rate), "Loss rate was {}", rate);
    }

    #[test]
    fn test_reset_and_snapshot() {
        let metrics = AppenderMetrics::new();
        metrics.record_attempt();
        metrics.record_timeout();

        let snapshot = metrics.clone();
        metrics.reset();

        assert_eq!(metrics.delivery_attempts(), 0);
        assert_eq!(metrics.send_timeouts(), 0);
        assert_eq!(snapshot.delivery_attempts(), 1);
        assert_eq!(snapshot.send_timeouts(), 1);
    }
}
