//! Per-session statistics.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Counters kept by every adapter for its session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Transport resources opened by `connect`.
    pub connections: u64,

    /// Failed connection attempts, including HTTP retries.
    pub failed_connections: u64,

    /// Messages or requests written.
    pub messages_sent: u64,

    /// Messages or responses read.
    pub messages_received: u64,

    /// Payload bytes written.
    pub bytes_sent: u64,

    /// Payload bytes read.
    pub bytes_received: u64,

    /// Average call latency in microseconds.
    pub avg_latency_us: u64,

    /// Last successful transport activity.
    #[serde(skip)]
    pub last_activity: Option<Instant>,
}

impl SessionMetrics {
    /// Creates zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful write.
    pub fn record_sent(&mut self, bytes: usize) {
        self.messages_sent = self.messages_sent.saturating_add(1);
        self.bytes_sent = self.bytes_sent.saturating_add(bytes as u64);
        self.touch();
    }

    /// Records a successful read.
    pub fn record_received(&mut self, bytes: usize) {
        self.messages_received = self.messages_received.saturating_add(1);
        self.bytes_received = self.bytes_received.saturating_add(bytes as u64);
        self.touch();
    }

    /// Updates the average latency using an exponential moving average.
    pub fn record_latency(&mut self, latency: Duration) {
        let latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.avg_latency_us = if self.avg_latency_us == 0 {
            latency_us
        } else {
            // alpha = 0.1
            self.avg_latency_us
                .saturating_mul(9)
                .saturating_add(latency_us)
                / 10
        };
    }

    /// Marks activity now.
    pub fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }

    /// Average latency.
    pub fn average_latency(&self) -> Duration {
        Duration::from_micros(self.avg_latency_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_default() {
        let metrics = SessionMetrics::new();
        assert_eq!(metrics.connections, 0);
        assert_eq!(metrics.messages_sent, 0);
        assert!(metrics.last_activity.is_none());
    }

    #[test]
    fn test_record_traffic() {
        let mut metrics = SessionMetrics::new();
        metrics.record_sent(4);
        metrics.record_received(8);
        metrics.record_received(2);

        assert_eq!(metrics.messages_sent, 1);
        assert_eq!(metrics.bytes_sent, 4);
        assert_eq!(metrics.messages_received, 2);
        assert_eq!(metrics.bytes_received, 10);
        assert!(metrics.last_activity.is_some());
    }

    #[test]
    fn test_latency_ema() {
        let mut metrics = SessionMetrics::new();
        metrics.record_latency(Duration::from_micros(1000));
        assert_eq!(metrics.avg_latency_us, 1000);
        metrics.record_latency(Duration::from_micros(2000));
        assert_eq!(metrics.avg_latency_us, 1100);
    }

    #[test]
    fn test_ema_overflow_protection() {
        let mut metrics = SessionMetrics::new();
        for _ in 0..100 {
            metrics.record_latency(Duration::MAX);
        }
        // Saturates instead of overflowing.
        assert_eq!(metrics.avg_latency_us, u64::MAX / 10);
    }
}
