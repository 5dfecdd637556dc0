//! Engine configuration

use std::time::Duration;

/// Tuning knobs for one engine instance.
///
/// All three map directly onto the engine's threads: one reactor polling
/// with `poll_timeout`, `worker_count` consumers, and a dispatch queue of
/// `queue_capacity` readiness events between them. The queue bound is the
/// system's backpressure: when workers fall behind, the reactor stalls on
/// a full queue and stops polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bounded wait inside each poll call, in microseconds.
    pub poll_timeout_us: u64,

    /// Dispatch queue capacity (readiness events in flight).
    pub queue_capacity: usize,

    /// Number of worker threads consuming readiness events.
    pub worker_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_timeout_us: 10_000,
            queue_capacity: 1024,
            worker_count: 4,
        }
    }
}

impl EngineConfig {
    pub fn poll_timeout_us(mut self, us: u64) -> Self {
        self.poll_timeout_us = us;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Poll timeout as a `Duration`.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_micros(self.poll_timeout_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.poll_timeout(), Duration::from_millis(10));
        assert!(c.queue_capacity > 0);
        assert!(c.worker_count > 0);
    }

    #[test]
    fn test_builders() {
        let c = EngineConfig::default()
            .poll_timeout_us(500)
            .queue_capacity(2)
            .worker_count(1);
        assert_eq!(c.poll_timeout_us, 500);
        assert_eq!(c.queue_capacity, 2);
        assert_eq!(c.worker_count, 1);
    }

    #[test]
    fn test_queue_capacity_floor() {
        let c = EngineConfig::default().queue_capacity(0);
        assert_eq!(c.queue_capacity, 1);
    }
}
