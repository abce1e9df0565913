//! Simulation metrics.

use std::collections::VecDeque;
use std::time::Duration;

use crate::workload::OperationKind;

/// Maximum latency samples to keep.
const MAX_SAMPLES: usize = 10_000;

/// Simulation metrics.
#[derive(Debug, Clone, Default)]
pub struct SimulationMetrics {
    /// Applied credits.
    pub credits: u64,
    /// Applied debits.
    pub debits: u64,
    /// Applied transfers.
    pub transfers: u64,
    /// Operations refused for insufficient funds.
    pub rejected: u64,
    /// Operations that failed in storage.
    pub failed: u64,
    /// Latency samples (µs).
    latency_samples: VecDeque<u64>,
}

impl SimulationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied operation.
    pub fn record_success(&mut self, kind: OperationKind, latency: Duration) {
        match kind {
            OperationKind::Credit => self.credits += 1,
            OperationKind::Debit => self.debits += 1,
            OperationKind::Transfer => self.transfers += 1,
        }
        self.sample(latency);
    }

    /// Record an insufficient-funds refusal.
    pub fn record_rejection(&mut self, latency: Duration) {
        self.rejected += 1;
        self.sample(latency);
    }

    /// Record a storage failure.
    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Fold another worker's metrics into these.
    pub fn merge(&mut self, other: &SimulationMetrics) {
        self.credits += other.credits;
        self.debits += other.debits;
        self.transfers += other.transfers;
        self.rejected += other.rejected;
        self.failed += other.failed;
        for &sample in &other.latency_samples {
            self.push_sample(sample);
        }
    }

    pub fn applied(&self) -> u64 {
        self.credits + self.debits + self.transfers
    }

    pub fn total(&self) -> u64 {
        self.applied() + self.rejected + self.failed
    }

    /// Get average latency in µs.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Operations per second over `elapsed`.
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }

        self.total() as f64 / secs
    }

    fn sample(&mut self, latency: Duration) {
        self.push_sample(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
    }

    fn push_sample(&mut self, micros: u64) {
        if self.latency_samples.len() >= MAX_SAMPLES {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(micros);
    }
}
