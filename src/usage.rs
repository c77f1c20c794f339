//! Request accounting: latency, tokens, estimated cost and error rate.
//!
//! Purely observational. `record` never blocks on I/O, never panics, and
//! never influences control flow.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// Weight kept from the previous rolling latency average.
const LATENCY_DECAY: f64 = 0.9;

/// Error rate above which the service is reported degraded.
const DEGRADED_ERROR_RATE: f64 = 0.1;

/// Error rate above which the service is reported unhealthy.
const UNHEALTHY_ERROR_RATE: f64 = 0.5;

/// Rolling latency above which the service is reported degraded.
const DEGRADED_LATENCY_MS: f64 = 10_000.0;

/// Per-model counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ModelUsage {
    pub request_count: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub error_count: u64,
}

/// Snapshot of the aggregate counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct UsageMetrics {
    pub request_count: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub error_count: u64,
    /// Exponentially weighted moving average; `None` until the first sample.
    pub rolling_average_latency_ms: Option<f64>,
    pub by_model: BTreeMap<String, ModelUsage>,
}

impl UsageMetrics {
    /// Fraction of recorded requests that failed. Zero when nothing was recorded.
    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.request_count as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub error_rate: f64,
    pub rolling_average_latency_ms: Option<f64>,
    pub request_count: u64,
}

#[derive(Default)]
pub struct UsageMonitor {
    inner: Mutex<UsageMetrics>,
}

impl UsageMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A panic elsewhere must not take accounting down with it.
    fn lock(&self) -> MutexGuard<'_, UsageMetrics> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, duration_ms: u64, tokens: u64, cost: f64, success: bool, model: &str) {
        let cost = if cost.is_finite() && cost > 0.0 { cost } else { 0.0 };
        let sample = duration_ms as f64;

        let mut m = self.lock();
        m.request_count = m.request_count.saturating_add(1);
        m.total_tokens = m.total_tokens.saturating_add(tokens);
        m.total_cost += cost;
        if !success {
            m.error_count = m.error_count.saturating_add(1);
        }
        m.rolling_average_latency_ms = Some(match m.rolling_average_latency_ms {
            None => sample,
            Some(avg) => LATENCY_DECAY * avg + (1.0 - LATENCY_DECAY) * sample,
        });

        let per_model = m.by_model.entry(model.to_string()).or_default();
        per_model.request_count = per_model.request_count.saturating_add(1);
        per_model.total_tokens = per_model.total_tokens.saturating_add(tokens);
        per_model.total_cost += cost;
        if !success {
            per_model.error_count = per_model.error_count.saturating_add(1);
        }
        drop(m);

        tracing::debug!(
            model = model,
            duration_ms = duration_ms,
            tokens = tokens,
            cost = cost,
            success = success,
            "usage recorded"
        );
    }

    pub fn snapshot(&self) -> UsageMetrics {
        self.lock().clone()
    }

    pub fn health(&self) -> HealthReport {
        let m = self.snapshot();
        let error_rate = m.error_rate();
        let slow = m
            .rolling_average_latency_ms
            .is_some_and(|avg| avg > DEGRADED_LATENCY_MS);

        let status = if error_rate > UNHEALTHY_ERROR_RATE {
            HealthStatus::Unhealthy
        } else if error_rate > DEGRADED_ERROR_RATE || slow {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            error_rate,
            rolling_average_latency_ms: m.rolling_average_latency_ms,
            request_count: m.request_count,
        }
    }

    /// Operator action: zero every counter.
    pub fn reset(&self) {
        *self.lock() = UsageMetrics::default();
        tracing::info!("usage metrics reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_sets_average_then_ewma() {
        let monitor = UsageMonitor::new();
        monitor.record(1000, 10, 0.01, true, "gpt-4o-mini");
        assert_eq!(monitor.snapshot().rolling_average_latency_ms, Some(1000.0));

        monitor.record(2000, 10, 0.01, true, "gpt-4o-mini");
        let avg = monitor.snapshot().rolling_average_latency_ms.unwrap();
        assert!((avg - 1100.0).abs() < 1e-9, "got {avg}");
    }

    #[test]
    fn error_rate_is_derived() {
        let monitor = UsageMonitor::new();
        assert_eq!(monitor.snapshot().error_rate(), 0.0);
        monitor.record(10, 0, 0.0, true, "a");
        monitor.record(10, 0, 0.0, false, "a");
        monitor.record(10, 0, 0.0, false, "b");
        monitor.record(10, 0, 0.0, true, "b");
        let m = monitor.snapshot();
        assert_eq!(m.error_count, 2);
        assert!((m.error_rate() - 0.5).abs() < 1e-9);
        assert_eq!(m.by_model["b"].error_count, 1);
    }

    #[test]
    fn hostile_inputs_do_not_corrupt_totals() {
        let monitor = UsageMonitor::new();
        monitor.record(u64::MAX, u64::MAX, f64::NAN, true, "");
        monitor.record(u64::MAX, u64::MAX, f64::INFINITY, false, "");
        monitor.record(0, 0, -3.0, true, "");
        let m = monitor.snapshot();
        assert_eq!(m.request_count, 3);
        assert_eq!(m.total_tokens, u64::MAX);
        assert_eq!(m.total_cost, 0.0);
    }

    #[test]
    fn health_thresholds() {
        let monitor = UsageMonitor::new();
        assert_eq!(monitor.health().status, HealthStatus::Healthy);

        for _ in 0..8 {
            monitor.record(100, 0, 0.0, true, "m");
        }
        monitor.record(100, 0, 0.0, false, "m");
        monitor.record(100, 0, 0.0, false, "m");
        assert_eq!(monitor.health().status, HealthStatus::Degraded);

        monitor.reset();
        monitor.record(100, 0, 0.0, false, "m");
        assert_eq!(monitor.health().status, HealthStatus::Unhealthy);
    }
}
