use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::client::Operation;

#[derive(Default, Clone)]
pub struct Metrics {
    latencies: BTreeMap<Operation, Vec<Duration>>,
    failures: BTreeMap<Operation, u64>,
}

#[derive(Default, Clone)]
pub struct ConcurrentMetrics {
    metrics: Arc<Mutex<Metrics>>,
}

impl ConcurrentMetrics {
    pub async fn record(&self, operation: Operation, duration: Duration) {
        self.metrics.lock().await.record(operation, duration);
    }

    pub async fn record_failure(&self, operation: Operation) {
        self.metrics.lock().await.record_failure(operation);
    }

    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

/// Summary of one operation's latencies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub mean: f64,
}

impl Metrics {
    pub fn record(&mut self, operation: Operation, duration: Duration) {
        self.latencies.entry(operation).or_default().push(duration);
    }

    pub fn record_failure(&mut self, operation: Operation) {
        *self.failures.entry(operation).or_default() += 1;
    }

    pub fn total_operations(&self) -> u64 {
        self.latencies.values().map(|l| l.len() as u64).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn stats(&self, operation: Operation) -> Option<LatencyStats> {
        self.latencies
            .get(&operation)
            .and_then(|latencies| Self::calculate_stats(latencies))
    }

    fn format_duration(nanos: f64) -> String {
        if nanos < 1_000.0 {
            format!("{:.2} ns", nanos)
        } else if nanos < 1_000_000.0 {
            format!("{:.2} µs", nanos / 1_000.0)
        } else if nanos < 1_000_000_000.0 {
            format!("{:.2} ms", nanos / 1_000_000.0)
        } else {
            format!("{:.2} s", nanos / 1_000_000_000.0)
        }
    }

    fn calculate_stats(latencies: &[Duration]) -> Option<LatencyStats> {
        if latencies.is_empty() {
            return None;
        }

        let count = latencies.len() as u64;

        // Streaming mean avoids overflow on long runs
        let mut mean = 0.0;
        for (i, d) in latencies.iter().enumerate() {
            mean += (d.as_nanos() as f64 - mean) / (i + 1) as f64;
        }

        let mut sorted: Vec<_> = latencies.to_vec();
        sorted.sort_unstable();

        let at = |percent: u64| sorted[((count - 1) * percent / 100) as usize].as_nanos() as f64;

        Some(LatencyStats {
            count,
            min: sorted[0].as_nanos() as f64,
            max: sorted[sorted.len() - 1].as_nanos() as f64,
            p50: at(50),
            p95: at(95),
            p99: at(99),
            mean,
        })
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nDetailed Latency Statistics:")?;
        writeln!(
            f,
            "{:<15} {:<12} {:<12} {:<12} {:<12} {:<12} {:<12} {:<12}",
            "Operation", "Count", "Min", "Max", "Median", "P95", "P99", "Failed"
        )?;
        writeln!(f, "{:-<100}", "")?;

        for (operation, latencies) in &self.latencies {
            let Some(stats) = Self::calculate_stats(latencies) else {
                continue;
            };
            let failed = self.failures.get(operation).copied().unwrap_or(0);
            writeln!(
                f,
                "{:<15} {:<12} {:<12} {:<12} {:<12} {:<12} {:<12} {:<12}",
                operation.to_string(),
                stats.count,
                Self::format_duration(stats.min),
                Self::format_duration(stats.max),
                Self::format_duration(stats.p50),
                Self::format_duration(stats.p95),
                Self::format_duration(stats.p99),
                failed
            )?;
        }

        Ok(())
    }
}
