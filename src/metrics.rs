//! In-process metric aggregation for a single load run.
//!
//! Three metric kinds mirror the usual load-testing vocabulary: a `Trend`
//! keeps every numeric sample for percentile analysis, a `Rate` tallies
//! boolean pass/fail samples, and a `Counter` is a monotonic total. Named
//! checks are tallied separately so the end-of-run report can list each
//! check's pass/fail counts next to the metrics.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

/// Well-known metric names recorded by the scenario and the host.
pub mod names {
    pub const RESPONSE_TIME_MS: &str = "response_time_ms";
    pub const ERROR_RATE: &str = "error_rate";
    pub const REQUEST_COUNT: &str = "request_count";
    pub const SUCCESS_RATE: &str = "success_rate";
    pub const MEMORY_USAGE: &str = "memory_usage";
    pub const CPU_USAGE: &str = "cpu_usage";
    pub const ERROR_COUNT: &str = "error_count";
    pub const STABILITY_CHECK: &str = "stability_check";
    /// Built-in request-duration trend recorded by the host for every
    /// request, independently of the scenario's custom trend.
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
}

/// Append-only sink for metric samples. Safe for concurrent writers from
/// independent virtual users; no ordering guarantee between them.
pub trait MetricSink: Send + Sync {
    fn record_trend(&self, name: &str, value: f64);
    fn record_rate(&self, name: &str, pass: bool);
    fn increment(&self, name: &str, by: u64);
    fn record_check(&self, name: &str, pass: bool);
}

enum MetricValue {
    Trend(Vec<f64>),
    Rate { passes: u64, count: u64 },
    Counter(u64),
}

impl MetricValue {
    fn kind(&self) -> &'static str {
        match self {
            MetricValue::Trend(_) => "trend",
            MetricValue::Rate { .. } => "rate",
            MetricValue::Counter(_) => "counter",
        }
    }
}

#[derive(Default)]
struct CheckTally {
    passes: u64,
    fails: u64,
}

/// In-memory registry backing [`MetricSink`] for the whole run.
///
/// Samples only live until the end-of-run snapshot; nothing is persisted.
#[derive(Default)]
pub struct MetricRegistry {
    metrics: RwLock<BTreeMap<String, MetricValue>>,
    checks: RwLock<BTreeMap<String, CheckTally>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out aggregated views of every metric recorded so far.
    pub fn snapshot(&self) -> MetricSnapshot {
        let metrics = self.metrics.read();
        let mut trends = BTreeMap::new();
        let mut rates = BTreeMap::new();
        let mut counters = BTreeMap::new();

        for (name, value) in metrics.iter() {
            match value {
                MetricValue::Trend(samples) => {
                    trends.insert(name.clone(), TrendSummary::from_samples(samples));
                }
                MetricValue::Rate { passes, count } => {
                    rates.insert(
                        name.clone(),
                        RateSummary {
                            passes: *passes,
                            count: *count,
                            rate: if *count == 0 {
                                0.0
                            } else {
                                *passes as f64 / *count as f64
                            },
                        },
                    );
                }
                MetricValue::Counter(total) => {
                    counters.insert(name.clone(), *total);
                }
            }
        }
        drop(metrics);

        let checks = self
            .checks
            .read()
            .iter()
            .map(|(name, tally)| {
                (
                    name.clone(),
                    CheckSummary {
                        passes: tally.passes,
                        fails: tally.fails,
                    },
                )
            })
            .collect();

        MetricSnapshot {
            trends,
            rates,
            counters,
            checks,
        }
    }

    fn kind_mismatch(name: &str, existing: &MetricValue, wanted: &'static str) {
        tracing::warn!(
            metric = name,
            existing = existing.kind(),
            wanted,
            "metric recorded with conflicting kind; sample dropped"
        );
    }
}

impl MetricSink for MetricRegistry {
    fn record_trend(&self, name: &str, value: f64) {
        let mut metrics = self.metrics.write();
        match metrics
            .entry(name.to_string())
            .or_insert_with(|| MetricValue::Trend(Vec::new()))
        {
            MetricValue::Trend(samples) => samples.push(value),
            other => Self::kind_mismatch(name, other, "trend"),
        }
    }

    fn record_rate(&self, name: &str, pass: bool) {
        let mut metrics = self.metrics.write();
        match metrics
            .entry(name.to_string())
            .or_insert_with(|| MetricValue::Rate { passes: 0, count: 0 })
        {
            MetricValue::Rate { passes, count } => {
                *count += 1;
                if pass {
                    *passes += 1;
                }
            }
            other => Self::kind_mismatch(name, other, "rate"),
        }
    }

    fn increment(&self, name: &str, by: u64) {
        let mut metrics = self.metrics.write();
        match metrics
            .entry(name.to_string())
            .or_insert_with(|| MetricValue::Counter(0))
        {
            MetricValue::Counter(total) => *total += by,
            other => Self::kind_mismatch(name, other, "counter"),
        }
    }

    fn record_check(&self, name: &str, pass: bool) {
        let mut checks = self.checks.write();
        let tally = checks.entry(name.to_string()).or_default();
        if pass {
            tally.passes += 1;
        } else {
            tally.fails += 1;
        }
    }
}

/// Aggregates of one trend metric.
#[derive(Debug, Clone, Serialize)]
pub struct TrendSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl TrendSummary {
    fn from_samples(samples: &[f64]) -> Self {
        debug_assert!(!samples.is_empty(), "trends are created on first sample");
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            avg: sum / count as f64,
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        }
    }
}

/// Nearest-rank percentile over pre-sorted samples.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug, Clone, Serialize)]
pub struct RateSummary {
    pub passes: u64,
    pub count: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub passes: u64,
    pub fails: u64,
}

/// Owned end-of-run view of every metric, consumed by the threshold
/// evaluator and the final report.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub trends: BTreeMap<String, TrendSummary>,
    pub rates: BTreeMap<String, RateSummary>,
    pub counters: BTreeMap<String, u64>,
    pub checks: BTreeMap<String, CheckSummary>,
}

impl MetricSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}
