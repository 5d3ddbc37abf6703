//! Declared pass/fail thresholds, evaluated once against the end-of-run
//! metric snapshot. A breached threshold marks the whole run failed but
//! never aborts in-flight work.

use serde::Serialize;
use std::fmt;

use crate::metrics::{names, MetricSnapshot, TrendSummary};

#[derive(Debug, Clone, Copy, Serialize)]
pub enum Quantile {
    P50,
    P90,
    P95,
    P99,
}

impl Quantile {
    fn of(&self, trend: &TrendSummary) -> f64 {
        match self {
            Quantile::P50 => trend.p50,
            Quantile::P90 => trend.p90,
            Quantile::P95 => trend.p95,
            Quantile::P99 => trend.p99,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Quantile::P50 => "p(50)",
            Quantile::P90 => "p(90)",
            Quantile::P95 => "p(95)",
            Quantile::P99 => "p(99)",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum Condition {
    /// Trend percentile strictly below a millisecond limit.
    PercentileBelow { quantile: Quantile, limit_ms: f64 },
    /// Rate strictly below a fraction.
    RateBelow(f64),
    /// Rate strictly above a fraction.
    RateAbove(f64),
    /// Counter total strictly below a count.
    CountBelow(u64),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::PercentileBelow { quantile, limit_ms } => {
                write!(f, "{}<{}", quantile.label(), limit_ms)
            }
            Condition::RateBelow(limit) => write!(f, "rate<{}", limit),
            Condition::RateAbove(limit) => write!(f, "rate>{}", limit),
            Condition::CountBelow(limit) => write!(f, "count<{}", limit),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Threshold {
    pub metric: String,
    pub condition: Condition,
}

impl Threshold {
    fn new(metric: &str, condition: Condition) -> Self {
        Self {
            metric: metric.to_string(),
            condition,
        }
    }
}

/// The run's service-level thresholds.
pub fn default_thresholds() -> Vec<Threshold> {
    use Condition::*;
    vec![
        Threshold::new(
            names::RESPONSE_TIME_MS,
            PercentileBelow { quantile: Quantile::P90, limit_ms: 500.0 },
        ),
        Threshold::new(
            names::RESPONSE_TIME_MS,
            PercentileBelow { quantile: Quantile::P95, limit_ms: 700.0 },
        ),
        Threshold::new(names::ERROR_RATE, RateBelow(0.05)),
        Threshold::new(names::SUCCESS_RATE, RateAbove(0.95)),
        Threshold::new(
            names::HTTP_REQ_DURATION,
            PercentileBelow { quantile: Quantile::P90, limit_ms: 500.0 },
        ),
        Threshold::new(
            names::HTTP_REQ_DURATION,
            PercentileBelow { quantile: Quantile::P95, limit_ms: 700.0 },
        ),
        Threshold::new(names::ERROR_COUNT, CountBelow(5)),
    ]
}

/// One evaluated threshold. `observed` is `None` when the metric recorded
/// no samples; such thresholds pass vacuously.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub condition: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdReport {
    pub outcomes: Vec<ThresholdOutcome>,
}

impl ThresholdReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn breaches(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}

pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    pub fn check(snapshot: &MetricSnapshot, thresholds: &[Threshold]) -> ThresholdReport {
        let outcomes = thresholds
            .iter()
            .map(|t| Self::check_one(snapshot, t))
            .collect();
        ThresholdReport { outcomes }
    }

    fn check_one(snapshot: &MetricSnapshot, threshold: &Threshold) -> ThresholdOutcome {
        let observed = match threshold.condition {
            Condition::PercentileBelow { quantile, .. } => snapshot
                .trends
                .get(&threshold.metric)
                .map(|trend| quantile.of(trend)),
            Condition::RateBelow(_) | Condition::RateAbove(_) => snapshot
                .rates
                .get(&threshold.metric)
                .map(|rate| rate.rate),
            Condition::CountBelow(_) => snapshot
                .counters
                .get(&threshold.metric)
                .map(|total| *total as f64),
        };

        let passed = match (observed, threshold.condition) {
            (None, _) => true,
            (Some(v), Condition::PercentileBelow { limit_ms, .. }) => v < limit_ms,
            (Some(v), Condition::RateBelow(limit)) => v < limit,
            (Some(v), Condition::RateAbove(limit)) => v > limit,
            (Some(v), Condition::CountBelow(limit)) => v < limit as f64,
        };

        ThresholdOutcome {
            metric: threshold.metric.clone(),
            condition: threshold.condition.to_string(),
            observed,
            passed,
        }
    }
}
