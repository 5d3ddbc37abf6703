use anyhow::Result;
use kb_load_runner::{config, scheduler, system, telemetry, thresholds};
use config::Config;
use kb_load_runner::metrics::{MetricRegistry, MetricSink};
use kb_load_runner::scenario::KnowledgeBaseScenario;
use scheduler::Scheduler;
use std::sync::Arc;
use system::RandomTelemetry;
use telemetry::init_tracing;
use thresholds::{default_thresholds, ThresholdEvaluator};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    if cfg.api_token.is_empty() {
        warn!("API_TOKEN is not set; per-iteration diagnostics will echo an empty token");
    }

    let registry = Arc::new(MetricRegistry::new());
    let scenario = Arc::new(KnowledgeBaseScenario::new(&cfg, Arc::new(RandomTelemetry))?);
    let scheduler = Scheduler::from_config(&cfg.load.stages);

    let started_at = chrono::Utc::now();
    info!(
        url = %cfg.target.url,
        stages = cfg.load.stages.len(),
        total_secs = scheduler.total_duration().as_secs(),
        "starting knowledge-base load run"
    );

    let outcome = tokio::select! {
        outcome = scheduler.run(scenario, Arc::clone(&registry) as Arc<dyn MetricSink>) => Some(outcome),
        _ = telemetry::shutdown_signal() => {
            warn!("run interrupted; evaluating thresholds over the partial run");
            None
        }
    };

    let snapshot = registry.snapshot();
    let report = ThresholdEvaluator::check(&snapshot, &default_thresholds());

    if let Some(outcome) = &outcome {
        info!(
            peak_vus = outcome.peak_vus,
            wall_secs = outcome.wall.as_secs(),
            iterations_aborted = outcome.iterations_aborted,
            "run complete"
        );
    }

    info!(
        started_at = %started_at.to_rfc3339(),
        summary = %serde_json::to_string(&snapshot)?,
        "metric summary"
    );

    for check in snapshot.checks.iter() {
        info!(check = %check.0, passes = check.1.passes, fails = check.1.fails, "check summary");
    }

    for t in &report.outcomes {
        if t.passed {
            info!(metric = %t.metric, condition = %t.condition, observed = ?t.observed, "threshold ok");
        } else {
            error!(metric = %t.metric, condition = %t.condition, observed = ?t.observed, "threshold breached");
        }
    }

    if !report.passed() {
        anyhow::bail!("run failed: {} threshold(s) breached", report.breaches().count());
    }

    info!("all thresholds passed");
    Ok(())
}
