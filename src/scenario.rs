//! The knowledge-base GET scenario: one iteration of the load test.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::config::Config;
use crate::error::LoadError;
use crate::metrics::{names, MetricSink};
use crate::system::SystemMetricsProvider;

pub const CHECK_STATUS: &str = "status is 200";
pub const CHECK_LATENCY: &str = "response time below 500ms";

/// Response-time ceiling for the latency check, in milliseconds.
const LATENCY_LIMIT_MS: f64 = 500.0;

/// One unit of work executed repeatedly by each virtual user.
#[async_trait]
pub trait Scenario: Send + Sync + 'static {
    /// Run a single iteration, recording its outcome into `sink`.
    ///
    /// Check failures are recorded as metrics and return `Ok`; only
    /// transport-level failures return `Err`.
    async fn run_iteration(&self, sink: &dyn MetricSink) -> Result<(), LoadError>;
}

/// Issues one GET against the knowledge-base endpoint per iteration and
/// records the eight scenario metrics plus the host's built-in duration
/// trend. Iterations are stateless and independent.
pub struct KnowledgeBaseScenario {
    client: Client,
    url: String,
    api_token: String,
    org_name: String,
    iteration_pause: Duration,
    system: Arc<dyn SystemMetricsProvider>,
}

impl KnowledgeBaseScenario {
    pub fn new(cfg: &Config, system: Arc<dyn SystemMetricsProvider>) -> Result<Self, LoadError> {
        let client = Client::builder()
            .timeout(cfg.target.request_timeout())
            .build()
            .map_err(LoadError::ClientBuild)?;

        Ok(Self {
            client,
            url: cfg.target.url.clone(),
            api_token: cfg.api_token.clone(),
            org_name: cfg.org_name.clone(),
            iteration_pause: cfg.load.iteration_pause(),
            system,
        })
    }
}

#[async_trait]
impl Scenario for KnowledgeBaseScenario {
    async fn run_iteration(&self, sink: &dyn MetricSink) -> Result<(), LoadError> {
        let started = Instant::now();

        // No retries, no auth header; transport failures propagate uncaught.
        let response = self
            .client
            .get(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;
        let status = response.status();
        response.bytes().await?;

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        sink.increment(names::REQUEST_COUNT, 1);
        sink.record_trend(names::RESPONSE_TIME_MS, duration_ms);
        sink.record_trend(names::HTTP_REQ_DURATION, duration_ms);

        let status_ok = status == StatusCode::OK;
        let fast_enough = duration_ms < LATENCY_LIMIT_MS;
        sink.record_check(CHECK_STATUS, status_ok);
        sink.record_check(CHECK_LATENCY, fast_enough);

        // The iteration passes only if every check passed.
        let passed = status_ok && fast_enough;
        sink.record_rate(names::SUCCESS_RATE, passed);
        sink.record_rate(names::ERROR_RATE, !passed);
        if !passed {
            sink.increment(names::ERROR_COUNT, 1);
        }

        sink.record_trend(names::STABILITY_CHECK, duration_ms);
        sink.record_trend(names::CPU_USAGE, self.system.cpu_percent());
        sink.record_trend(names::MEMORY_USAGE, self.system.memory_mb());

        // Simulated user think time.
        tokio::time::sleep(self.iteration_pause).await;

        info!("API Token: {}", self.api_token);
        info!("Org Name: {}", self.org_name);

        Ok(())
    }
}
