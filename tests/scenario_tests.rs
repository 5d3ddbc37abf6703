//! End-to-end tests of the knowledge-base scenario against a stubbed HTTP
//! endpoint, covering the per-iteration metric bookkeeping and the host's
//! scheduler/threshold path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kb_load_runner::config::{Config, LoadConfig, StageConfig, TargetConfig};
use kb_load_runner::metrics::{names, MetricRegistry, MetricSink, MetricSnapshot};
use kb_load_runner::scenario::{KnowledgeBaseScenario, Scenario, CHECK_LATENCY, CHECK_STATUS};
use kb_load_runner::scheduler::Scheduler;
use kb_load_runner::system::SystemMetricsProvider;
use kb_load_runner::thresholds::{default_thresholds, ThresholdEvaluator};

struct FixedTelemetry;

impl SystemMetricsProvider for FixedTelemetry {
    fn cpu_percent(&self) -> f64 {
        50.0
    }
    fn memory_mb(&self) -> f64 {
        512.0
    }
}

fn test_config(url: &str, pause_seconds: u64) -> Config {
    Config {
        api_token: "secret-token".into(),
        org_name: "seven-targets".into(),
        target: TargetConfig {
            url: url.to_string(),
            request_timeout_seconds: 5,
        },
        load: LoadConfig {
            stages: vec![StageConfig { duration_seconds: 2, target: 2 }],
            iteration_pause_seconds: pause_seconds,
        },
    }
}

fn scenario_for(url: &str, pause_seconds: u64) -> KnowledgeBaseScenario {
    KnowledgeBaseScenario::new(&test_config(url, pause_seconds), Arc::new(FixedTelemetry))
        .expect("scenario builds")
}

fn per_iteration_sample_count(snapshot: &MetricSnapshot) -> Vec<(&'static str, usize)> {
    [
        names::RESPONSE_TIME_MS,
        names::STABILITY_CHECK,
        names::CPU_USAGE,
        names::MEMORY_USAGE,
    ]
    .iter()
    .map(|name| (*name, snapshot.trends.get(*name).map_or(0, |t| t.count)))
    .collect()
}

#[tokio::test]
async fn successful_iteration_records_one_sample_per_metric() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let scenario = scenario_for(&server.uri(), 0);
    let registry = MetricRegistry::new();
    scenario.run_iteration(&registry).await.expect("iteration ok");

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.counter(names::REQUEST_COUNT), 1);
    for (name, count) in per_iteration_sample_count(&snapshot) {
        assert_eq!(count, 1, "{name} should record exactly one sample");
    }
    assert_eq!(snapshot.trends[names::HTTP_REQ_DURATION].count, 1);

    // Both checks passed, so success/error rates are exact complements.
    assert_eq!(snapshot.rates[names::SUCCESS_RATE].passes, 1);
    assert_eq!(snapshot.rates[names::ERROR_RATE].passes, 0);
    assert_eq!(snapshot.rates[names::ERROR_RATE].count, 1);
    assert_eq!(snapshot.counter(names::ERROR_COUNT), 0);

    assert_eq!(snapshot.checks[CHECK_STATUS].passes, 1);
    assert_eq!(snapshot.checks[CHECK_LATENCY].passes, 1);

    // The stability trend duplicates the response-time sample.
    assert_eq!(
        snapshot.trends[names::STABILITY_CHECK].avg,
        snapshot.trends[names::RESPONSE_TIME_MS].avg
    );
}

#[tokio::test]
async fn non_200_status_fails_only_the_status_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let scenario = scenario_for(&server.uri(), 0);
    let registry = MetricRegistry::new();
    scenario.run_iteration(&registry).await.expect("iteration ok");

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.checks[CHECK_STATUS].fails, 1);
    assert_eq!(snapshot.checks[CHECK_LATENCY].passes, 1, "fast response still passes latency");

    // One failed check fails the whole iteration.
    assert_eq!(snapshot.rates[names::SUCCESS_RATE].passes, 0);
    assert_eq!(snapshot.rates[names::ERROR_RATE].passes, 1);
    assert_eq!(snapshot.counter(names::ERROR_COUNT), 1);
    assert_eq!(snapshot.counter(names::REQUEST_COUNT), 1);
}

#[tokio::test]
async fn slow_200_fails_only_the_latency_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(600)))
        .mount(&server)
        .await;

    let scenario = scenario_for(&server.uri(), 0);
    let registry = MetricRegistry::new();
    scenario.run_iteration(&registry).await.expect("iteration ok");

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.checks[CHECK_STATUS].passes, 1);
    assert_eq!(snapshot.checks[CHECK_LATENCY].fails, 1);
    assert_eq!(snapshot.rates[names::SUCCESS_RATE].passes, 0);
    assert_eq!(snapshot.counter(names::ERROR_COUNT), 1);
    assert!(snapshot.trends[names::RESPONSE_TIME_MS].min >= 600.0);
}

#[tokio::test]
async fn transport_failure_propagates_and_records_nothing() {
    // Bind and immediately drop a listener so the port refuses connections.
    let refused = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        format!("http://{}/", listener.local_addr().expect("addr"))
    };

    let scenario = scenario_for(&refused, 0);
    let registry = MetricRegistry::new();
    let result = scenario.run_iteration(&registry).await;

    assert!(result.is_err(), "refused connection must propagate");
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.counter(names::REQUEST_COUNT), 0);
    assert!(snapshot.trends.is_empty());
    assert!(snapshot.rates.is_empty());
}

#[tokio::test]
async fn rates_stay_exact_complements_across_iterations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let scenario = scenario_for(&server.uri(), 0);
    let registry = MetricRegistry::new();
    for _ in 0..5 {
        scenario.run_iteration(&registry).await.expect("iteration ok");
    }

    let snapshot = registry.snapshot();
    let success = &snapshot.rates[names::SUCCESS_RATE];
    let error = &snapshot.rates[names::ERROR_RATE];
    assert_eq!(snapshot.counter(names::REQUEST_COUNT), 5);
    assert_eq!(success.count, 5);
    assert_eq!(error.count, 5);
    assert_eq!(success.passes + error.passes, 5);
}

#[tokio::test]
async fn iteration_pause_bounds_per_user_throughput() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let scenario = scenario_for(&server.uri(), 1);
    let registry = MetricRegistry::new();

    let started = Instant::now();
    scenario.run_iteration(&registry).await.expect("iteration ok");
    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "each iteration must include the full think-time pause"
    );
}

#[tokio::test]
async fn full_run_against_healthy_endpoint_passes_all_thresholds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let cfg = test_config(&server.uri(), 0);
    let registry = Arc::new(MetricRegistry::new());
    let scenario: Arc<dyn Scenario> =
        Arc::new(KnowledgeBaseScenario::new(&cfg, Arc::new(FixedTelemetry)).expect("scenario"));
    let scheduler = Scheduler::from_config(&cfg.load.stages);

    let outcome = scheduler
        .run(scenario, Arc::clone(&registry) as Arc<dyn MetricSink>)
        .await;
    assert_eq!(outcome.iterations_aborted, 0);

    let snapshot = registry.snapshot();
    let total = snapshot.counter(names::REQUEST_COUNT);
    assert!(total > 0, "virtual users should have issued requests");

    // Every per-iteration metric carries exactly one sample per request.
    assert_eq!(snapshot.trends[names::RESPONSE_TIME_MS].count as u64, total);
    assert_eq!(snapshot.trends[names::STABILITY_CHECK].count as u64, total);
    assert_eq!(snapshot.rates[names::SUCCESS_RATE].count, total);
    assert_eq!(snapshot.rates[names::ERROR_RATE].count, total);
    assert!(snapshot.counter(names::ERROR_COUNT) <= total);

    let report = ThresholdEvaluator::check(&snapshot, &default_thresholds());
    assert!(report.passed(), "healthy endpoint must satisfy every threshold");
}
