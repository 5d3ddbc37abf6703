pub mod config;
pub mod error;
pub mod metrics;
pub mod scenario;
pub mod scheduler;
pub mod system;
pub mod telemetry;
pub mod thresholds;

pub use config::Config;
pub use error::LoadError;
pub use metrics::{MetricRegistry, MetricSink, MetricSnapshot};
pub use scenario::{KnowledgeBaseScenario, Scenario};
pub use scheduler::{RunOutcome, Scheduler, Stage};
pub use thresholds::{ThresholdEvaluator, ThresholdReport};
