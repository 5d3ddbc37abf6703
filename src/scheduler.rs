//! Staged virtual-user scheduler.
//!
//! A supervisor loop ticks once per second, interpolates the current target
//! concurrency from the stage schedule, and spawns or retires virtual-user
//! tasks to match. Each virtual user loops the scenario until retired;
//! retirement is cooperative, checked between iterations, so an in-flight
//! iteration is never aborted.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::StageConfig;
use crate::metrics::MetricSink;
use crate::scenario::Scenario;

/// One time-boxed concurrency target. Within a stage the target ramps
/// linearly from the previous stage's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl From<&StageConfig> for Stage {
    fn from(cfg: &StageConfig) -> Self {
        Self {
            duration: Duration::from_secs(cfg.duration_seconds),
            target: cfg.target,
        }
    }
}

/// Target virtual-user count at `elapsed` into the schedule. Ramps
/// interpolate linearly; past the last stage the target is the final
/// stage's target.
pub fn target_at(stages: &[Stage], elapsed: Duration) -> u32 {
    let mut stage_start = Duration::ZERO;
    let mut previous_target = 0u32;

    for stage in stages {
        let stage_end = stage_start + stage.duration;
        if elapsed < stage_end {
            if stage.duration.is_zero() {
                return stage.target;
            }
            let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
            let from = previous_target as f64;
            let to = stage.target as f64;
            return (from + (to - from) * progress).round() as u32;
        }
        stage_start = stage_end;
        previous_target = stage.target;
    }

    previous_target
}

/// Result of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    /// Iterations that ended in an uncaught transport failure. These never
    /// reached the scenario's metric-recording path.
    pub iterations_aborted: u64,
    pub peak_vus: u32,
    pub wall: Duration,
}

struct VirtualUser {
    stop: watch::Sender<bool>,
    handle: JoinHandle<u64>,
}

pub struct Scheduler {
    stages: Vec<Stage>,
}

impl Scheduler {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn from_config(stages: &[StageConfig]) -> Self {
        Self::new(stages.iter().map(Stage::from).collect())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Drive the full stage schedule to completion, then drain every
    /// virtual user. Returns once the last in-flight iteration finishes.
    pub async fn run(
        &self,
        scenario: Arc<dyn Scenario>,
        sink: Arc<dyn MetricSink>,
    ) -> RunOutcome {
        let total = self.total_duration();
        let started = Instant::now();
        let mut active: Vec<VirtualUser> = Vec::new();
        let mut retired: Vec<JoinHandle<u64>> = Vec::new();
        let mut peak_vus = 0u32;
        let mut next_vu_id = 0u32;

        let mut tick = interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;
            let elapsed = started.elapsed();
            if elapsed >= total {
                break;
            }

            let target = target_at(&self.stages, elapsed) as usize;
            if target != active.len() {
                debug!(
                    elapsed_secs = elapsed.as_secs(),
                    target,
                    active = active.len(),
                    "adjusting virtual users"
                );
            }

            while active.len() < target {
                next_vu_id += 1;
                active.push(spawn_virtual_user(
                    next_vu_id,
                    Arc::clone(&scenario),
                    Arc::clone(&sink),
                ));
            }
            while active.len() > target {
                if let Some(vu) = active.pop() {
                    let _ = vu.stop.send(true);
                    retired.push(vu.handle);
                }
            }

            peak_vus = peak_vus.max(active.len() as u32);
        }

        info!(vus = active.len(), "stage schedule complete, draining");
        for vu in &active {
            let _ = vu.stop.send(true);
        }
        retired.extend(active.into_iter().map(|vu| vu.handle));

        let mut iterations_aborted = 0u64;
        for joined in join_all(retired).await {
            match joined {
                Ok(aborted) => iterations_aborted += aborted,
                Err(e) => error!(error = %e, "virtual user task panicked"),
            }
        }

        RunOutcome {
            iterations_aborted,
            peak_vus,
            wall: started.elapsed(),
        }
    }
}

fn spawn_virtual_user(
    id: u32,
    scenario: Arc<dyn Scenario>,
    sink: Arc<dyn MetricSink>,
) -> VirtualUser {
    let (stop, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut aborted = 0u64;
        while !*stop_rx.borrow() {
            if let Err(e) = scenario.run_iteration(sink.as_ref()).await {
                aborted += 1;
                error!(vu = id, error = %e, "iteration aborted");
            }
        }
        debug!(vu = id, "virtual user retired");
        aborted
    });
    VirtualUser { stop, handle }
}
