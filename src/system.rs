//! Host telemetry capability for the cpu/memory trend metrics.
//!
//! The default provider draws uniform placeholder samples, preserving the
//! original scenario's behavior; the values carry no diagnostic meaning. A
//! real provider (procfs, sysinfo) can be slotted in behind the same trait
//! without touching the scenario.

use rand::Rng;

#[cfg_attr(test, mockall::automock)]
pub trait SystemMetricsProvider: Send + Sync {
    /// CPU load sample in percent, [0, 100).
    fn cpu_percent(&self) -> f64;
    /// Memory usage sample in megabytes, [0, 1024).
    fn memory_mb(&self) -> f64;
}

/// Placeholder provider: uniform random samples, NOT real measurements.
pub struct RandomTelemetry;

impl SystemMetricsProvider for RandomTelemetry {
    fn cpu_percent(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..100.0)
    }

    fn memory_mb(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..1024.0)
    }
}
