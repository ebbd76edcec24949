//! ---
//! simgpu_section: "03-logging-metrics"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Metrics collection and export utilities."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Shared registry type used across the workspace.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render every family in the registry using the Prometheus text format.
pub fn render_text(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metrics")
}

/// Metrics recorded by the bring-up orchestrator and lifecycle controller.
#[derive(Clone, Debug)]
pub struct DeviceMetrics {
    registry: SharedRegistry,
    bring_up_total: IntCounterVec,
    rollbacks_total: IntCounterVec,
    stage_releases_total: IntCounterVec,
    release_faults_total: IntCounterVec,
    flush_iterations: Histogram,
    flush_timeouts_total: IntCounter,
    teardowns_total: IntCounter,
}

impl DeviceMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let bring_up_total = IntCounterVec::new(
            Opts::new(
                "simgpu_bring_up_total",
                "Bring-up attempts partitioned by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(bring_up_total.clone()))?;

        let rollbacks_total = IntCounterVec::new(
            Opts::new(
                "simgpu_rollbacks_total",
                "Bring-up rollbacks partitioned by the stage whose acquire failed",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(rollbacks_total.clone()))?;

        let stage_releases_total = IntCounterVec::new(
            Opts::new(
                "simgpu_stage_releases_total",
                "Stage releases performed during rollback or teardown",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(stage_releases_total.clone()))?;

        let release_faults_total = IntCounterVec::new(
            Opts::new(
                "simgpu_release_faults_total",
                "Stage releases that reported a fault and were pushed through",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(release_faults_total.clone()))?;

        let buckets = prometheus::exponential_buckets(1.0, 2.0, 12)
            .context("failed to construct histogram buckets")?;
        let flush_iterations = Histogram::with_opts(
            HistogramOpts::new(
                "simgpu_flush_iterations",
                "Convergence-loop iterations needed per flush",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(flush_iterations.clone()))?;

        let flush_timeouts_total = IntCounter::with_opts(Opts::new(
            "simgpu_flush_timeouts_total",
            "Flushes that gave up before outstanding work retired",
        ))?;
        registry.register(Box::new(flush_timeouts_total.clone()))?;

        let teardowns_total = IntCounter::with_opts(Opts::new(
            "simgpu_teardowns_total",
            "Completed device teardowns",
        ))?;
        registry.register(Box::new(teardowns_total.clone()))?;

        Ok(Self {
            registry,
            bring_up_total,
            rollbacks_total,
            stage_releases_total,
            release_faults_total,
            flush_iterations,
            flush_timeouts_total,
            teardowns_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_bring_up(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.bring_up_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_rollback(&self, stage: &str) {
        self.rollbacks_total.with_label_values(&[stage]).inc();
    }

    pub fn record_release(&self, stage: &str, faulted: bool) {
        self.stage_releases_total.with_label_values(&[stage]).inc();
        if faulted {
            self.release_faults_total.with_label_values(&[stage]).inc();
        }
    }

    pub fn observe_flush(&self, iterations: u64, timed_out: bool) {
        self.flush_iterations.observe(iterations as f64);
        if timed_out {
            self.flush_timeouts_total.inc();
        }
    }

    pub fn record_teardown(&self) {
        self.teardowns_total.inc();
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_render_after_first_observation() {
        let registry = new_registry();
        let metrics = DeviceMetrics::new(registry.clone()).expect("metrics register");
        metrics.record_bring_up(false);
        metrics.record_rollback("scheduler");
        metrics.record_release("workqueue", true);
        metrics.observe_flush(3, false);
        metrics.record_teardown();

        let text = render_text(&registry).expect("render");
        assert!(text.contains("simgpu_bring_up_total{outcome=\"failure\"} 1"));
        assert!(text.contains("simgpu_rollbacks_total{stage=\"scheduler\"} 1"));
        assert!(text.contains("simgpu_release_faults_total{stage=\"workqueue\"} 1"));
        assert!(text.contains("simgpu_flush_iterations_count 1"));
        assert!(text.contains("simgpu_teardowns_total 1"));
    }

    #[test]
    fn handle_registry_is_the_one_registered_into() {
        let metrics = DeviceMetrics::new(new_registry()).expect("metrics register");
        metrics.record_bring_up(true);

        let text = render_text(&metrics.registry()).expect("render");
        assert!(text.contains("simgpu_bring_up_total{outcome=\"success\"} 1"));
    }

    #[test]
    fn double_registration_is_rejected() {
        let registry = new_registry();
        DeviceMetrics::new(registry.clone()).expect("first registration");
        assert!(DeviceMetrics::new(registry).is_err());
    }
}
