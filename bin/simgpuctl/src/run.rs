//! ---
//! simgpu_section: "05-external-interfaces"
//! simgpu_subsection: "binary"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Control CLI for the simulated GPU device."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use simgpu_common::DeviceConfig;
use simgpu_core::FlushTimeout;
use simgpu_logging::{log_system_event, LogContext, SystemEventOutcome};
use simgpu_metrics::{new_registry, render_text, DeviceMetrics};
use simgpu_mock::{bring_up_mock, run_workload};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Device configuration file (TOML).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Total requests submitted across all producers.
    #[arg(long, value_name = "N")]
    pub requests: Option<usize>,

    /// Number of concurrent producer threads.
    #[arg(long, value_name = "N")]
    pub producers: Option<usize>,

    /// Bound for the final flush; waits as long as needed when omitted.
    #[arg(long = "flush-timeout-ms", value_name = "MS")]
    pub flush_timeout_ms: Option<u64>,

    /// Print the Prometheus exposition after teardown.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub metrics: bool,

    /// Emit the run summary as JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}

pub fn execute(args: RunArgs, mut config: DeviceConfig) -> Result<()> {
    if let Some(requests) = args.requests {
        config.workload.requests = requests;
    }
    if let Some(producers) = args.producers {
        config.workload.producers = producers;
    }
    let timeout = match args.flush_timeout_ms {
        Some(ms) => FlushTimeout::Within(Duration::from_millis(ms)),
        None => FlushTimeout::from(config.flush.timeout),
    };

    let metrics = if args.metrics {
        Some(DeviceMetrics::new(new_registry())?)
    } else {
        None
    };
    let registry = metrics.as_ref().map(DeviceMetrics::registry);

    let context = LogContext::new().with_device(&config.name);
    let mut handle = match bring_up_mock(&config, metrics) {
        Ok(handle) => handle,
        Err(err) => {
            log_system_event(
                Some(&context),
                "device.bring_up",
                &format!("{:#}", err),
                SystemEventOutcome::Fault,
            );
            return Err(err);
        }
    };
    log_system_event(
        Some(&context),
        "device.bring_up",
        "all stages committed",
        SystemEventOutcome::Success,
    );

    let report = run_workload(&handle, &config.workload, timeout)
        .with_context(|| format!("workload on device '{}' failed", config.name))?;
    let engines = handle.engines().len();
    handle.destroy();
    log_system_event(
        Some(&context),
        "device.destroy",
        "device released",
        SystemEventOutcome::Success,
    );

    if args.json {
        let summary = json!({
            "device": config.name,
            "engines": engines,
            "submitted": report.submitted,
            "rejected": report.rejected,
            "objects": report.objects,
            "object_faults": report.object_faults,
            "flushes": report.flushes,
            "flush_iterations": report.flush_iterations,
            "elapsed_ms": report.elapsed.as_millis() as u64,
            "released": handle.is_released(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Device: {}\nEngines: {}\nSubmitted: {}\nRejected: {}\nFlushes: {} ({} iterations)\nReleased: {}",
            config.name,
            engines,
            report.submitted,
            report.rejected,
            report.flushes,
            report.flush_iterations,
            handle.is_released()
        );
    }
    if let Some(registry) = &registry {
        print!("{}", render_text(registry)?);
    }
    Ok(())
}
