//! ---
//! simgpu_section: "15-testing-qa-runbook"
//! simgpu_subsection: "integration-tests"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Integration and validation tests for the simgpu workspace."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::time::Duration;

use simgpu_common::DeviceConfig;
use simgpu_core::{BringUpError, FlushError, FlushTimeout, StageId};
use simgpu_metrics::{new_registry, render_text, DeviceMetrics};
use simgpu_mock::{bring_up_mock, run_workload, MockEngine, DECLARED_ORDER};

fn repo_path(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(path)
}

fn shipped_config() -> DeviceConfig {
    DeviceConfig::from_path(&repo_path("configs/simgpu.toml")).expect("shipped config parses")
}

#[test]
fn shipped_config_describes_three_engines() {
    let config = shipped_config();
    let names: Vec<_> = config.engines.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["rcs0", "bcs0", "vcs0"]);
    assert_eq!(config.flush.timeout, None, "final flush waits as long as needed");
    assert_eq!(config.flush.teardown_timeout, Some(Duration::from_secs(5)));
}

#[test]
fn full_lifecycle_with_concurrent_producers() {
    simgpu_logging::init_for_tests();
    let config = shipped_config();
    let registry = new_registry();
    let metrics = DeviceMetrics::new(registry.clone()).expect("metrics");
    let mut handle = bring_up_mock(&config, Some(metrics)).expect("bring-up");
    assert_eq!(handle.declared_stages(), DECLARED_ORDER.to_vec());

    let report =
        run_workload(&handle, &config.workload, FlushTimeout::Unbounded).expect("workload");
    assert_eq!(report.submitted, config.workload.requests as u64);

    // Nothing is left, so further flushes converge without iterating.
    for _ in 0..3 {
        let flushed = handle.flush(Duration::ZERO).expect("idle flush");
        assert_eq!(flushed.iterations, 0);
    }

    let engines = handle.engines();
    handle.destroy();
    handle.destroy();
    assert!(handle.is_released());
    assert!(!handle.wakeref_held());
    assert_eq!(handle.flush(FlushTimeout::Unbounded), Err(FlushError::Released));
    for engine in &engines {
        let engine = engine.as_any().downcast_ref::<MockEngine>().expect("mock engine");
        assert_eq!(engine.completed(), engine.submitted());
    }

    let text = render_text(&registry).expect("render");
    assert!(text.contains("simgpu_teardowns_total 1"));
    for stage in DECLARED_ORDER {
        assert!(text.contains(&format!("simgpu_stage_releases_total{{stage=\"{}\"}} 1", stage)));
    }
}

#[test]
fn failure_midway_reports_the_committed_prefix() {
    let mut config = shipped_config();
    config.faults.fail_stage = Some("gem_mm".to_owned());
    let err = bring_up_mock(&config, None).expect_err("injected failure");
    let Some(BringUpError::StageAcquire {
        stage, committed, ..
    }) = err.downcast_ref::<BringUpError>()
    else {
        panic!("unexpected error: {err:#}");
    };
    assert_eq!(*stage, StageId::new("gem_mm"));
    let names: Vec<&str> = committed.iter().map(|stage| stage.as_str()).collect();
    assert_eq!(
        names,
        [
            "host_registration",
            "power_domain",
            "params",
            "uncore",
            "wakeref",
            "mode_config",
            "workqueue",
            "memory_regions",
            "gt_probe",
            "scheduler",
        ]
    );
}

#[test]
fn dropping_an_active_device_tears_it_down() {
    let registry = new_registry();
    let metrics = DeviceMetrics::new(registry.clone()).expect("metrics");
    let handle = bring_up_mock(&shipped_config(), Some(metrics)).expect("bring-up");
    let engines = handle.engines();
    drop(handle);
    let text = render_text(&registry).expect("render");
    assert!(text.contains("simgpu_teardowns_total 1"));
    let engine = engines[0].as_any().downcast_ref::<MockEngine>().expect("mock engine");
    assert!(!engine.is_registered());
}
