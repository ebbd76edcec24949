//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "integration-tests"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Flush convergence and teardown behaviour."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
mod support;

use std::sync::Arc;
use std::time::Duration;

use simgpu_core::{
    bring_up, DeviceBuilder, Engine, FlushError, FlushTimeout, Resource, StageId,
    MAX_SCHEDULE_TIMEOUT,
};
use simgpu_metrics::{new_registry, render_text, DeviceMetrics};
use support::{
    table, BusyEngine, CountdownScheduler, CountingEngine, Recorder, StuckScheduler,
};

const A: StageId = StageId::new("a");
const B: StageId = StageId::new("b");
const C: StageId = StageId::new("c");
const SCHED: StageId = StageId::new("sched");
const ENGINES: StageId = StageId::new("engines");

#[test]
fn destroy_twice_releases_once() {
    let recorder = Recorder::default();
    let mut handle = bring_up(table(&recorder, &[A, B, C], None)).expect("ok");

    handle.destroy();
    assert!(handle.is_released());
    assert_eq!(recorder.releases(), vec![C, B, A]);

    handle.destroy();
    assert_eq!(recorder.releases(), vec![C, B, A]);

    drop(handle);
    assert_eq!(recorder.releases(), vec![C, B, A]);
}

#[test]
fn rolled_back_device_is_never_released_again() {
    let recorder = Recorder::default();
    let err = bring_up(table(&recorder, &[A, B, C], Some(2))).expect_err("c fails");
    drop(err);
    assert_eq!(recorder.releases(), vec![B, A]);
}

#[test]
fn flush_after_destroy_reports_released() {
    let recorder = Recorder::default();
    let mut handle = bring_up(table(&recorder, &[A], None)).expect("ok");
    handle.destroy();
    assert_eq!(handle.flush(MAX_SCHEDULE_TIMEOUT), Err(FlushError::Released));
}

#[test]
fn flush_takes_one_iteration_per_retired_item() {
    let recorder = Recorder::default();
    let scheduler = CountdownScheduler::new(4);
    let engine = CountingEngine::new("rcs0");
    let (sched, eng) = (scheduler.clone(), engine.clone());
    let stages = vec![
        recorder.stage(A).boxed(),
        recorder
            .stage(SCHED)
            .providing(move || Resource::Scheduler(sched.clone()))
            .boxed(),
        recorder
            .stage(ENGINES)
            .providing(move || Resource::Engines(vec![eng.clone() as Arc<dyn Engine>]))
            .boxed(),
    ];
    let handle = bring_up(stages).expect("ok");

    let report = handle.flush(FlushTimeout::Unbounded).expect("converges");
    assert_eq!(report.iterations, 4);
    assert_eq!(scheduler.attempts(), 4);
    assert_eq!(engine.flushes(), 4);
    assert_eq!(scheduler.outstanding_now(), 0);

    let again = handle.flush(Duration::from_secs(1)).expect("still converges");
    assert_eq!(again.iterations, 0);
    assert_eq!(scheduler.attempts(), 4);
}

#[test]
fn flush_with_zero_timeout_and_nothing_outstanding_returns_immediately() {
    let scheduler = CountdownScheduler::new(0);
    let sched = scheduler.clone();
    let recorder = Recorder::default();
    let stages = vec![
        recorder.stage(A).boxed(),
        recorder.stage(B).boxed(),
        recorder
            .stage(C)
            .providing(move || Resource::Scheduler(sched.clone()))
            .boxed(),
    ];
    let handle = bring_up(stages).expect("ok");

    let report = handle.flush(Duration::ZERO).expect("nothing to wait for");
    assert_eq!(report.iterations, 0);
    assert_eq!(scheduler.attempts(), 0);
}

#[test]
fn flush_gives_up_at_the_deadline_and_leaves_device_usable() {
    let scheduler = StuckScheduler::new(3);
    let sched = scheduler.clone();
    let recorder = Recorder::default();
    let stages = vec![
        recorder.stage(A).boxed(),
        recorder
            .stage(SCHED)
            .providing(move || Resource::Scheduler(sched.clone()))
            .boxed(),
    ];
    let mut handle = DeviceBuilder::new("stuck")
        .with_teardown_timeout(Duration::from_millis(10))
        .bring_up(stages)
        .expect("ok");

    let timeout = Duration::from_millis(30);
    match handle.flush(timeout) {
        Err(FlushError::Timeout {
            waited,
            outstanding,
            iterations,
        }) => {
            assert!(waited >= timeout);
            assert_eq!(outstanding, 3);
            assert!(iterations >= 1);
            assert_eq!(iterations as usize, scheduler.attempts());
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(handle.is_usable());
    assert!(!handle.is_released());

    handle.destroy();
    assert!(handle.is_released());
    assert_eq!(recorder.releases(), vec![SCHED, A]);
}

#[test]
fn flush_times_out_while_an_engine_stays_busy() {
    let scheduler = CountdownScheduler::new(0);
    let engine = BusyEngine::new("vcs0");
    let (sched, eng) = (scheduler.clone(), engine.clone());
    let recorder = Recorder::default();
    let stages = vec![
        recorder
            .stage(SCHED)
            .providing(move || Resource::Scheduler(sched.clone()))
            .boxed(),
        recorder
            .stage(ENGINES)
            .providing(move || Resource::Engines(vec![eng.clone() as Arc<dyn Engine>]))
            .boxed(),
    ];
    let mut handle = DeviceBuilder::new("busy")
        .with_teardown_timeout(Duration::from_millis(10))
        .bring_up(stages)
        .expect("ok");

    let timeout = Duration::from_millis(20);
    match handle.flush(timeout) {
        Err(FlushError::Timeout {
            waited,
            outstanding,
            iterations,
        }) => {
            assert!(waited >= timeout);
            assert_eq!(outstanding, 1);
            assert!(iterations >= 1);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(scheduler.outstanding_now(), 0);

    handle.destroy();
    assert!(handle.is_released());
    assert_eq!(recorder.releases(), vec![ENGINES, SCHED]);
}

#[test]
fn zero_timeout_with_outstanding_work_attempts_once() {
    let scheduler = StuckScheduler::new(1);
    let sched = scheduler.clone();
    let recorder = Recorder::default();
    let stages = vec![recorder
        .stage(SCHED)
        .providing(move || Resource::Scheduler(sched.clone()))
        .boxed()];
    let handle = DeviceBuilder::new("stuck")
        .with_teardown_timeout(Duration::ZERO)
        .bring_up(stages)
        .expect("ok");

    let err = handle.flush(Duration::ZERO).expect_err("cannot converge");
    assert!(matches!(err, FlushError::Timeout { iterations: 1, .. }));
    assert_eq!(scheduler.attempts(), 1);
}

#[test]
fn destroy_drains_work_before_releasing_engines() {
    let scheduler = CountdownScheduler::new(2);
    let engine = CountingEngine::new("rcs0");
    let (sched, eng) = (scheduler.clone(), engine.clone());
    let recorder = Recorder::default();
    let stages = vec![
        recorder.stage(A).boxed(),
        recorder
            .stage(SCHED)
            .providing(move || Resource::Scheduler(sched.clone()))
            .boxed(),
        recorder
            .stage(ENGINES)
            .providing(move || Resource::Engines(vec![eng.clone() as Arc<dyn Engine>]))
            .boxed(),
        recorder.stage(B).boxed(),
    ];
    let mut handle = bring_up(stages).expect("ok");
    assert_eq!(handle.engines().len(), 1);
    assert!(handle.scheduler().is_some());

    handle.destroy();
    assert_eq!(scheduler.attempts(), 2);
    assert_eq!(scheduler.outstanding_now(), 0);
    assert_eq!(engine.flushes(), 2);
    assert_eq!(recorder.releases(), vec![B, ENGINES, SCHED, A]);
}

#[test]
fn engines_registered_by_two_stages_are_listed_once() {
    let engine = CountingEngine::new("rcs0");
    let (first, second) = (engine.clone(), engine.clone());
    let recorder = Recorder::default();
    let stages = vec![
        recorder
            .stage(A)
            .providing(move || Resource::Engines(vec![first.clone() as Arc<dyn Engine>]))
            .boxed(),
        recorder
            .stage(ENGINES)
            .providing(move || Resource::Engines(vec![second.clone() as Arc<dyn Engine>]))
            .boxed(),
    ];
    let handle = bring_up(stages).expect("ok");
    assert_eq!(handle.engines().len(), 1);
    assert_eq!(handle.engines()[0].name(), "rcs0");
}

#[test]
fn release_faults_do_not_stop_teardown() {
    let registry = new_registry();
    let metrics = DeviceMetrics::new(registry.clone()).expect("metrics");
    let recorder = Recorder::default();
    let stages = vec![
        recorder.stage(A).boxed(),
        recorder.stage(B).faulty_release().boxed(),
        recorder.stage(C).boxed(),
    ];
    let mut handle = DeviceBuilder::new("faulty")
        .with_metrics(metrics)
        .bring_up(stages)
        .expect("ok");

    handle.destroy();
    assert!(handle.is_released());
    assert_eq!(recorder.releases(), vec![C, B, A]);

    let text = render_text(&registry).expect("render");
    assert!(text.contains("simgpu_release_faults_total{stage=\"b\"} 1"));
    assert!(text.contains("simgpu_teardowns_total 1"));
}

#[test]
fn flush_metrics_observe_iterations() {
    let registry = new_registry();
    let metrics = DeviceMetrics::new(registry.clone()).expect("metrics");
    let scheduler: Arc<CountdownScheduler> = CountdownScheduler::new(3);
    let sched = scheduler.clone();
    let recorder = Recorder::default();
    let stages = vec![recorder
        .stage(SCHED)
        .providing(move || Resource::Scheduler(sched.clone()))
        .boxed()];
    let handle = DeviceBuilder::new("metered")
        .with_metrics(metrics)
        .bring_up(stages)
        .expect("ok");

    handle.flush(MAX_SCHEDULE_TIMEOUT).expect("converges");
    let text = render_text(&registry).expect("render");
    assert!(text.contains("simgpu_flush_iterations_sum 3"));
    assert!(text.contains("simgpu_flush_timeouts_total 0"));
}
