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
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Args;
use parking_lot::Mutex;
use simgpu_common::DeviceConfig;
use simgpu_core::{BringUpError, DeviceBuilder, DeviceState, Resource, Stage, StageError, StageId};
use simgpu_mock::{stage_table, DECLARED_ORDER};
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Device configuration file (TOML).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also inject a release fault at every stage and verify teardown completes.
    #[arg(long = "release-faults", action = clap::ArgAction::SetTrue)]
    pub release_faults: bool,
}

type ReleaseLog = Arc<Mutex<Vec<StageId>>>;

/// Records the order stages are released in.
struct ReleaseProbe {
    inner: Box<dyn Stage>,
    log: ReleaseLog,
}

impl Stage for ReleaseProbe {
    fn id(&self) -> StageId {
        self.inner.id()
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        self.inner.acquire(device)
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        self.log.lock().push(self.inner.id());
        self.inner.release(device, resource)
    }
}

fn probed(config: &DeviceConfig) -> Result<(Vec<Box<dyn Stage>>, ReleaseLog)> {
    let log = ReleaseLog::default();
    let stages = stage_table(config)?
        .into_iter()
        .map(|inner| {
            Box::new(ReleaseProbe {
                inner,
                log: Arc::clone(&log),
            }) as Box<dyn Stage>
        })
        .collect();
    Ok((stages, log))
}

fn builder(config: &DeviceConfig) -> DeviceBuilder {
    DeviceBuilder::new(config.name.clone()).with_teardown_timeout(config.flush.teardown_timeout)
}

fn reversed(stages: &[StageId]) -> Vec<StageId> {
    stages.iter().rev().copied().collect()
}

/// Fail acquisition at `index` and check the committed prefix came back in reverse.
fn check_acquire_fault(config: &DeviceConfig, index: usize) -> Result<()> {
    let stage = DECLARED_ORDER[index];
    let mut config = config.clone();
    config.faults.fail_stage = Some(stage.as_str().to_owned());
    let (stages, log) = probed(&config)?;

    let (failed, committed) = match builder(&config).bring_up(stages) {
        Ok(_) => return Err(anyhow!("bring-up succeeded despite the injected fault")),
        Err(BringUpError::StageAcquire {
            stage: failed,
            committed,
            ..
        }) => (failed, committed),
        Err(err) => return Err(anyhow!("unexpected bring-up error: {}", err)),
    };
    if failed != stage {
        return Err(anyhow!("failure attributed to '{}'", failed));
    }
    let prefix = &DECLARED_ORDER[..index];
    if committed != prefix {
        return Err(anyhow!("committed {:?}, expected {:?}", committed, prefix));
    }
    let released = log.lock().clone();
    if released != reversed(prefix) {
        return Err(anyhow!("released {:?}, expected {:?}", released, reversed(prefix)));
    }
    Ok(())
}

/// Fault the release of `index` and check teardown still releases everything in reverse.
fn check_release_fault(config: &DeviceConfig, index: usize) -> Result<()> {
    let mut config = config.clone();
    config.faults.fail_release = Some(DECLARED_ORDER[index].as_str().to_owned());
    let (stages, log) = probed(&config)?;

    let mut handle = builder(&config).bring_up(stages)?;
    handle.destroy();
    let released = log.lock().clone();
    if !handle.is_released() || released != reversed(&DECLARED_ORDER) {
        return Err(anyhow!("teardown released {:?}", released));
    }
    Ok(())
}

pub fn execute(args: SweepArgs, config: DeviceConfig) -> Result<()> {
    let mut violations = 0usize;
    let mut report = |kind: &str, index: usize, outcome: Result<()>| {
        let stage = DECLARED_ORDER[index];
        match outcome {
            Ok(()) => println!("ok    {:<8} {:<18} prefix={}", kind, stage, index),
            Err(err) => {
                violations += 1;
                warn!(stage = %stage, kind, error = %err, "fault sweep violation");
                println!("FAIL  {:<8} {:<18} {}", kind, stage, err);
            }
        }
    };

    for index in 0..DECLARED_ORDER.len() {
        report("acquire", index, check_acquire_fault(&config, index));
    }
    if args.release_faults {
        for index in 0..DECLARED_ORDER.len() {
            report("release", index, check_release_fault(&config, index));
        }
    }

    if violations > 0 {
        return Err(anyhow!("fault sweep found {} violation(s)", violations));
    }
    info!(stages = DECLARED_ORDER.len(), "fault sweep passed");
    println!("fault sweep passed for {} stages", DECLARED_ORDER.len());
    Ok(())
}
