//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Fault injection for bring-up and teardown paths.

use anyhow::{anyhow, Result};
use simgpu_common::FaultConfig;
use simgpu_core::{DeviceState, Resource, Stage, StageError, StageId};
use tracing::debug;

use crate::stages::lookup;

/// Wraps a stage and makes its acquire and/or release report a fault.
///
/// A failed acquire never reaches the inner stage. A failed release still
/// releases the inner stage first so the resource is not leaked.
pub struct FaultInjector {
    inner: Box<dyn Stage>,
    fail_acquire: bool,
    fail_release: bool,
}

impl FaultInjector {
    pub fn new(inner: Box<dyn Stage>) -> Self {
        Self {
            inner,
            fail_acquire: false,
            fail_release: false,
        }
    }

    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn boxed(self) -> Box<dyn Stage> {
        Box::new(self)
    }
}

impl Stage for FaultInjector {
    fn id(&self) -> StageId {
        self.inner.id()
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        if self.fail_acquire {
            debug!(stage = %self.id(), "injecting acquire fault");
            return Err(StageError::new(format!(
                "injected acquire fault in '{}'",
                self.id()
            )));
        }
        self.inner.acquire(device)
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let released = self.inner.release(device, resource);
        if self.fail_release {
            debug!(stage = %self.id(), "injecting release fault");
            return Err(StageError::new(format!(
                "injected release fault in '{}'",
                self.id()
            )));
        }
        released
    }
}

fn resolve(key: &str, name: &Option<String>) -> Result<Option<StageId>> {
    match name {
        None => Ok(None),
        Some(name) => lookup(name)
            .map(Some)
            .ok_or_else(|| anyhow!("{} names unknown stage '{}'", key, name)),
    }
}

/// Wrap the stages named by `faults`. Unknown stage names are rejected.
pub fn apply(stages: Vec<Box<dyn Stage>>, faults: &FaultConfig) -> Result<Vec<Box<dyn Stage>>> {
    let fail_stage = resolve("faults.fail_stage", &faults.fail_stage)?;
    let fail_release = resolve("faults.fail_release", &faults.fail_release)?;
    if fail_stage.is_none() && fail_release.is_none() {
        return Ok(stages);
    }
    Ok(stages
        .into_iter()
        .map(|stage| {
            let id = stage.id();
            let acquire = fail_stage == Some(id);
            let release = fail_release == Some(id);
            if !acquire && !release {
                return stage;
            }
            let mut injector = FaultInjector::new(stage);
            if acquire {
                injector = injector.failing_acquire();
            }
            if release {
                injector = injector.failing_release();
            }
            injector.boxed()
        })
        .collect())
}
