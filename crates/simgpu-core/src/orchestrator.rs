//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Bring-up orchestration and device lifecycle management."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::collections::HashSet;

use simgpu_metrics::DeviceMetrics;
use tracing::{debug, error, info};

use crate::error::BringUpError;
use crate::handle::DeviceHandle;
use crate::lifecycle::FlushTimeout;
use crate::stage::Stage;

const DEFAULT_DEVICE_NAME: &str = "mock";

/// Bring up a device named `mock` with default settings.
pub fn bring_up(stages: Vec<Box<dyn Stage>>) -> Result<DeviceHandle, BringUpError> {
    DeviceBuilder::new(DEFAULT_DEVICE_NAME).bring_up(stages)
}

/// Bring-up entrypoint carrying the per-device settings.
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    name: String,
    teardown_timeout: FlushTimeout,
    metrics: Option<DeviceMetrics>,
}

impl DeviceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            teardown_timeout: FlushTimeout::Unbounded,
            metrics: None,
        }
    }

    /// Bound the flush that teardown runs before releasing engines and schedulers.
    pub fn with_teardown_timeout(mut self, timeout: impl Into<FlushTimeout>) -> Self {
        self.teardown_timeout = timeout.into();
        self
    }

    pub fn with_metrics(mut self, metrics: DeviceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Acquire every stage in order. On the first failure the committed stages
    /// are released newest-first and the failure is returned; no partially
    /// assembled device ever reaches the caller.
    pub fn bring_up(self, stages: Vec<Box<dyn Stage>>) -> Result<DeviceHandle, BringUpError> {
        validate_stage_table(&stages)?;
        let mut handle = DeviceHandle::new(self.name, stages, self.teardown_timeout, self.metrics);

        for index in 0..handle.stages.len() {
            let stage_id = handle.stages[index].id();
            match handle.stages[index].acquire(&handle.state) {
                Ok(resource) => {
                    debug!(
                        device = %handle.state.name(),
                        stage = %stage_id,
                        kind = resource.kind(),
                        "stage committed"
                    );
                    handle.state.commit(stage_id, resource);
                }
                Err(source) => {
                    let committed = handle.state.committed_stages();
                    error!(
                        device = %handle.state.name(),
                        stage = %stage_id,
                        committed = committed.len(),
                        error = %source,
                        "stage acquire failed; rolling back"
                    );
                    if let Some(metrics) = &handle.metrics {
                        metrics.record_bring_up(false);
                        metrics.record_rollback(stage_id.as_str());
                    }
                    let summary = handle.unwind();
                    debug!(
                        device = %handle.state.name(),
                        released = summary.released,
                        faults = summary.faults,
                        "rollback complete"
                    );
                    return Err(BringUpError::StageAcquire {
                        stage: stage_id,
                        committed,
                        source,
                    });
                }
            }
        }

        handle.state.mark_usable();
        if let Some(metrics) = &handle.metrics {
            metrics.record_bring_up(true);
        }
        info!(
            device = %handle.state.name(),
            stages = handle.stages.len(),
            wakeref_held = handle.state.wakeref_held(),
            "device brought up"
        );
        Ok(handle)
    }
}

fn validate_stage_table(stages: &[Box<dyn Stage>]) -> Result<(), BringUpError> {
    if stages.is_empty() {
        return Err(BringUpError::InvalidStageTable {
            reason: "no stages declared".to_owned(),
        });
    }
    let mut seen = HashSet::with_capacity(stages.len());
    for stage in stages {
        if !seen.insert(stage.id()) {
            return Err(BringUpError::InvalidStageTable {
                reason: format!("stage '{}' declared more than once", stage.id()),
            });
        }
    }
    Ok(())
}
