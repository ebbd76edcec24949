//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Final bring-up stage: makes the device usable for submission.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use simgpu_core::{DeviceState, Resource, Stage, StageError, StageId};
use simgpu_logging::{sg_info, LogContext};
use tracing::warn;

use crate::engine::mock_engines;
use crate::platform::GtInfo;
use crate::stages::{require, ACTIVATION, GT_PROBE};

/// First id handed out for mock memory regions.
pub const FIRST_REGION_ID: u32 = 1;

/// State owned by the activation stage.
#[derive(Debug)]
pub struct Activation {
    next_region_id: AtomicU32,
    debugger_attached: AtomicBool,
    engines: usize,
}

impl Activation {
    /// Allocate an id for a mock memory region.
    pub fn allocate_region_id(&self) -> u32 {
        self.next_region_id.fetch_add(1, Ordering::AcqRel)
    }

    pub fn debugger_attached(&self) -> bool {
        self.debugger_attached.load(Ordering::Acquire)
    }

    pub fn registered_engines(&self) -> usize {
        self.engines
    }
}

#[derive(Debug, Default)]
pub struct ActivationStage;

impl Stage for ActivationStage {
    fn id(&self) -> StageId {
        ACTIVATION
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        let gt = require::<GtInfo>(device, GT_PROBE, ACTIVATION)?;
        let engines = mock_engines(device);
        if engines.iter().any(|engine| !engine.is_initialised()) {
            return Err(StageError::new("cannot register uninitialised engines"));
        }
        gt.set_wedged(false);
        for engine in &engines {
            engine.register();
        }
        sg_info!(
            context = LogContext::new()
                .with_device(device.name())
                .with_stage(ACTIVATION.as_str()),
            "device active with {} engine(s)",
            engines.len()
        );
        Ok(Resource::opaque(Activation {
            next_region_id: AtomicU32::new(FIRST_REGION_ID),
            debugger_attached: AtomicBool::new(true),
            engines: engines.len(),
        }))
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let activation = resource.downcast_ref::<Activation>();
        if let Some(activation) = activation {
            activation.debugger_attached.store(false, Ordering::Release);
        }
        for engine in mock_engines(device) {
            engine.unregister();
        }
        if let Some(gt) = device.opaque::<GtInfo>(GT_PROBE) {
            gt.set_wedged(true);
        }
        if activation.is_none() {
            warn!(device = %device.name(), kind = resource.kind(), "activation state missing");
            return Err(StageError::new("activation state missing"));
        }
        Ok(())
    }
}
