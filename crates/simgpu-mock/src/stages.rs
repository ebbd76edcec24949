//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Stage identifiers of the mock device, in declared bring-up order.

use std::any::Any;

use simgpu_core::{DeviceState, StageError, StageId};

pub const HOST_REGISTRATION: StageId = StageId::new("host_registration");
pub const POWER_DOMAIN: StageId = StageId::new("power_domain");
pub const PARAMS: StageId = StageId::new("params");
pub const UNCORE: StageId = StageId::new("uncore");
pub const WAKEREF: StageId = StageId::WAKEREF;
pub const MODE_CONFIG: StageId = StageId::new("mode_config");
pub const WORKQUEUE: StageId = StageId::new("workqueue");
pub const MEMORY_REGIONS: StageId = StageId::new("memory_regions");
pub const GT_PROBE: StageId = StageId::new("gt_probe");
pub const SCHEDULER: StageId = StageId::new("scheduler");
pub const GEM_MM: StageId = StageId::new("gem_mm");
pub const ADDRESS_SPACE: StageId = StageId::new("address_space");
pub const ENGINE_CONSTRUCT: StageId = StageId::new("engine_construct");
pub const ENGINE_INIT: StageId = StageId::new("engine_init");
pub const ACTIVATION: StageId = StageId::new("activation");

pub const DECLARED_ORDER: [StageId; 15] = [
    HOST_REGISTRATION,
    POWER_DOMAIN,
    PARAMS,
    UNCORE,
    WAKEREF,
    MODE_CONFIG,
    WORKQUEUE,
    MEMORY_REGIONS,
    GT_PROBE,
    SCHEDULER,
    GEM_MM,
    ADDRESS_SPACE,
    ENGINE_CONSTRUCT,
    ENGINE_INIT,
    ACTIVATION,
];

/// Resolve a configured stage name against the declared order.
pub fn lookup(name: &str) -> Option<StageId> {
    DECLARED_ORDER
        .iter()
        .copied()
        .find(|stage| stage.as_str() == name)
}

/// Typed access to an earlier stage's payload, failing the acquiring stage when absent.
pub(crate) fn require<'a, T: Any>(
    device: &'a DeviceState,
    stage: StageId,
    requester: StageId,
) -> Result<&'a T, StageError> {
    device.opaque::<T>(stage).ok_or_else(|| {
        StageError::new(format!(
            "'{}' requires '{}' to be committed first",
            requester, stage
        ))
    })
}
