//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Assembly of the mock device's declared stage table.

use anyhow::{Context, Result};
use simgpu_common::DeviceConfig;
use simgpu_core::{DeviceBuilder, DeviceHandle, Stage, WakerefStage};
use simgpu_metrics::DeviceMetrics;

use crate::activation::ActivationStage;
use crate::engine::{EngineConstructStage, EngineInitStage};
use crate::faults;
use crate::gem::{AddressSpaceStage, GemStage};
use crate::platform::{
    DeviceParams, GtProbeStage, HostRegistrationStage, MemoryRegionsStage, ModeConfigStage,
    ParamsStage, PowerDomainStage, UncoreStage,
};
use crate::scheduler::SchedulerStage;
use crate::workqueue::WorkqueueStage;

/// Build the stage table for `config`, in declared order, with any configured
/// faults applied.
pub fn stage_table(config: &DeviceConfig) -> Result<Vec<Box<dyn Stage>>> {
    config.validate()?;
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(HostRegistrationStage::new(config.name.clone())),
        Box::new(PowerDomainStage),
        Box::new(ParamsStage::new(DeviceParams::from_config(config))),
        Box::new(UncoreStage),
        Box::new(WakerefStage),
        Box::new(ModeConfigStage),
        Box::new(WorkqueueStage::new(config.workqueue.name.clone())),
        Box::new(MemoryRegionsStage),
        Box::new(GtProbeStage),
        Box::new(SchedulerStage),
        Box::new(GemStage),
        Box::new(AddressSpaceStage),
        Box::new(EngineConstructStage),
        Box::new(EngineInitStage),
        Box::new(ActivationStage),
    ];
    faults::apply(stages, &config.faults)
}

/// Bring up a mock device described by `config`.
///
/// Bring-up failures come back as a [`simgpu_core::BringUpError`] inside the
/// returned error; the device has already been rolled back by then.
pub fn bring_up_mock(config: &DeviceConfig, metrics: Option<DeviceMetrics>) -> Result<DeviceHandle> {
    let stages = stage_table(config)?;
    let mut builder =
        DeviceBuilder::new(config.name.clone()).with_teardown_timeout(config.flush.teardown_timeout);
    if let Some(metrics) = metrics {
        builder = builder.with_metrics(metrics);
    }
    let handle = builder
        .bring_up(stages)
        .with_context(|| format!("failed to bring up device '{}'", config.name))?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::DECLARED_ORDER;

    #[test]
    fn table_follows_declared_order() {
        let stages = stage_table(&DeviceConfig::default()).expect("table");
        let ids: Vec<_> = stages.iter().map(|stage| stage.id()).collect();
        assert_eq!(ids, DECLARED_ORDER.to_vec());
    }

    #[test]
    fn unknown_fault_stage_is_rejected() {
        let mut config = DeviceConfig::default();
        config.faults.fail_stage = Some("display".to_owned());
        let err = stage_table(&config).err().expect("unknown stage");
        assert!(err.to_string().contains("unknown stage 'display'"));
    }
}
