//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Platform-level stages: host record, power domain, parameters, register
//! emulation, mode configuration, memory regions, and the GT record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use simgpu_common::DeviceConfig;
use simgpu_core::{DeviceState, Resource, Stage, StageError, StageId};
use tracing::{debug, warn};

use crate::stages::{
    require, GT_PROBE, HOST_REGISTRATION, MEMORY_REGIONS, MODE_CONFIG, PARAMS, POWER_DOMAIN,
    UNCORE,
};

/// PCI base class for display controllers, in the class-register position.
pub const DISPLAY_CLASS: u32 = 0x03 << 16;
const MAX_CACHE_LEVEL: usize = 4;

/// Host-side device record everything else hangs off.
#[derive(Debug)]
pub struct HostDevice {
    pub name: String,
    pub class: u32,
    pub dma_mask: u64,
}

/// Allocates and registers the host device record.
#[derive(Debug)]
pub struct HostRegistrationStage {
    name: String,
}

impl HostRegistrationStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Stage for HostRegistrationStage {
    fn id(&self) -> StageId {
        HOST_REGISTRATION
    }

    fn acquire(&mut self, _device: &DeviceState) -> Result<Resource, StageError> {
        if self.name.trim().is_empty() {
            return Err(StageError::new("host device record needs a name"));
        }
        debug!(device = %self.name, "host device registered");
        Ok(Resource::opaque(HostDevice {
            name: self.name.clone(),
            class: DISPLAY_CLASS,
            dma_mask: u64::MAX,
        }))
    }

    fn release(&mut self, _device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let host = resource
            .downcast::<HostDevice>()
            .map_err(|other| StageError::new(format!("unexpected {} resource", other.kind())))?;
        debug!(device = %host.name, "host device record freed");
        Ok(())
    }
}

/// Runtime power-management state of the device.
#[derive(Debug)]
pub struct PowerDomain {
    runtime_enabled: AtomicBool,
    usage: AtomicU32,
    pub autosuspend: bool,
}

impl PowerDomain {
    pub fn is_runtime_enabled(&self) -> bool {
        self.runtime_enabled.load(Ordering::Acquire)
    }

    pub fn usage(&self) -> u32 {
        self.usage.load(Ordering::Acquire)
    }
}

/// Attaches the power domain, enables runtime PM, and resumes synchronously.
#[derive(Debug, Default)]
pub struct PowerDomainStage;

impl Stage for PowerDomainStage {
    fn id(&self) -> StageId {
        POWER_DOMAIN
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        let host = require::<HostDevice>(device, HOST_REGISTRATION, POWER_DOMAIN)?;
        let domain = PowerDomain {
            runtime_enabled: AtomicBool::new(true),
            usage: AtomicU32::new(1),
            autosuspend: false,
        };
        debug!(device = %host.name, usage = domain.usage(), "power domain resumed");
        Ok(Resource::opaque(domain))
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let Some(domain) = resource.downcast_ref::<PowerDomain>() else {
            return Err(StageError::new("power domain resource missing"));
        };
        let previous = domain.usage.fetch_sub(1, Ordering::AcqRel);
        domain.runtime_enabled.store(false, Ordering::Release);
        if previous != 1 {
            warn!(device = %device.name(), usage = previous, "power domain usage unbalanced at detach");
            return Err(StageError::new(format!(
                "power domain released with usage count {}",
                previous
            )));
        }
        debug!(device = %device.name(), "power domain detached");
        Ok(())
    }
}

/// Driver parameters copied into the device at bring-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParams {
    pub engines: Vec<String>,
    pub workqueue: String,
    pub priority_levels: u32,
    pub regions: Vec<String>,
    pub page_sizes: Vec<u64>,
    /// Legacy cache level to PAT index; identity on the mock device.
    pub cachelevel_to_pat: Vec<u8>,
    /// Unknown graphics version; the mock device never matches a real platform.
    pub graphics_version: i32,
}

impl DeviceParams {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            engines: config.engines.iter().map(|e| e.name.clone()).collect(),
            workqueue: config.workqueue.name.clone(),
            priority_levels: config.scheduler.priority_levels,
            regions: config.memory.regions.clone(),
            page_sizes: config.memory.page_sizes.clone(),
            cachelevel_to_pat: (0..MAX_CACHE_LEVEL as u8).collect(),
            graphics_version: -1,
        }
    }
}

#[derive(Debug)]
pub struct ParamsStage {
    params: DeviceParams,
}

impl ParamsStage {
    pub fn new(params: DeviceParams) -> Self {
        Self { params }
    }
}

impl Stage for ParamsStage {
    fn id(&self) -> StageId {
        PARAMS
    }

    fn acquire(&mut self, _device: &DeviceState) -> Result<Resource, StageError> {
        Ok(Resource::opaque(self.params.clone()))
    }

    fn release(&mut self, _device: &DeviceState, _resource: Resource) -> Result<(), StageError> {
        Ok(())
    }
}

/// Emulated register file standing in for the uncore MMIO block.
#[derive(Debug, Default)]
pub struct Uncore {
    registers: Mutex<HashMap<u32, u32>>,
}

impl Uncore {
    pub fn read(&self, offset: u32) -> u32 {
        self.registers.lock().get(&offset).copied().unwrap_or(0)
    }

    pub fn write(&self, offset: u32, value: u32) {
        self.registers.lock().insert(offset, value);
    }
}

#[derive(Debug, Default)]
pub struct UncoreStage;

impl Stage for UncoreStage {
    fn id(&self) -> StageId {
        UNCORE
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        let power = require::<PowerDomain>(device, POWER_DOMAIN, UNCORE)?;
        if !power.is_runtime_enabled() {
            return Err(StageError::new("register emulation needs the device powered"));
        }
        Ok(Resource::opaque(Uncore::default()))
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        if let Some(uncore) = resource.downcast_ref::<Uncore>() {
            debug!(
                device = %device.name(),
                registers = uncore.registers.lock().len(),
                "register emulation torn down"
            );
        }
        Ok(())
    }
}

/// Generic mode/display configuration object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeConfig {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            min_width: 0,
            min_height: 0,
            max_width: 8192,
            max_height: 8192,
        }
    }
}

#[derive(Debug, Default)]
pub struct ModeConfigStage;

impl Stage for ModeConfigStage {
    fn id(&self) -> StageId {
        MODE_CONFIG
    }

    fn acquire(&mut self, _device: &DeviceState) -> Result<Resource, StageError> {
        Ok(Resource::opaque(ModeConfig::default()))
    }

    fn release(&mut self, _device: &DeviceState, _resource: Resource) -> Result<(), StageError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub name: String,
    pub instance: u16,
}

/// Probes the configured memory regions.
#[derive(Debug, Default)]
pub struct MemoryRegionsStage;

impl Stage for MemoryRegionsStage {
    fn id(&self) -> StageId {
        MEMORY_REGIONS
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        let params = require::<DeviceParams>(device, PARAMS, MEMORY_REGIONS)?;
        let regions: Vec<MemoryRegion> = params
            .regions
            .iter()
            .enumerate()
            .map(|(instance, name)| MemoryRegion {
                name: name.clone(),
                instance: instance as u16,
            })
            .collect();
        debug!(device = %device.name(), regions = regions.len(), "memory regions probed");
        Ok(Resource::opaque(regions))
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let count = resource
            .downcast_ref::<Vec<MemoryRegion>>()
            .map_or(0, Vec::len);
        debug!(device = %device.name(), regions = count, "memory regions released");
        Ok(())
    }
}

/// The device's single graphics tile.
#[derive(Debug)]
pub struct GtInfo {
    pub name: String,
    wedged: AtomicBool,
}

impl GtInfo {
    pub fn is_wedged(&self) -> bool {
        self.wedged.load(Ordering::Acquire)
    }

    pub(crate) fn set_wedged(&self, wedged: bool) {
        self.wedged.store(wedged, Ordering::Release);
    }
}

/// Probes the GT. It starts wedged until activation clears it; release runs
/// the late-release path.
#[derive(Debug, Default)]
pub struct GtProbeStage;

impl Stage for GtProbeStage {
    fn id(&self) -> StageId {
        GT_PROBE
    }

    fn acquire(&mut self, _device: &DeviceState) -> Result<Resource, StageError> {
        Ok(Resource::opaque(GtInfo {
            name: "Mock GT".to_owned(),
            wedged: AtomicBool::new(true),
        }))
    }

    fn release(&mut self, device: &DeviceState, _resource: Resource) -> Result<(), StageError> {
        debug!(device = %device.name(), "gt late release");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_copy_engine_names_and_identity_pat() {
        let params = DeviceParams::from_config(&DeviceConfig::default());
        assert_eq!(params.engines, vec!["rcs0".to_owned()]);
        assert_eq!(params.cachelevel_to_pat, vec![0, 1, 2, 3]);
        assert_eq!(params.graphics_version, -1);
    }

    #[test]
    fn uncore_reads_back_writes() {
        let uncore = Uncore::default();
        assert_eq!(uncore.read(0x2030), 0);
        uncore.write(0x2030, 0xdead);
        assert_eq!(uncore.read(0x2030), 0xdead);
    }
}
