//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Bring-up orchestration and device lifecycle management."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use simgpu_metrics::DeviceMetrics;

use crate::lifecycle::FlushTimeout;
use crate::stage::{Engine, Resource, Scheduler, Stage, StageId};

/// Everything the committed stages have registered into the device.
///
/// Stages see this read-only while acquiring and releasing; only the
/// orchestrator and the lifecycle controller mutate it.
pub struct DeviceState {
    name: String,
    committed: IndexMap<StageId, Resource>,
    usable: bool,
    released: bool,
    wakerefs: u32,
}

impl DeviceState {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            committed: IndexMap::new(),
            usable: false,
            released: false,
            wakerefs: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Committed stage identifiers in commit order.
    pub fn committed_stages(&self) -> Vec<StageId> {
        self.committed.keys().copied().collect()
    }

    pub fn is_committed(&self, stage: StageId) -> bool {
        self.committed.contains_key(&stage)
    }

    pub fn resource(&self, stage: StageId) -> Option<&Resource> {
        self.committed.get(&stage)
    }

    /// Typed view of an opaque resource registered by `stage`.
    pub fn opaque<T: Any>(&self, stage: StageId) -> Option<&T> {
        self.resource(stage)?.downcast_ref::<T>()
    }

    /// Every committed engine, in commit order. An engine registered by more
    /// than one stage is listed once.
    pub fn engines(&self) -> Vec<Arc<dyn Engine>> {
        let mut engines: Vec<Arc<dyn Engine>> = Vec::new();
        for resource in self.committed.values() {
            let Resource::Engines(committed) = resource else {
                continue;
            };
            for engine in committed {
                if !engines.iter().any(|seen| same_engine(seen, engine)) {
                    engines.push(Arc::clone(engine));
                }
            }
        }
        engines
    }

    /// The most recently committed scheduler.
    pub fn scheduler(&self) -> Option<Arc<dyn Scheduler>> {
        self.committed
            .values()
            .rev()
            .find_map(|resource| match resource {
                Resource::Scheduler(scheduler) => Some(scheduler.clone()),
                _ => None,
            })
    }

    /// Whether bring-up committed every declared stage.
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn wakeref_held(&self) -> bool {
        self.wakerefs > 0
    }

    pub(crate) fn commit(&mut self, stage: StageId, resource: Resource) {
        if matches!(resource, Resource::Wakeref) {
            self.wakerefs += 1;
        }
        self.committed.insert(stage, resource);
    }

    pub(crate) fn last_committed(&self) -> Option<(StageId, &Resource)> {
        self.committed
            .last()
            .map(|(stage, resource)| (*stage, resource))
    }

    pub(crate) fn pop_committed(&mut self) -> Option<(StageId, Resource)> {
        let (stage, resource) = self.committed.pop()?;
        if matches!(resource, Resource::Wakeref) {
            debug_assert!(self.wakerefs > 0, "wakeref dropped more often than taken");
            self.wakerefs = self.wakerefs.saturating_sub(1);
        }
        Some((stage, resource))
    }

    pub(crate) fn committed_len(&self) -> usize {
        self.committed.len()
    }

    pub(crate) fn mark_usable(&mut self) {
        self.usable = true;
    }

    pub(crate) fn mark_released(&mut self) {
        self.usable = false;
        self.released = true;
    }
}

fn same_engine(a: &Arc<dyn Engine>, b: &Arc<dyn Engine>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl fmt::Debug for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceState")
            .field("name", &self.name)
            .field("committed", &self.committed_stages())
            .field("usable", &self.usable)
            .field("released", &self.released)
            .field("wakeref_held", &self.wakeref_held())
            .finish()
    }
}

/// Owned handle to an assembled device.
///
/// Dropping the handle destroys the device if [`destroy`](Self::destroy) has
/// not already run.
pub struct DeviceHandle {
    pub(crate) state: DeviceState,
    pub(crate) stages: Vec<Box<dyn Stage>>,
    pub(crate) teardown_timeout: FlushTimeout,
    pub(crate) metrics: Option<DeviceMetrics>,
}

impl DeviceHandle {
    pub(crate) fn new(
        name: String,
        stages: Vec<Box<dyn Stage>>,
        teardown_timeout: FlushTimeout,
        metrics: Option<DeviceMetrics>,
    ) -> Self {
        Self {
            state: DeviceState::new(name),
            stages,
            teardown_timeout,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// The stage order this device was brought up with.
    pub fn declared_stages(&self) -> Vec<StageId> {
        self.stages.iter().map(|stage| stage.id()).collect()
    }

    pub fn committed_stages(&self) -> Vec<StageId> {
        self.state.committed_stages()
    }

    pub fn engines(&self) -> Vec<Arc<dyn Engine>> {
        self.state.engines()
    }

    pub fn scheduler(&self) -> Option<Arc<dyn Scheduler>> {
        self.state.scheduler()
    }

    pub fn is_usable(&self) -> bool {
        self.state.is_usable()
    }

    pub fn is_released(&self) -> bool {
        self.state.is_released()
    }

    pub fn wakeref_held(&self) -> bool {
        self.state.wakeref_held()
    }

    pub fn teardown_timeout(&self) -> FlushTimeout {
        self.teardown_timeout
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("state", &self.state)
            .field("declared", &self.declared_stages())
            .field("teardown_timeout", &self.teardown_timeout)
            .finish()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}
