//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use simgpu_core::{DeviceState, Resource, Stage, StageError, StageId};
use thiserror::Error;
use tracing::{debug, warn};

use crate::platform::{DeviceParams, MemoryRegion};
use crate::stages::{require, ADDRESS_SPACE, GEM_MM, MEMORY_REGIONS, PARAMS, WORKQUEUE};
use crate::workqueue::Workqueue;

/// Size of the global GTT on the mock device.
pub const GGTT_SIZE: u64 = 4 << 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GemError {
    #[error("object size {size} is not a multiple of the {page}-byte minimum page")]
    InvalidSize { size: u64, page: u64 },
    #[error("unknown object handle {0}")]
    UnknownObject(u64),
    #[error("unknown context {0}")]
    UnknownContext(u32),
}

#[derive(Debug, Default)]
struct GemState {
    next_handle: u64,
    next_context: u32,
    objects: HashMap<u64, u64>,
    contexts: BTreeSet<u32>,
    /// Objects whose last reference is gone, waiting to be freed.
    free_list: Vec<u64>,
    freed: u64,
}

/// Context table and object lifetime tracking.
///
/// Dropping an object's last reference defers its free to the device
/// workqueue; [`reap`](Self::reap) completes the free.
#[derive(Debug)]
pub struct ObjectTracker {
    workqueue: Arc<Workqueue>,
    min_page: u64,
    state: Arc<Mutex<GemState>>,
}

impl ObjectTracker {
    pub fn new(workqueue: Arc<Workqueue>, min_page: u64) -> Self {
        Self {
            workqueue,
            min_page: min_page.max(1),
            state: Arc::new(Mutex::new(GemState::default())),
        }
    }

    pub fn create_object(&self, size: u64) -> Result<u64, GemError> {
        if size == 0 || size % self.min_page != 0 {
            return Err(GemError::InvalidSize {
                size,
                page: self.min_page,
            });
        }
        let mut state = self.state.lock();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.objects.insert(handle, size);
        Ok(handle)
    }

    /// Drop the last reference to `handle`.
    pub fn put_object(&self, handle: u64) -> Result<(), GemError> {
        if !self.state.lock().objects.contains_key(&handle) {
            return Err(GemError::UnknownObject(handle));
        }
        let state = Arc::clone(&self.state);
        let deferred = move || {
            let mut state = state.lock();
            if state.objects.remove(&handle).is_some() {
                state.free_list.push(handle);
            }
        };
        if !self.workqueue.queue(deferred) {
            let mut state = self.state.lock();
            state.objects.remove(&handle);
            state.freed += 1;
        }
        Ok(())
    }

    /// Free every object whose deferred put has run. Returns how many were freed.
    pub fn reap(&self) -> usize {
        let mut state = self.state.lock();
        let reaped = state.free_list.len();
        state.free_list.clear();
        state.freed += reaped as u64;
        reaped
    }

    pub fn create_context(&self) -> u32 {
        let mut state = self.state.lock();
        state.next_context += 1;
        let id = state.next_context;
        state.contexts.insert(id);
        id
    }

    pub fn destroy_context(&self, id: u32) -> Result<(), GemError> {
        if self.state.lock().contexts.remove(&id) {
            Ok(())
        } else {
            Err(GemError::UnknownContext(id))
        }
    }

    pub fn live_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }

    pub fn freed_objects(&self) -> u64 {
        self.state.lock().freed
    }
}

/// Sets up the context table and object tracking.
#[derive(Debug, Default)]
pub struct GemStage;

impl Stage for GemStage {
    fn id(&self) -> StageId {
        GEM_MM
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        let workqueue = require::<Arc<Workqueue>>(device, WORKQUEUE, GEM_MM)?;
        let params = require::<DeviceParams>(device, PARAMS, GEM_MM)?;
        let min_page = params.page_sizes.iter().copied().min().unwrap_or(1);
        Ok(Resource::opaque(ObjectTracker::new(
            Arc::clone(workqueue),
            min_page,
        )))
    }

    /// Two phases: run queued jobs so pending puts land on the free list, then
    /// free the list. Anything still live afterwards leaked.
    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let Some(tracker) = resource.downcast_ref::<ObjectTracker>() else {
            return Err(StageError::new("object tracker missing"));
        };
        let jobs = tracker.workqueue.drain();
        let reaped = tracker.reap();
        debug!(device = %device.name(), jobs, reaped, "gem drained");

        let objects = tracker.live_objects();
        let contexts = tracker.live_contexts();
        if objects > 0 || contexts > 0 {
            warn!(device = %device.name(), objects, contexts, "gem teardown found leaks");
            return Err(StageError::new(format!(
                "{} object(s) and {} context(s) leaked",
                objects, contexts
            )));
        }
        Ok(())
    }
}

/// Global GTT plus the default VM reference.
#[derive(Debug)]
pub struct AddressSpace {
    pub ggtt_size: u64,
    pub regions: usize,
    vm_refs: AtomicU32,
}

impl AddressSpace {
    pub fn vm_get(&self) -> u32 {
        self.vm_refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn vm_put(&self) -> u32 {
        let previous = self
            .vm_refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| {
                Some(refs.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn vm_refs(&self) -> u32 {
        self.vm_refs.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
pub struct AddressSpaceStage;

impl Stage for AddressSpaceStage {
    fn id(&self) -> StageId {
        ADDRESS_SPACE
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        let regions = require::<Vec<MemoryRegion>>(device, MEMORY_REGIONS, ADDRESS_SPACE)?;
        require::<ObjectTracker>(device, GEM_MM, ADDRESS_SPACE)?;
        Ok(Resource::opaque(AddressSpace {
            ggtt_size: GGTT_SIZE,
            regions: regions.len(),
            vm_refs: AtomicU32::new(1),
        }))
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let Some(space) = resource.downcast_ref::<AddressSpace>() else {
            return Err(StageError::new("address space missing"));
        };
        let refs = space.vm_refs();
        if refs != 1 {
            warn!(device = %device.name(), refs, "default vm still referenced at teardown");
            return Err(StageError::new(format!(
                "default vm released with {} reference(s)",
                refs
            )));
        }
        Ok(())
    }
}
