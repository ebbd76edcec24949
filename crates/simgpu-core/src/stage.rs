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
use std::time::Duration;

use crate::error::StageError;
use crate::handle::DeviceState;

/// Identifier of one step in a device's declared bring-up order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(&'static str);

impl StageId {
    /// The artificial keep-powered reference; see [`WakerefStage`].
    pub const WAKEREF: StageId = StageId::new("wakeref");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// An execution engine that can be driven to a quiesced state.
pub trait Engine: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Push every submitted request through to completion.
    fn flush(&self);

    /// Whether the engine has nothing submitted that has not completed.
    fn is_idle(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Tracker of outstanding scheduled work.
pub trait Scheduler: fmt::Debug + Send + Sync {
    /// Number of tracked items not yet retired.
    fn outstanding(&self) -> usize;

    /// Retire whatever has completed, waiting at most `budget` (forever when
    /// `None`) for more completions. Returns what is still outstanding.
    fn retire(&self, budget: Option<Duration>) -> usize;

    fn as_any(&self) -> &dyn Any;
}

/// Resource registered into the device by a committed stage.
///
/// Most collaborators hand back an opaque payload. Engines and schedulers are
/// typed so the lifecycle controller can find them when flushing.
pub enum Resource {
    Opaque(Box<dyn Any + Send + Sync>),
    Wakeref,
    Engines(Vec<Arc<dyn Engine>>),
    Scheduler(Arc<dyn Scheduler>),
}

impl Resource {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Resource::Opaque(Box::new(value))
    }

    /// Payload-free marker for stages whose effect is the commitment itself.
    pub fn empty() -> Self {
        Resource::opaque(())
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Resource::Opaque(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Take ownership of an opaque payload, handing the resource back on mismatch.
    pub fn downcast<T: Any>(self) -> Result<Box<T>, Resource> {
        match self {
            Resource::Opaque(value) => value.downcast::<T>().map_err(Resource::Opaque),
            other => Err(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Opaque(_) => "opaque",
            Resource::Wakeref => "wakeref",
            Resource::Engines(_) => "engines",
            Resource::Scheduler(_) => "scheduler",
        }
    }

    /// Whether this resource can hold in-flight work that must drain before release.
    pub(crate) fn carries_work(&self) -> bool {
        matches!(self, Resource::Engines(_) | Resource::Scheduler(_))
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Engines(engines) => f
                .debug_tuple("Engines")
                .field(&engines.iter().map(|e| e.name()).collect::<Vec<_>>())
                .finish(),
            Resource::Scheduler(scheduler) => f.debug_tuple("Scheduler").field(scheduler).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// One acquire/release step of the bring-up sequence.
///
/// `release` is only ever called with the resource returned by this stage's own
/// successful `acquire`, exactly once. Faults reported by `release` are logged by
/// the unwinder and never stop the remaining releases.
pub trait Stage: Send {
    fn id(&self) -> StageId;

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError>;

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError>;
}

/// Keeps the device "powered" for the handle's lifetime.
///
/// Committing this stage takes the single wakeref; releasing it drops it.
#[derive(Debug, Default, Clone, Copy)]
pub struct WakerefStage;

impl Stage for WakerefStage {
    fn id(&self) -> StageId {
        StageId::WAKEREF
    }

    fn acquire(&mut self, _device: &DeviceState) -> Result<Resource, StageError> {
        Ok(Resource::Wakeref)
    }

    fn release(&mut self, _device: &DeviceState, _resource: Resource) -> Result<(), StageError> {
        Ok(())
    }
}

struct FnStage<A, R> {
    id: StageId,
    acquire: A,
    release: R,
}

impl<A, R> Stage for FnStage<A, R>
where
    A: FnMut(&DeviceState) -> Result<Resource, StageError> + Send,
    R: FnMut(&DeviceState, Resource) -> Result<(), StageError> + Send,
{
    fn id(&self) -> StageId {
        self.id
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        (self.acquire)(device)
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        (self.release)(device, resource)
    }
}

/// Build a stage from a pair of closures.
pub fn from_fn<A, R>(id: StageId, acquire: A, release: R) -> Box<dyn Stage>
where
    A: FnMut(&DeviceState) -> Result<Resource, StageError> + Send + 'static,
    R: FnMut(&DeviceState, Resource) -> Result<(), StageError> + Send + 'static,
{
    Box::new(FnStage {
        id,
        acquire,
        release,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_payload_round_trips_through_downcast() {
        let resource = Resource::opaque(42u32);
        assert_eq!(resource.downcast_ref::<u32>(), Some(&42));
        assert!(resource.downcast_ref::<u64>().is_none());
        let resource = resource.downcast::<u64>().expect_err("wrong type");
        assert_eq!(*resource.downcast::<u32>().expect("right type"), 42);
    }

    #[test]
    fn only_engines_and_schedulers_carry_work() {
        assert!(!Resource::empty().carries_work());
        assert!(!Resource::Wakeref.carries_work());
        assert!(Resource::Engines(Vec::new()).carries_work());
        assert_eq!(format!("{:?}", Resource::Wakeref), "wakeref");
    }

    #[test]
    fn stage_ids_display_their_name() {
        assert_eq!(StageId::new("uncore").to_string(), "uncore");
        assert_eq!(StageId::WAKEREF.as_str(), "wakeref");
    }
}
