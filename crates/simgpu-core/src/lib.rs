//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Bring-up orchestration and device lifecycle management."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Bring-up orchestrator and lifecycle controller for simulated devices.
//!
//! A device is assembled from an ordered table of [`Stage`]s. [`bring_up`]
//! acquires them in order and, on the first failure, releases the committed
//! prefix newest-first before reporting the error. A successful bring-up yields
//! a [`DeviceHandle`] whose [`flush`](DeviceHandle::flush) drains in-flight work
//! through a deadline-bounded convergence loop and whose
//! [`destroy`](DeviceHandle::destroy) runs the same reverse unwind exactly once.

pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod orchestrator;
pub mod stage;

pub use error::{BringUpError, FlushError, StageError};
pub use handle::{DeviceHandle, DeviceState};
pub use lifecycle::{FlushReport, FlushTimeout, MAX_SCHEDULE_TIMEOUT};
pub use orchestrator::{bring_up, DeviceBuilder};
pub use stage::{from_fn, Engine, Resource, Scheduler, Stage, StageId, WakerefStage};
