//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Mock collaborators for the simulated GPU device.
//!
//! [`stage_table`] assembles the declared bring-up order from a
//! [`DeviceConfig`](simgpu_common::DeviceConfig); [`bring_up_mock`] hands it to
//! the core orchestrator.

pub mod activation;
pub mod device;
pub mod engine;
pub mod faults;
pub mod gem;
pub mod platform;
pub mod scheduler;
pub mod stages;
pub mod workload;
pub mod workqueue;

pub use activation::Activation;
pub use device::{bring_up_mock, stage_table};
pub use engine::{mock_engines, MockEngine, SubmitError};
pub use faults::FaultInjector;
pub use gem::{AddressSpace, GemError, ObjectTracker};
pub use platform::{DeviceParams, GtInfo, HostDevice, MemoryRegion, ModeConfig, PowerDomain, Uncore};
pub use scheduler::{MockScheduler, RequestTracker};
pub use stages::DECLARED_ORDER;
pub use workload::{run_workload, WorkloadReport};
pub use workqueue::Workqueue;
