//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Shared primitives and utilities for the device harness."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Shared primitives for the simgpu workspace.
//! This crate exposes configuration loading, logging initialisation, and the
//! deadline helpers used by the lifecycle controller.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    DeviceConfig, EngineConfig, FaultConfig, FlushConfig, LoadedDeviceConfig, LoggingConfig,
    MemoryConfig, SchedulerConfig, WorkloadConfig, WorkqueueConfig,
};
pub use logging::{init_tracing, log_file_name, LogFormat, LOG_ENV};
pub use time::Deadline;
