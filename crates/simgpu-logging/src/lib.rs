//! ---
//! simgpu_section: "03-logging-metrics"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Structured logging adapters and sinks."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Development logging helpers shared by the CLI and the test suites.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for development.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Initialize a subscriber that writes through the libtest capture, for tests.
pub fn init_for_tests() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::DEBUG.into()))
        .with(subscriber_fmt::layer().with_test_writer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Device name associated with the log event.
    pub device: Option<&'a str>,
    /// Bring-up stage associated with the log event.
    pub stage: Option<&'a str>,
    /// Engine associated with the log event.
    pub engine: Option<&'a str>,
    /// Convergence-loop iteration or request sequence number.
    pub seqno: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device name.
    pub fn with_device(mut self, device: &'a str) -> Self {
        self.device = Some(device);
        self
    }

    /// Attach a stage identifier.
    pub fn with_stage(mut self, stage: &'a str) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Attach an engine name.
    pub fn with_engine(mut self, engine: &'a str) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Attach a sequence number.
    pub fn with_seqno(mut self, seqno: u64) -> Self {
        self.seqno = Some(seqno);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event with a success/fault outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let default = LogContext::default();
    let ctx = context.unwrap_or(&default);
    match outcome {
        SystemEventOutcome::Success => tracing::info!(
            event,
            outcome = outcome.as_str(),
            device = ctx.device.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            seqno = ctx.seqno.unwrap_or_default(),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::error!(
            event,
            outcome = outcome.as_str(),
            device = ctx.device.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            engine = ctx.engine.unwrap_or(""),
            seqno = ctx.seqno.unwrap_or_default(),
            message = %message
        ),
    }
}
