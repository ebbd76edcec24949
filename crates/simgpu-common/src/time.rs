//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Shared primitives and utilities for the device harness."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

/// Capture an instant suitable for deadline comparisons.
pub fn monotonic_now() -> Instant {
    Instant::now()
}

/// Convert a duration into microseconds, saturating at `u64::MAX`.
pub fn duration_to_micros(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_mul(1_000_000)
        .saturating_add(u64::from(duration.subsec_micros()))
}

/// Absolute point in time after which a bounded wait gives up.
///
/// An unbounded deadline never expires and reports no remaining budget, which
/// callers treat as "wait as long as needed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Deadline that never expires.
    pub const fn unbounded() -> Self {
        Self { at: None }
    }

    /// Deadline `timeout` from now. Durations too large to represent are unbounded.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: monotonic_now().checked_add(timeout),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.at.is_none()
    }

    /// Time left before expiry; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(monotonic_now()))
    }

    pub fn expired(&self) -> bool {
        match self.at {
            Some(at) => monotonic_now() >= at,
            None => false,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unbounded()
    }
}
