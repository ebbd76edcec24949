//! ---
//! simgpu_section: "01-core-functionality"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Bring-up orchestration and device lifecycle management."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use simgpu_common::time::{duration_to_micros, Deadline};
use tracing::{debug, error, info, trace, warn};

use crate::error::FlushError;
use crate::handle::{DeviceHandle, DeviceState};

/// Upper bound on how long a flush may wait for outstanding work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushTimeout {
    /// Wait as long as needed.
    #[default]
    Unbounded,
    Within(Duration),
}

/// Sentinel for "wait as long as needed".
pub const MAX_SCHEDULE_TIMEOUT: FlushTimeout = FlushTimeout::Unbounded;

impl FlushTimeout {
    pub fn deadline(self) -> Deadline {
        match self {
            FlushTimeout::Unbounded => Deadline::unbounded(),
            FlushTimeout::Within(timeout) => Deadline::after(timeout),
        }
    }
}

impl From<Duration> for FlushTimeout {
    fn from(timeout: Duration) -> Self {
        FlushTimeout::Within(timeout)
    }
}

impl From<Option<Duration>> for FlushTimeout {
    fn from(timeout: Option<Duration>) -> Self {
        timeout.map_or(FlushTimeout::Unbounded, FlushTimeout::Within)
    }
}

/// Outcome of a flush that converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Quiesce-then-retire passes executed; zero when nothing was outstanding.
    pub iterations: u64,
    pub elapsed: Duration,
}

/// Quiesce every committed engine and retire scheduled work until nothing is
/// outstanding or `deadline` passes.
///
/// Producers may keep submitting while this runs, so a single pass is not
/// enough; the loop re-checks after every retirement attempt. Outstanding
/// counts scheduled items plus engines that are still busy.
pub(crate) fn converge(state: &DeviceState, deadline: Deadline) -> Result<FlushReport, FlushError> {
    let started = Instant::now();
    let engines = state.engines();
    let scheduler = state.scheduler();

    let busy_engines = || engines.iter().filter(|engine| !engine.is_idle()).count();
    let scheduled = || scheduler.as_ref().map_or(0, |scheduler| scheduler.outstanding());

    if busy_engines() == 0 && scheduled() == 0 {
        trace!(device = %state.name(), "flush found nothing outstanding");
        return Ok(FlushReport {
            iterations: 0,
            elapsed: started.elapsed(),
        });
    }

    let mut iterations: u64 = 0;
    loop {
        for engine in &engines {
            engine.flush();
        }
        iterations += 1;

        // Engines and scheduler keep separate books; both must be empty.
        let retired_to = match &scheduler {
            Some(scheduler) => scheduler.retire(deadline.remaining()),
            None => 0,
        };
        let outstanding = retired_to + busy_engines();
        if outstanding == 0 {
            let elapsed = started.elapsed();
            debug!(
                device = %state.name(),
                iterations,
                elapsed_us = duration_to_micros(elapsed),
                "flush converged"
            );
            return Ok(FlushReport {
                iterations,
                elapsed,
            });
        }
        if deadline.expired() {
            let waited = started.elapsed();
            warn!(
                device = %state.name(),
                iterations,
                outstanding,
                waited_us = duration_to_micros(waited),
                "flush deadline passed with work outstanding"
            );
            return Err(FlushError::Timeout {
                waited,
                outstanding,
                iterations,
            });
        }
        trace!(device = %state.name(), iterations, outstanding, "flush retrying");
    }
}

#[derive(Debug, Default)]
pub(crate) struct UnwindSummary {
    pub(crate) released: usize,
    pub(crate) faults: usize,
    pub(crate) flush: Option<Result<FlushReport, FlushError>>,
}

impl DeviceHandle {
    /// Drive all engines idle and retire outstanding work, bounded by `timeout`.
    ///
    /// Idempotent; may be called any number of times before [`destroy`](Self::destroy).
    /// A timeout leaves the device intact and destroy remains safe.
    pub fn flush(&self, timeout: impl Into<FlushTimeout>) -> Result<FlushReport, FlushError> {
        if self.state.is_released() {
            return Err(FlushError::Released);
        }
        let result = converge(&self.state, timeout.into().deadline());
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(report) => metrics.observe_flush(report.iterations, false),
                Err(FlushError::Timeout { iterations, .. }) => {
                    metrics.observe_flush(*iterations, true)
                }
                Err(FlushError::Released) => {}
            }
        }
        result
    }

    /// Release every committed stage newest-first. Runs at most once; later
    /// calls are no-ops. Never fails: release faults are logged and skipped.
    pub fn destroy(&mut self) {
        if self.state.is_released() {
            trace!(device = %self.state.name(), "destroy on released device ignored");
            return;
        }
        let fully_committed = self.state.is_usable();
        let summary = self.unwind();
        if let Some(metrics) = &self.metrics {
            metrics.record_teardown();
        }
        info!(
            device = %self.state.name(),
            fully_committed,
            released = summary.released,
            faults = summary.faults,
            flushed = matches!(summary.flush, Some(Ok(_))),
            "device destroyed"
        );
    }

    /// Shared by rollback and destroy: the only difference between them is how
    /// long the committed prefix is.
    pub(crate) fn unwind(&mut self) -> UnwindSummary {
        let mut summary = UnwindSummary::default();
        let teardown_deadline = self.teardown_timeout;
        let DeviceHandle {
            state,
            stages,
            metrics,
            ..
        } = self;

        while let Some((stage_id, carries_work)) = state
            .last_committed()
            .map(|(stage, resource)| (stage, resource.carries_work()))
        {
            if carries_work && summary.flush.is_none() {
                let result = converge(state, teardown_deadline.deadline());
                if let Err(err) = &result {
                    error!(
                        device = %state.name(),
                        stage = %stage_id,
                        error = %err,
                        "teardown flush did not converge; releasing anyway"
                    );
                }
                summary.flush = Some(result);
            }

            let Some((stage_id, resource)) = state.pop_committed() else {
                break;
            };
            let stage = &mut stages[state.committed_len()];
            debug_assert_eq!(stage.id(), stage_id, "committed stages must prefix the table");

            let faulted = match stage.release(state, resource) {
                Ok(()) => {
                    debug!(device = %state.name(), stage = %stage_id, "stage released");
                    false
                }
                Err(err) => {
                    warn!(
                        device = %state.name(),
                        stage = %stage_id,
                        error = %err,
                        "stage release reported a fault; continuing teardown"
                    );
                    summary.faults += 1;
                    true
                }
            };
            summary.released += 1;
            if let Some(metrics) = metrics.as_ref() {
                metrics.record_release(stage_id.as_str(), faulted);
            }
        }

        state.mark_released();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_conversions() {
        assert_eq!(FlushTimeout::default(), MAX_SCHEDULE_TIMEOUT);
        assert_eq!(
            FlushTimeout::from(Duration::from_millis(5)),
            FlushTimeout::Within(Duration::from_millis(5))
        );
        assert_eq!(FlushTimeout::from(None), FlushTimeout::Unbounded);
        assert!(FlushTimeout::Unbounded.deadline().is_unbounded());
        assert!(FlushTimeout::Within(Duration::ZERO).deadline().expired());
    }

    #[test]
    fn empty_device_converges_without_iterating() {
        let state = DeviceState::new("empty".into());
        let report = converge(&state, Deadline::after(Duration::ZERO)).expect("converges");
        assert_eq!(report.iterations, 0);
    }
}
