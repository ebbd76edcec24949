//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use simgpu_core::{DeviceState, Resource, Scheduler, Stage, StageError, StageId};
use tracing::{debug, trace, warn};

use crate::platform::DeviceParams;
use crate::stages::{require, PARAMS, SCHEDULER, WORKQUEUE};
use crate::workqueue::Workqueue;

/// Longest single wait inside [`MockScheduler::retire`]. Keeps an unbounded
/// retire responsive to work that only a fresh engine flush will complete.
pub const RETIRE_SLICE: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct TrackerState {
    next_seqno: u64,
    tracked: u64,
    completed: u64,
    retired: u64,
}

impl TrackerState {
    fn outstanding(&self) -> usize {
        (self.tracked - self.retired) as usize
    }
}

/// Sequence-numbered request bookkeeping shared by engines and the scheduler.
///
/// A request is outstanding from [`track`](Self::track) until it has both
/// completed and been retired.
#[derive(Debug, Default)]
pub struct RequestTracker {
    state: Mutex<TrackerState>,
    completions: Condvar,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new request; returns its sequence number.
    pub fn track(&self) -> u64 {
        let mut state = self.state.lock();
        state.next_seqno += 1;
        state.tracked += 1;
        state.next_seqno
    }

    /// Record completions and wake any waiting retirer.
    pub fn complete(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut state = self.state.lock();
        state.completed += count as u64;
        debug_assert!(state.completed <= state.tracked, "completed more than tracked");
        drop(state);
        self.completions.notify_all();
    }

    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding()
    }

    pub fn retired(&self) -> u64 {
        self.state.lock().retired
    }

    /// Retire completed requests, then wait up to `wait` for more completions
    /// if any are still in flight.
    pub fn retire(&self, wait: Duration) -> usize {
        let mut state = self.state.lock();
        state.retired = state.completed;
        if state.outstanding() > 0 && !wait.is_zero() {
            let _ = self.completions.wait_for(&mut state, wait);
            state.retired = state.completed;
        }
        state.outstanding()
    }
}

/// Scheduler bound to the device workqueue with a fixed number of priority levels.
#[derive(Debug)]
pub struct MockScheduler {
    tracker: Arc<RequestTracker>,
    workqueue: Arc<Workqueue>,
    priority_levels: u32,
}

impl MockScheduler {
    pub fn new(workqueue: Arc<Workqueue>, priority_levels: u32) -> Self {
        Self {
            tracker: Arc::new(RequestTracker::new()),
            workqueue,
            priority_levels,
        }
    }

    pub fn tracker(&self) -> Arc<RequestTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn priority_levels(&self) -> u32 {
        self.priority_levels
    }

    pub fn workqueue(&self) -> &Arc<Workqueue> {
        &self.workqueue
    }
}

impl Scheduler for MockScheduler {
    fn outstanding(&self) -> usize {
        self.tracker.outstanding()
    }

    fn retire(&self, budget: Option<Duration>) -> usize {
        let wait = budget.map_or(RETIRE_SLICE, |budget| budget.min(RETIRE_SLICE));
        let outstanding = self.tracker.retire(wait);
        // Retirement frees request state through the bound workqueue.
        self.workqueue.drain();
        trace!(outstanding, "scheduler retire pass");
        outstanding
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
pub struct SchedulerStage;

impl Stage for SchedulerStage {
    fn id(&self) -> StageId {
        SCHEDULER
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        let workqueue = require::<Arc<Workqueue>>(device, WORKQUEUE, SCHEDULER)?;
        let params = require::<DeviceParams>(device, PARAMS, SCHEDULER)?;
        if params.priority_levels == 0 {
            return Err(StageError::new("scheduler needs at least one priority level"));
        }
        debug!(
            device = %device.name(),
            workqueue = %workqueue.name(),
            priority_levels = params.priority_levels,
            "scheduler created"
        );
        Ok(Resource::Scheduler(Arc::new(MockScheduler::new(
            Arc::clone(workqueue),
            params.priority_levels,
        ))))
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let scheduler = match resource {
            Resource::Scheduler(scheduler) => scheduler,
            other => {
                return Err(StageError::new(format!(
                    "scheduler stage handed a {} resource",
                    other.kind()
                )))
            }
        };
        let outstanding = scheduler.outstanding();
        if outstanding > 0 {
            warn!(device = %device.name(), outstanding, "scheduler destroyed with requests in flight");
            return Err(StageError::new(format!(
                "scheduler destroyed with {} request(s) outstanding",
                outstanding
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_stay_outstanding_until_completed_and_retired() {
        let tracker = RequestTracker::new();
        assert_eq!(tracker.track(), 1);
        assert_eq!(tracker.track(), 2);
        assert_eq!(tracker.outstanding(), 2);

        tracker.complete(1);
        assert_eq!(tracker.outstanding(), 2, "completion alone does not retire");
        assert_eq!(tracker.retire(Duration::ZERO), 1);

        tracker.complete(1);
        assert_eq!(tracker.retire(Duration::ZERO), 0);
        assert_eq!(tracker.retired(), 2);
    }

    #[test]
    fn retire_waits_for_a_completion_from_another_thread() {
        let tracker = Arc::new(RequestTracker::new());
        tracker.track();
        let completer = Arc::clone(&tracker);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            completer.complete(1);
        });
        let mut outstanding = tracker.outstanding();
        while outstanding > 0 {
            outstanding = tracker.retire(Duration::from_millis(50));
        }
        handle.join().expect("completer thread");
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn scheduler_retire_drains_its_workqueue() {
        let workqueue = Arc::new(Workqueue::new("simgpu-test"));
        let scheduler = MockScheduler::new(Arc::clone(&workqueue), 3);
        workqueue.queue(|| {});
        assert_eq!(scheduler.retire(Some(Duration::ZERO)), 0);
        assert_eq!(workqueue.pending(), 0);
        assert_eq!(scheduler.priority_levels(), 3);
    }
}
