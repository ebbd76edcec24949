//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use simgpu_core::{DeviceState, Resource, Stage, StageError, StageId};
use tracing::{debug, trace, warn};

use crate::stages::WORKQUEUE;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Unbound, named queue of deferred jobs. Jobs run on whichever thread drains.
pub struct Workqueue {
    name: String,
    jobs: Mutex<VecDeque<Job>>,
    closed: AtomicBool,
    executed: AtomicU64,
}

impl Workqueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            executed: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job. Returns `false` once the queue has been destroyed.
    pub fn queue<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.jobs.lock().push_back(Box::new(job));
        true
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Run queued jobs until the queue is empty, including jobs queued by
    /// the jobs themselves. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            // The lock is not held while a job runs so jobs may queue more work.
            let job = self.jobs.lock().pop_front();
            let Some(job) = job else {
                break;
            };
            job();
            ran += 1;
        }
        if ran > 0 {
            self.executed.fetch_add(ran as u64, Ordering::Relaxed);
            trace!(workqueue = %self.name, ran, "workqueue drained");
        }
        ran
    }

    fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        self.drain()
    }
}

impl fmt::Debug for Workqueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workqueue")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Allocates the device workqueue, registered as `Arc<Workqueue>`.
#[derive(Debug)]
pub struct WorkqueueStage {
    name: String,
}

impl WorkqueueStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Stage for WorkqueueStage {
    fn id(&self) -> StageId {
        WORKQUEUE
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        debug!(device = %device.name(), workqueue = %self.name, "workqueue allocated");
        Ok(Resource::opaque(Arc::new(Workqueue::new(self.name.clone()))))
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let workqueue = resource
            .downcast::<Arc<Workqueue>>()
            .map_err(|other| StageError::new(format!("unexpected {} resource", other.kind())))?;
        let flushed = workqueue.close();
        if flushed > 0 {
            warn!(
                device = %device.name(),
                workqueue = %workqueue.name(),
                flushed,
                "jobs were still queued at workqueue destruction"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn drain_runs_jobs_queued_by_jobs() {
        let wq = Arc::new(Workqueue::new("simgpu-test"));
        let hits = Arc::new(AtomicUsize::new(0));
        let inner_wq = Arc::clone(&wq);
        let inner_hits = Arc::clone(&hits);
        assert!(wq.queue(move || {
            inner_hits.fetch_add(1, Ordering::SeqCst);
            let hits = Arc::clone(&inner_hits);
            inner_wq.queue(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }));
        assert_eq!(wq.drain(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(wq.pending(), 0);
        assert_eq!(wq.executed(), 2);
    }

    #[test]
    fn closed_queue_rejects_new_jobs() {
        let wq = Workqueue::new("simgpu-test");
        assert!(wq.queue(|| {}));
        assert_eq!(wq.close(), 1);
        assert!(!wq.queue(|| {}));
    }
}
