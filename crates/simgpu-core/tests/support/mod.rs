//! ---
//! simgpu_section: "15-testing-qa"
//! simgpu_subsection: "integration-tests"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Recording stage and scheduler doubles for lifecycle tests."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use simgpu_core::{DeviceState, Engine, Resource, Scheduler, Stage, StageError, StageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Acquire(StageId),
    Release(StageId),
}

/// Shared, ordered log of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    observed: Arc<Mutex<Vec<(StageId, Vec<StageId>)>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn releases(&self) -> Vec<StageId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Release(id) => Some(*id),
                Event::Acquire(_) => None,
            })
            .collect()
    }

    pub fn acquires(&self) -> Vec<StageId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Acquire(id) => Some(*id),
                Event::Release(_) => None,
            })
            .collect()
    }

    /// Committed stages each acquire saw, keyed by the acquiring stage.
    pub fn observed_committed(&self, stage: StageId) -> Option<Vec<StageId>> {
        self.observed
            .lock()
            .iter()
            .find(|(id, _)| *id == stage)
            .map(|(_, committed)| committed.clone())
    }

    pub fn stage(&self, id: StageId) -> RecordingStage {
        RecordingStage {
            id,
            recorder: self.clone(),
            fail_acquire: false,
            fail_release: false,
            resource: None,
        }
    }
}

/// Stage double that logs every call and can be told to fail.
pub struct RecordingStage {
    id: StageId,
    recorder: Recorder,
    fail_acquire: bool,
    fail_release: bool,
    resource: Option<Box<dyn FnMut() -> Resource + Send>>,
}

impl RecordingStage {
    pub fn failing(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    pub fn faulty_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn providing(mut self, resource: impl FnMut() -> Resource + Send + 'static) -> Self {
        self.resource = Some(Box::new(resource));
        self
    }

    pub fn boxed(self) -> Box<dyn Stage> {
        Box::new(self)
    }
}

impl Stage for RecordingStage {
    fn id(&self) -> StageId {
        self.id
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        self.recorder.events.lock().push(Event::Acquire(self.id));
        self.recorder
            .observed
            .lock()
            .push((self.id, device.committed_stages()));
        if self.fail_acquire {
            return Err(StageError::new(format!("{} unavailable", self.id)));
        }
        Ok(match self.resource.as_mut() {
            Some(make) => make(),
            None => Resource::opaque(self.id),
        })
    }

    fn release(&mut self, _device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        assert_eq!(
            resource.downcast_ref::<StageId>().copied().unwrap_or(self.id),
            self.id,
            "stage released with another stage's resource"
        );
        self.recorder.events.lock().push(Event::Release(self.id));
        if self.fail_release {
            return Err(StageError::new(format!("{} release fault", self.id)));
        }
        Ok(())
    }
}

/// Build a table of recording stages, failing the one at `fail_at` (0-based).
pub fn table(recorder: &Recorder, ids: &[StageId], fail_at: Option<usize>) -> Vec<Box<dyn Stage>> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| {
            let stage = recorder.stage(*id);
            if Some(index) == fail_at {
                stage.failing().boxed()
            } else {
                stage.boxed()
            }
        })
        .collect()
}

/// Scheduler that retires one item per attempt.
#[derive(Debug)]
pub struct CountdownScheduler {
    outstanding: AtomicUsize,
    attempts: AtomicUsize,
}

impl CountdownScheduler {
    pub fn new(outstanding: usize) -> Arc<Self> {
        Arc::new(Self {
            outstanding: AtomicUsize::new(outstanding),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn outstanding_now(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl Scheduler for CountdownScheduler {
    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn retire(&self, _budget: Option<Duration>) -> usize {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let previous = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scheduler whose work never retires.
#[derive(Debug)]
pub struct StuckScheduler {
    outstanding: usize,
    attempts: AtomicUsize,
}

impl StuckScheduler {
    pub fn new(outstanding: usize) -> Arc<Self> {
        Arc::new(Self {
            outstanding,
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Scheduler for StuckScheduler {
    fn outstanding(&self) -> usize {
        self.outstanding
    }

    fn retire(&self, budget: Option<Duration>) -> usize {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(budget) = budget {
            std::thread::sleep(budget.min(Duration::from_millis(1)));
        }
        self.outstanding
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Engine that counts quiesce requests.
#[derive(Debug, Default)]
pub struct CountingEngine {
    name: String,
    flushes: AtomicUsize,
}

impl CountingEngine {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            flushes: AtomicUsize::new(0),
        })
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl Engine for CountingEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_idle(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Engine that never goes idle.
#[derive(Debug)]
pub struct BusyEngine {
    name: String,
}

impl BusyEngine {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
        })
    }
}

impl Engine for BusyEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn flush(&self) {}

    fn is_idle(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
