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
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use simgpu_core::{DeviceState, Engine, Resource, Stage, StageError, StageId};
use simgpu_logging::{sg_debug, LogContext};
use thiserror::Error;
use tracing::warn;

use crate::platform::DeviceParams;
use crate::scheduler::{MockScheduler, RequestTracker};
use crate::stages::{require, ENGINE_CONSTRUCT, ENGINE_INIT, PARAMS};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("engine {engine} is not initialised")]
    NotInitialised { engine: String },
    #[error("engine {engine} is not registered for submission")]
    NotRegistered { engine: String },
}

#[derive(Debug, Clone, Copy)]
struct Request {
    seqno: u64,
    ready_at: Instant,
}

/// Simulated execution engine. Requests complete on their own once their
/// delay has passed and [`poll`](Self::poll) runs, or immediately on flush.
pub struct MockEngine {
    name: String,
    tracker: Arc<RequestTracker>,
    queue: Mutex<VecDeque<Request>>,
    initialised: AtomicBool,
    registered: AtomicBool,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl MockEngine {
    pub fn new(name: impl Into<String>, tracker: Arc<RequestTracker>) -> Self {
        Self {
            name: name.into(),
            tracker,
            queue: Mutex::new(VecDeque::new()),
            initialised: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Queue a request that becomes complete after `delay`. Safe from any thread.
    pub fn submit(&self, delay: Duration) -> Result<u64, SubmitError> {
        if !self.initialised.load(Ordering::Acquire) {
            return Err(SubmitError::NotInitialised {
                engine: self.name.clone(),
            });
        }
        if !self.registered.load(Ordering::Acquire) {
            return Err(SubmitError::NotRegistered {
                engine: self.name.clone(),
            });
        }
        let mut queue = self.queue.lock();
        let seqno = self.tracker.track();
        queue.push_back(Request {
            seqno,
            ready_at: Instant::now() + delay,
        });
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(seqno)
    }

    /// Complete every request whose delay has elapsed.
    pub fn poll(&self) -> usize {
        let now = Instant::now();
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|request| request.ready_at > now);
        let done = before - queue.len();
        drop(queue);
        self.finish(done);
        done
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::Acquire)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn init(&self) {
        self.initialised.store(true, Ordering::Release);
    }

    pub(crate) fn fini(&self) {
        self.initialised.store(false, Ordering::Release);
    }

    pub(crate) fn register(&self) {
        self.registered.store(true, Ordering::Release);
    }

    pub(crate) fn unregister(&self) {
        self.registered.store(false, Ordering::Release);
    }

    fn finish(&self, done: usize) {
        if done == 0 {
            return;
        }
        self.completed.fetch_add(done as u64, Ordering::Relaxed);
        self.tracker.complete(done);
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn flush(&self) {
        let drained: Vec<Request> = self.queue.lock().drain(..).collect();
        if let Some(last) = drained.last() {
            sg_debug!(
                context = LogContext::new().with_engine(&self.name).with_seqno(last.seqno),
                "engine flushed {} request(s)",
                drained.len()
            );
        }
        self.finish(drained.len());
    }

    fn is_idle(&self) -> bool {
        self.queue.lock().is_empty()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockEngine")
            .field("name", &self.name)
            .field("queued", &self.queued())
            .field("initialised", &self.is_initialised())
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Mock engines committed by `engine_construct`, in configured order.
pub fn mock_engines(device: &DeviceState) -> Vec<&MockEngine> {
    match device.resource(ENGINE_CONSTRUCT) {
        Some(Resource::Engines(engines)) => engines
            .iter()
            .filter_map(|engine| engine.as_any().downcast_ref::<MockEngine>())
            .collect(),
        _ => Vec::new(),
    }
}

/// Creates one mock engine per configured engine, sharing the scheduler's tracker.
#[derive(Debug, Default)]
pub struct EngineConstructStage;

impl Stage for EngineConstructStage {
    fn id(&self) -> StageId {
        ENGINE_CONSTRUCT
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        let params = require::<DeviceParams>(device, PARAMS, ENGINE_CONSTRUCT)?;
        let scheduler = device
            .scheduler()
            .ok_or_else(|| StageError::new("engines need a committed scheduler"))?;
        let Some(scheduler) = scheduler.as_any().downcast_ref::<MockScheduler>() else {
            return Err(StageError::new("engines need the mock scheduler"));
        };
        let tracker = scheduler.tracker();
        let engines: Vec<Arc<dyn Engine>> = params
            .engines
            .iter()
            .map(|name| {
                Arc::new(MockEngine::new(name.clone(), Arc::clone(&tracker))) as Arc<dyn Engine>
            })
            .collect();
        sg_debug!(
            context = LogContext::new()
                .with_device(device.name())
                .with_stage(ENGINE_CONSTRUCT.as_str()),
            "constructed {} engine(s)",
            engines.len()
        );
        Ok(Resource::Engines(engines))
    }

    fn release(&mut self, device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        let engines = match resource {
            Resource::Engines(engines) => engines,
            other => {
                return Err(StageError::new(format!(
                    "engine stage handed a {} resource",
                    other.kind()
                )))
            }
        };
        let busy: Vec<&str> = engines
            .iter()
            .filter(|engine| !engine.is_idle())
            .map(|engine| engine.name())
            .collect();
        if !busy.is_empty() {
            warn!(device = %device.name(), engines = ?busy, "engines destroyed while busy");
            return Err(StageError::new(format!(
                "engines destroyed while busy: {}",
                busy.join(", ")
            )));
        }
        Ok(())
    }
}

/// Initialises the constructed engines. Registers them again so teardown
/// drains outstanding work before they are finalised.
#[derive(Debug, Default)]
pub struct EngineInitStage;

impl Stage for EngineInitStage {
    fn id(&self) -> StageId {
        ENGINE_INIT
    }

    fn acquire(&mut self, device: &DeviceState) -> Result<Resource, StageError> {
        let Some(Resource::Engines(engines)) = device.resource(ENGINE_CONSTRUCT) else {
            return Err(StageError::new("no constructed engines to initialise"));
        };
        for engine in engines {
            if let Some(engine) = engine.as_any().downcast_ref::<MockEngine>() {
                engine.init();
            }
        }
        Ok(Resource::Engines(engines.clone()))
    }

    fn release(&mut self, _device: &DeviceState, resource: Resource) -> Result<(), StageError> {
        if let Resource::Engines(engines) = &resource {
            for engine in engines {
                if let Some(engine) = engine.as_any().downcast_ref::<MockEngine>() {
                    engine.fini();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_engine(tracker: &Arc<RequestTracker>) -> MockEngine {
        let engine = MockEngine::new("rcs0", Arc::clone(tracker));
        engine.init();
        engine.register();
        engine
    }

    #[test]
    fn submit_requires_init_and_registration() {
        let tracker = Arc::new(RequestTracker::new());
        let engine = MockEngine::new("vcs0", Arc::clone(&tracker));
        assert!(matches!(
            engine.submit(Duration::ZERO),
            Err(SubmitError::NotInitialised { .. })
        ));
        engine.init();
        assert_eq!(
            engine.submit(Duration::ZERO),
            Err(SubmitError::NotRegistered {
                engine: "vcs0".to_owned()
            })
        );
        engine.register();
        assert_eq!(engine.submit(Duration::ZERO), Ok(1));
    }

    #[test]
    fn flush_completes_everything_queued() {
        let tracker = Arc::new(RequestTracker::new());
        let engine = ready_engine(&tracker);
        for _ in 0..3 {
            engine.submit(Duration::from_secs(60)).expect("submit");
        }
        assert!(!engine.is_idle());
        assert_eq!(engine.poll(), 0, "nothing is due yet");

        engine.flush();
        assert!(engine.is_idle());
        assert_eq!(engine.completed(), 3);
        assert_eq!(tracker.retire(Duration::ZERO), 0);
    }

    #[test]
    fn poll_completes_only_due_requests() {
        let tracker = Arc::new(RequestTracker::new());
        let engine = ready_engine(&tracker);
        engine.submit(Duration::ZERO).expect("submit");
        engine.submit(Duration::from_secs(60)).expect("submit");
        assert_eq!(engine.poll(), 1);
        assert_eq!(engine.queued(), 1);
    }
}
