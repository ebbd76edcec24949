//! ---
//! simgpu_section: "11-simulation"
//! simgpu_subsection: "module"
//! simgpu_type: "source"
//! simgpu_scope: "code"
//! simgpu_description: "Mock device subsystems and the default stage table."
//! simgpu_version: "v0.0.0-prealpha"
//! simgpu_owner: "tbd"
//! ---
//! Concurrent request producers used to exercise flush convergence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simgpu_common::WorkloadConfig;
use simgpu_core::{DeviceHandle, FlushError, FlushTimeout};
use tracing::{debug, info};

use crate::engine::{mock_engines, MockEngine};
use crate::gem::{AddressSpace, ObjectTracker};
use crate::stages::{ADDRESS_SPACE, GEM_MM};

const OBJECT_SIZE: u64 = 64 << 10;
const INTERIM_FLUSH: FlushTimeout = FlushTimeout::Within(Duration::from_millis(5));

#[derive(Debug, Default)]
struct Tallies {
    submitted: AtomicU64,
    rejected: AtomicU64,
    created: AtomicU64,
    object_faults: AtomicU64,
}

/// Per-producer view of the device.
#[derive(Clone, Copy)]
struct Producer<'a> {
    engines: &'a [&'a MockEngine],
    objects: Option<&'a ObjectTracker>,
    space: Option<&'a AddressSpace>,
    tallies: &'a Tallies,
    max_delay_us: u64,
}

/// Summary of one workload run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadReport {
    pub submitted: u64,
    pub rejected: u64,
    pub objects: u64,
    /// Object puts the GEM tracker refused.
    pub object_faults: u64,
    /// Flushes issued while producers were still running, plus the final one.
    pub flushes: u64,
    pub flush_iterations: u64,
    pub elapsed: Duration,
}

/// Run `config.producers` threads submitting `config.requests` requests in
/// total across the device's engines while this thread keeps flushing, then
/// finish with a flush bounded by `timeout` once every producer is done.
pub fn run_workload(
    handle: &DeviceHandle,
    config: &WorkloadConfig,
    timeout: FlushTimeout,
) -> Result<WorkloadReport> {
    if !handle.is_usable() {
        return Err(anyhow!("device '{}' is not usable", handle.name()));
    }
    let engines = mock_engines(handle.state());
    if engines.is_empty() {
        return Err(anyhow!("device '{}' has no mock engines", handle.name()));
    }
    let producers = config.producers.max(1);
    let tallies = Tallies::default();
    let producer = Producer {
        engines: &engines,
        objects: handle.state().opaque::<ObjectTracker>(GEM_MM),
        space: handle.state().opaque::<AddressSpace>(ADDRESS_SPACE),
        tallies: &tallies,
        max_delay_us: config.max_delay.as_micros() as u64,
    };

    let started = Instant::now();
    let mut report = WorkloadReport::default();

    thread::scope(|scope| -> Result<()> {
        let workers: Vec<_> = (0..producers)
            .map(|index| {
                let share = config.requests / producers
                    + usize::from(index < config.requests % producers);
                let seed = config.seed.wrapping_add(index as u64);
                scope.spawn(move || producer.run(share, seed))
            })
            .collect();

        // Flush alongside the producers; these passes may legitimately time out.
        while !workers.iter().all(|worker| worker.is_finished()) {
            for engine in &engines {
                engine.poll();
            }
            match handle.flush(INTERIM_FLUSH) {
                Ok(flushed) => report.flush_iterations += flushed.iterations,
                Err(FlushError::Timeout { iterations, .. }) => {
                    report.flush_iterations += iterations
                }
                Err(err) => return Err(err.into()),
            }
            report.flushes += 1;
            thread::sleep(Duration::from_micros(200));
        }

        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow!("workload producer panicked"))?;
        }
        Ok(())
    })?;

    let flushed = handle.flush(timeout)?;
    report.flushes += 1;
    report.flush_iterations += flushed.iterations;
    report.submitted = tallies.submitted.into_inner();
    report.rejected = tallies.rejected.into_inner();
    report.objects = tallies.created.into_inner();
    report.object_faults = tallies.object_faults.into_inner();
    report.elapsed = started.elapsed();
    info!(
        device = %handle.name(),
        submitted = report.submitted,
        rejected = report.rejected,
        object_faults = report.object_faults,
        flushes = report.flushes,
        flush_iterations = report.flush_iterations,
        "workload finished"
    );
    Ok(report)
}

impl Producer<'_> {
    fn run(self, requests: usize, seed: u64) {
        // Each producer works inside the default VM for its whole run.
        if let Some(space) = self.space {
            space.vm_get();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..requests {
            let engine = self.engines[rng.gen_range(0..self.engines.len())];
            let delay = Duration::from_micros(rng.gen_range(0..=self.max_delay_us));
            match engine.submit(delay) {
                Ok(_) => {
                    self.tallies.submitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    debug!(error = %err, "submission rejected");
                    self.tallies.rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
            if let Some(objects) = self.objects {
                self.churn_object(objects);
            }
            if rng.gen_bool(0.25) {
                thread::yield_now();
            }
        }
        if let Some(space) = self.space {
            space.vm_put();
        }
    }

    fn churn_object(&self, objects: &ObjectTracker) {
        let handle = match objects.create_object(OBJECT_SIZE) {
            Ok(handle) => handle,
            Err(err) => {
                debug!(error = %err, "object create rejected");
                self.tallies.object_faults.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        self.tallies.created.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = objects.put_object(handle) {
            debug!(handle, error = %err, "object put rejected");
            self.tallies.object_faults.fetch_add(1, Ordering::Relaxed);
        }
    }
}
