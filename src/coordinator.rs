//! Races a pool of collision searches and keeps the first one to finish.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::algorithm::{CollisionAlgorithm, CollisionResult};
use crate::error::CollisionError;
use crate::params::{worker_parameters, SearchParameters};
use crate::stats::ProgressSnapshot;
use crate::telemetry::{Observers, ProgressObserver, Ticker, TickerSlot, PROGRESS_INTERVAL};
use crate::worker::{FinishedCallback, Outcome, WorkerHandle};

#[derive(Default)]
struct RaceSlot {
    winner: Option<usize>,
    failed: usize,
    released: bool,
}

struct Shared<A> {
    instances: Vec<Arc<A>>,
    slot: Mutex<RaceSlot>,
    finished: Condvar,
    observers: Observers,
}

impl<A: CollisionAlgorithm> Shared<A> {
    fn lock(&self) -> MutexGuard<'_, RaceSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::aggregate(self.instances.iter().map(|i| i.snapshot()))
    }

    fn release(&self) {
        self.lock().released = true;
        self.finished.notify_all();
    }

    fn signal_work_is_finished(&self, worker: usize) -> bool {
        if worker >= self.instances.len() {
            warn!(worker, "finish signal from unknown worker ignored");
            return false;
        }
        {
            let mut slot = self.lock();
            if slot.winner.is_some() || slot.released {
                return false;
            }
            slot.winner = Some(worker);
        }
        // The slot is claimed; stopping happens outside the lock so observers
        // running on ticker threads may read the coordinator meanwhile.
        info!(worker, "worker finished first");
        self.observers.publish(&self.snapshot());
        for instance in &self.instances {
            instance.stop();
        }
        self.release();
        true
    }

    fn worker_failed(&self, worker: usize) {
        let all_failed = {
            let mut slot = self.lock();
            slot.failed += 1;
            slot.failed == self.instances.len() && slot.winner.is_none() && !slot.released
        };
        warn!(worker, "worker dropped out of the race");
        if all_failed {
            error!(workers = self.instances.len(), "every worker failed");
            self.release();
        }
    }

    fn on_finished(&self, worker: usize, outcome: Outcome) {
        match outcome {
            Outcome::Returned => {
                if !self.signal_work_is_finished(worker) {
                    debug!(worker, "worker finished after the race was decided");
                }
            }
            Outcome::Panicked => self.worker_failed(worker),
        }
    }
}

/// Owns N search instances, races them and returns the winner's result.
///
/// Instances and worker handles live as long as the coordinator and are
/// reused by every call to [`find_collision`](Self::find_collision).
pub struct CollisionCoordinator<A: CollisionAlgorithm + 'static> {
    shared: Arc<Shared<A>>,
    workers: Vec<WorkerHandle<A>>,
    running: AtomicBool,
    aggregate_ticker: TickerSlot,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<A: CollisionAlgorithm + 'static> CollisionCoordinator<A> {
    /// One instance per logical CPU, at least one.
    pub fn new<F: FnMut(usize) -> A>(factory: F) -> Self {
        Self::with_workers(num_cpus::get().max(1), factory)
    }

    pub fn with_workers<F: FnMut(usize) -> A>(count: usize, factory: F) -> Self {
        Self::with_instances((0..count).map(factory).collect())
    }

    pub fn with_instances(instances: Vec<A>) -> Self {
        let shared = Arc::new(Shared {
            instances: instances.into_iter().map(Arc::new).collect(),
            slot: Mutex::new(RaceSlot::default()),
            finished: Condvar::new(),
            observers: Observers::default(),
        });
        let workers = shared
            .instances
            .iter()
            .enumerate()
            .map(|(index, instance)| {
                let race = Arc::clone(&shared);
                let on_finished: FinishedCallback =
                    Arc::new(move |worker, outcome| race.on_finished(worker, outcome));
                WorkerHandle::new(index, Arc::clone(instance), on_finished)
            })
            .collect();
        Self {
            shared,
            workers,
            running: AtomicBool::new(false),
            aggregate_ticker: TickerSlot::default(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn instances(&self) -> &[Arc<A>] {
        &self.shared.instances
    }

    pub fn subscribe(&self, observer: Arc<dyn ProgressObserver>) {
        self.shared.observers.subscribe(observer);
    }

    /// Runs every instance against `params` and blocks until one finishes.
    ///
    /// Returns the winner's result, or `Ok(None)` when the winner returned
    /// without one (the race was stopped). There is no timeout.
    pub fn find_collision(
        &self,
        params: &SearchParameters,
    ) -> Result<Option<CollisionResult>, CollisionError> {
        if self.workers.is_empty() {
            return Err(CollisionError::NoWorkers);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CollisionError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        // losers of the previous race must be gone before their flags are rearmed
        self.join_workers();
        for instance in &self.shared.instances {
            instance.reset();
        }
        *self.shared.lock() = RaceSlot::default();

        info!(
            workers = self.workers.len(),
            target = %params.target_state(),
            seeded = params.seed.is_some(),
            "collision search started"
        );
        self.start_aggregate_ticker();

        let per_worker = worker_parameters(params, self.workers.len());
        for (worker, worker_params) in self.workers.iter().zip(per_worker) {
            if let Err(e) = worker.start_work(worker_params) {
                error!(worker = worker.index(), error = %e, "failed to start worker");
                self.stop();
                return Err(e);
            }
        }

        let winner = {
            let slot = self.shared.lock();
            let slot = self
                .shared
                .finished
                .wait_while(slot, |slot| !slot.released)
                .unwrap_or_else(|e| e.into_inner());
            slot.winner
        };

        self.aggregate_ticker.stop();
        let snapshot = self.snapshot();
        self.shared.observers.publish(&snapshot);

        let Some(winner) = winner else {
            return Err(CollisionError::AllWorkersFailed {
                workers: self.workers.len(),
            });
        };
        let result = self.shared.instances[winner].collision_result();
        info!(
            winner,
            found = result.is_some(),
            tried = snapshot.combinations_tried,
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            "collision search finished"
        );
        if let Some(result) = &result {
            self.shared.observers.publish_result(result);
        }
        Ok(result)
    }

    /// Records `worker` as the winner unless one exists, then stops every
    /// instance and wakes `find_collision`. Returns whether it won.
    pub fn signal_work_is_finished(&self, worker: usize) -> bool {
        self.shared.signal_work_is_finished(worker)
    }

    /// Stops every instance. The blocked `find_collision` returns once a
    /// stopped worker reports back.
    pub fn stop(&self) {
        debug!("stopping all workers");
        for instance in &self.shared.instances {
            instance.stop();
        }
        self.aggregate_ticker.stop();
    }

    pub fn join_workers(&self) {
        for worker in &self.workers {
            worker.join();
        }
    }

    pub fn winner(&self) -> Option<usize> {
        self.shared.lock().winner
    }

    pub fn collision_result(&self) -> Option<CollisionResult> {
        self.winner()
            .and_then(|winner| self.shared.instances[winner].collision_result())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.shared.snapshot()
    }

    pub fn combinations_tried(&self) -> u64 {
        self.snapshot().combinations_tried
    }

    pub fn match_progress(&self) -> u32 {
        self.snapshot().match_progress
    }

    pub fn match_progress_max(&self) -> u32 {
        self.snapshot().match_progress_max
    }

    pub fn elapsed_time(&self) -> Duration {
        self.snapshot().elapsed
    }

    fn start_aggregate_ticker(&self) {
        if self.shared.observers.is_empty() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        match Ticker::start("md5-aggregate", PROGRESS_INTERVAL, move || {
            shared.observers.publish(&shared.snapshot())
        }) {
            Ok(ticker) => self.aggregate_ticker.replace(Some(ticker)),
            Err(e) => warn!(error = %e, "aggregate progress ticker not started"),
        }
    }
}

impl<A: CollisionAlgorithm + 'static> Drop for CollisionCoordinator<A> {
    fn drop(&mut self) {
        self.stop();
        self.join_workers();
    }
}
