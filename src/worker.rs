use core::sync::atomic::{AtomicBool, Ordering};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::error;

use crate::algorithm::CollisionAlgorithm;
use crate::error::CollisionError;
use crate::params::SearchParameters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Returned,
    Panicked,
}

/// Called once per started search, on the worker thread, after it ends.
pub type FinishedCallback = Arc<dyn Fn(usize, Outcome) + Send + Sync>;

/// Runs one algorithm instance on its own background thread.
pub struct WorkerHandle<A> {
    index: usize,
    algorithm: Arc<A>,
    on_finished: FinishedCallback,
    started: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<A: CollisionAlgorithm + 'static> WorkerHandle<A> {
    pub fn new(index: usize, algorithm: Arc<A>, on_finished: FinishedCallback) -> Self {
        Self {
            index,
            algorithm,
            on_finished,
            started: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn algorithm(&self) -> &Arc<A> {
        &self.algorithm
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Starts `find_collision` on a fresh thread. The finished callback runs
    /// exactly once when it ends, whatever the outcome.
    pub fn start_work(&self, params: SearchParameters) -> Result<(), CollisionError> {
        let mut slot = self.thread.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_started() {
            return Err(CollisionError::WorkerBusy(self.index));
        }
        if let Some(previous) = slot.take() {
            let _ = previous.join();
        }

        self.started.store(true, Ordering::SeqCst);
        let index = self.index;
        let algorithm = Arc::clone(&self.algorithm);
        let on_finished = Arc::clone(&self.on_finished);
        let started = Arc::clone(&self.started);
        let spawned = thread::Builder::new()
            .name(format!("md5-worker-{}", index))
            .spawn(move || {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
                    algorithm.find_collision(&params)
                })) {
                    Ok(_) => Outcome::Returned,
                    Err(payload) => {
                        error!(
                            worker = index,
                            reason = panic_message(payload.as_ref()),
                            "collision strategy panicked"
                        );
                        Outcome::Panicked
                    }
                };
                started.store(false, Ordering::SeqCst);
                on_finished(index, outcome);
            });

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                Err(CollisionError::Spawn(e))
            }
        }
    }

    pub fn join(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}
