//! Observer plumbing and the periodic tickers that feed it.
//!
//! Tickers only ever read counters and call observers. Nothing in the race
//! depends on them running.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::algorithm::CollisionResult;
use crate::stats::ProgressSnapshot;

pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
pub const ELAPSED_INTERVAL: Duration = Duration::from_secs(1);

/// Receives progress and result notifications.
///
/// Callbacks run on ticker threads and on worker threads; they must not block
/// for long and must not call back into the coordinator's `find_collision`.
pub trait ProgressObserver: Send + Sync {
    fn progress_changed(&self, snapshot: &ProgressSnapshot);

    fn result_found(&self, _result: &CollisionResult) {}
}

#[derive(Clone, Default)]
pub struct Observers {
    inner: Arc<Mutex<Vec<Arc<dyn ProgressObserver>>>>,
}

impl Observers {
    pub fn subscribe(&self, observer: Arc<dyn ProgressObserver>) {
        self.lock().push(observer);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn publish(&self, snapshot: &ProgressSnapshot) {
        for observer in self.current() {
            observer.progress_changed(snapshot);
        }
    }

    pub fn publish_result(&self, result: &CollisionResult) {
        for observer in self.current() {
            observer.result_found(result);
        }
    }

    // Observers are called outside the lock so they may subscribe others.
    fn current(&self) -> Vec<Arc<dyn ProgressObserver>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn ProgressObserver>>> {
        // a panicking observer leaves the list itself intact
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A background thread that runs `tick` every `interval` until stopped.
pub struct Ticker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn start<F>(name: &str, interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Self { stop, handle })
    }

    /// Stops the thread and waits for it; a tick in progress finishes first.
    pub fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.thread().id() != thread::current().id() {
            let _ = self.handle.join();
        }
    }
}

#[derive(Default)]
pub(crate) struct TickerSlot {
    ticker: Mutex<Option<Ticker>>,
}

impl TickerSlot {
    pub(crate) fn replace(&self, ticker: Option<Ticker>) {
        let previous = {
            let mut slot = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *slot, ticker)
        };
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    pub(crate) fn stop(&self) {
        self.replace(None);
    }
}
