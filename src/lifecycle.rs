//! Shared scaffolding around a [`SearchStrategy`]: seed and target defaults,
//! attempt counting, elapsed time, periodic progress notifications and the
//! stop flag.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};

use crate::algorithm::{CollisionAlgorithm, CollisionResult, SearchContext, SearchStrategy};
use crate::params::{SearchInput, SearchParameters};
use crate::stats::{AtomicStats, ProgressSnapshot};
use crate::telemetry::{
    Observers, ProgressObserver, Ticker, TickerSlot, ELAPSED_INTERVAL, PROGRESS_INTERVAL,
};

pub struct Algorithm<S: SearchStrategy> {
    strategy: S,
    stats: Arc<AtomicStats>,
    stopped: AtomicBool,
    result: Mutex<Option<CollisionResult>>,
    observers: Observers,
    progress_ticker: TickerSlot,
    elapsed_ticker: TickerSlot,
}

impl<S: SearchStrategy> Algorithm<S> {
    pub fn new(strategy: S) -> Self {
        let stats = Arc::new(AtomicStats::default());
        stats.reset(strategy.match_progress_max());
        Self {
            strategy,
            stats,
            stopped: AtomicBool::new(false),
            result: Mutex::new(None),
            observers: Observers::default(),
            progress_ticker: TickerSlot::default(),
            elapsed_ticker: TickerSlot::default(),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn subscribe(&self, observer: Arc<dyn ProgressObserver>) {
        self.observers.subscribe(observer);
    }

    fn start_tickers(&self, start: Instant) {
        let stats = Arc::clone(&self.stats);
        match Ticker::start("md5-elapsed", ELAPSED_INTERVAL, move || {
            stats.set_elapsed(start.elapsed())
        }) {
            Ok(ticker) => self.elapsed_ticker.replace(Some(ticker)),
            Err(e) => warn!(error = %e, "elapsed-time ticker not started"),
        }

        if self.observers.is_empty() {
            return;
        }
        let stats = Arc::clone(&self.stats);
        let observers = self.observers.clone();
        match Ticker::start("md5-progress", PROGRESS_INTERVAL, move || {
            observers.publish(&stats.report())
        }) {
            Ok(ticker) => self.progress_ticker.replace(Some(ticker)),
            Err(e) => warn!(error = %e, "progress ticker not started"),
        }
    }

    fn stop_tickers(&self) {
        self.progress_ticker.stop();
        self.elapsed_ticker.stop();
    }

    fn store_result(&self, result: Option<CollisionResult>) {
        *self.result.lock().unwrap_or_else(|e| e.into_inner()) = result;
    }
}

/// Stops the tickers even when the strategy panics.
struct TickerGuard<'a, S: SearchStrategy>(&'a Algorithm<S>);

impl<S: SearchStrategy> Drop for TickerGuard<'_, S> {
    fn drop(&mut self) {
        self.0.stop_tickers();
    }
}

impl<S: SearchStrategy> CollisionAlgorithm for Algorithm<S> {
    fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        self.stats.reset(self.strategy.match_progress_max());
        self.store_result(None);
    }

    fn find_collision(&self, params: &SearchParameters) -> Option<CollisionResult> {
        self.stats.reset(self.strategy.match_progress_max());
        self.store_result(None);
        let input = SearchInput::resolve(params);
        debug!(
            seed = %hex::encode(&input.seed),
            target = %input.target,
            "search started"
        );

        let start = Instant::now();
        let result = {
            let _guard = TickerGuard(self);
            self.start_tickers(start);
            if self.stopped.load(Ordering::SeqCst) {
                None
            } else {
                let ctx = SearchContext {
                    stats: &self.stats,
                    stopped: &self.stopped,
                };
                self.strategy.search(&input, &ctx)
            }
        };

        self.stats.set_elapsed(start.elapsed());
        self.store_result(result.clone());
        let snapshot = self.stats.report();
        debug!(
            found = result.is_some(),
            tried = snapshot.combinations_tried,
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            "search returned"
        );
        self.observers.publish(&snapshot);
        if let Some(result) = &result {
            self.observers.publish_result(result);
        }
        result
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.strategy.on_stop();
        self.stop_tickers();
    }

    fn collision_result(&self) -> Option<CollisionResult> {
        self.result.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn snapshot(&self) -> ProgressSnapshot {
        self.stats.report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::md5::{HashState, MD5_IV};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Records what it was given, fails `attempts` times and then succeeds.
    struct Recording {
        attempts: u32,
        seen: Mutex<Option<SearchInput>>,
        stops: AtomicUsize,
    }

    impl Recording {
        fn new(attempts: u32) -> Self {
            Self {
                attempts,
                seen: Mutex::new(None),
                stops: AtomicUsize::new(0),
            }
        }
    }

    impl SearchStrategy for Recording {
        fn match_progress_max(&self) -> u32 {
            8
        }

        fn search(&self, input: &SearchInput, ctx: &SearchContext<'_>) -> Option<CollisionResult> {
            *self.seen.lock().unwrap() = Some(input.clone());
            for i in 0..self.attempts {
                ctx.log_return(i);
            }
            Some(CollisionResult::new([1; 64], [2; 64]))
        }

        fn on_stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Spins until stopped.
    struct Spinner;

    impl SearchStrategy for Spinner {
        fn match_progress_max(&self) -> u32 {
            1
        }

        fn search(&self, _input: &SearchInput, ctx: &SearchContext<'_>) -> Option<CollisionResult> {
            while !ctx.is_stopped() {
                ctx.log_return(0);
                std::thread::yield_now();
            }
            None
        }
    }

    struct Panicking;

    impl SearchStrategy for Panicking {
        fn match_progress_max(&self) -> u32 {
            1
        }

        fn search(&self, _input: &SearchInput, _ctx: &SearchContext<'_>) -> Option<CollisionResult> {
            panic!("strategy blew up");
        }
    }

    #[derive(Default)]
    struct Collect {
        snapshots: Mutex<Vec<ProgressSnapshot>>,
        results: AtomicUsize,
    }

    impl ProgressObserver for Collect {
        fn progress_changed(&self, snapshot: &ProgressSnapshot) {
            self.snapshots.lock().unwrap().push(*snapshot);
        }

        fn result_found(&self, _result: &CollisionResult) {
            self.results.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counts_attempts_and_publishes_final_snapshot() {
        let algorithm = Algorithm::new(Recording::new(10));
        let observer = Arc::new(Collect::default());
        algorithm.subscribe(observer.clone());

        let result = algorithm.find_collision(&SearchParameters::new().with_seed(vec![1, 2]));
        assert_eq!(result, Some(CollisionResult::new([1; 64], [2; 64])));
        assert_eq!(algorithm.collision_result(), result);
        assert_eq!(algorithm.combinations_tried(), 10);
        assert_eq!(algorithm.match_progress(), 8);
        assert_eq!(algorithm.match_progress_max(), 8);

        let snapshots = observer.snapshots.lock().unwrap();
        let last = snapshots.last().expect("final snapshot");
        assert_eq!(last.combinations_tried, 10);
        assert_eq!(observer.results.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn progress_is_published_while_searching() {
        let algorithm = Arc::new(Algorithm::new(Spinner));
        let observer = Arc::new(Collect::default());
        algorithm.subscribe(observer.clone());
        let runner = {
            let algorithm = Arc::clone(&algorithm);
            std::thread::spawn(move || algorithm.find_collision(&SearchParameters::new()))
        };

        while !observer
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.combinations_tried > 0)
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        algorithm.stop();
        assert_eq!(runner.join().unwrap(), None);

        // at least one tick plus the final snapshot
        assert!(observer.snapshots.lock().unwrap().len() > 1);
        assert_eq!(observer.results.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn defaults_are_filled_in() {
        let algorithm = Algorithm::new(Recording::new(0));
        algorithm.find_collision(&SearchParameters::new().with_target_bytes(Some(&[1; 5])));
        let seen = algorithm.strategy().seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.target, MD5_IV);
        assert_eq!(seen.seed.len(), crate::params::GENERATED_SEED_LEN);

        let target = HashState([9, 8, 7, 6]);
        algorithm.find_collision(&SearchParameters::new().with_seed(vec![4]).with_target(target));
        let seen = algorithm.strategy().seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.target, target);
        assert_eq!(seen.seed, vec![4]);
    }

    #[test]
    fn counter_resets_between_searches() {
        let algorithm = Algorithm::new(Recording::new(3));
        algorithm.find_collision(&SearchParameters::new());
        algorithm.find_collision(&SearchParameters::new());
        assert_eq!(algorithm.combinations_tried(), 3);
    }

    #[test]
    fn stop_interrupts_a_running_search() {
        let algorithm = Arc::new(Algorithm::new(Spinner));
        let runner = {
            let algorithm = Arc::clone(&algorithm);
            std::thread::spawn(move || algorithm.find_collision(&SearchParameters::new()))
        };
        while algorithm.combinations_tried() == 0 {
            std::thread::yield_now();
        }
        algorithm.stop();
        assert_eq!(runner.join().unwrap(), None);
        assert_eq!(algorithm.collision_result(), None);
    }

    #[test]
    fn stop_before_start_is_honoured_until_reset() {
        let algorithm = Algorithm::new(Recording::new(0));
        algorithm.stop();
        assert_eq!(algorithm.strategy().stops.load(Ordering::SeqCst), 1);
        assert_eq!(algorithm.find_collision(&SearchParameters::new()), None);
        assert!(algorithm.strategy().seen.lock().unwrap().is_none());

        algorithm.reset();
        assert!(algorithm.find_collision(&SearchParameters::new()).is_some());
    }

    #[test]
    fn elapsed_time_is_recorded() {
        let algorithm = Arc::new(Algorithm::new(Spinner));
        let runner = {
            let algorithm = Arc::clone(&algorithm);
            std::thread::spawn(move || algorithm.find_collision(&SearchParameters::new()))
        };
        std::thread::sleep(Duration::from_millis(20));
        algorithm.stop();
        runner.join().unwrap();
        assert!(algorithm.elapsed_time() >= Duration::from_millis(20));
    }

    #[test]
    fn panic_leaves_no_result() {
        let algorithm = Algorithm::new(Panicking);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            algorithm.find_collision(&SearchParameters::new())
        }));
        assert!(outcome.is_err());
        assert_eq!(algorithm.collision_result(), None);
    }
}
