use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use core::time::Duration;

/// Telemetry counters of one search instance.
///
/// Only the instance's own worker thread writes `combinations_tried` and
/// `match_progress`; everybody else reads with relaxed loads and accepts
/// slightly stale values.
#[derive(Default)]
pub(crate) struct AtomicStats {
    pub(crate) combinations_tried: AtomicU64,
    pub(crate) match_progress: AtomicU32,
    pub(crate) match_progress_max: AtomicU32,
    pub(crate) elapsed_ms: AtomicU64,
}

impl AtomicStats {
    pub(crate) fn reset(&self, match_progress_max: u32) {
        self.combinations_tried.store(0, Ordering::Relaxed);
        self.match_progress.store(0, Ordering::Relaxed);
        self.match_progress_max
            .store(match_progress_max, Ordering::Relaxed);
        self.elapsed_ms.store(0, Ordering::Relaxed);
    }

    /// Counts one failed candidate that got `progress` of the way.
    #[inline]
    pub(crate) fn record_attempt(&self, progress: u32) {
        self.combinations_tried.fetch_add(1, Ordering::Relaxed);
        let max = self.match_progress_max.load(Ordering::Relaxed);
        let progress = progress.min(max);
        if progress > self.match_progress.load(Ordering::Relaxed) {
            self.match_progress.store(progress, Ordering::Relaxed);
        }
    }

    pub(crate) fn set_elapsed(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.elapsed_ms.store(ms, Ordering::Relaxed);
    }

    pub(crate) fn report(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            combinations_tried: self.combinations_tried.load(Ordering::Relaxed),
            match_progress: self.match_progress.load(Ordering::Relaxed),
            match_progress_max: self.match_progress_max.load(Ordering::Relaxed),
            elapsed: Duration::from_millis(self.elapsed_ms.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub combinations_tried: u64,
    pub match_progress: u32,
    pub match_progress_max: u32,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Folds per-worker snapshots into the coordinator view: attempts add
    /// up, everything else takes the maximum.
    pub fn aggregate<I: IntoIterator<Item = ProgressSnapshot>>(snapshots: I) -> Self {
        snapshots
            .into_iter()
            .fold(ProgressSnapshot::default(), |acc, s| ProgressSnapshot {
                combinations_tried: acc.combinations_tried + s.combinations_tried,
                match_progress: acc.match_progress.max(s.match_progress),
                match_progress_max: acc.match_progress_max.max(s.match_progress_max),
                elapsed: acc.elapsed.max(s.elapsed),
            })
    }

    /// Expected remaining seconds until a birthday collision on `bits` bits,
    /// given the attempt rate so far.
    pub fn estimate_time_to_collision(&self, bits: u32, elapsed_secs: f64) -> f64 {
        // (h + hps*t)^2/2 - h^2/2 = s
        // (h + hps*t)^2 - h^2 = 2*s
        // h + hps*t = q(2*s + h^2)
        // t = (q(2*s + h^2) - h) / hps
        let search_space = 2.0_f64.powi(bits as i32);
        let h = self.combinations_tried as f64;
        if h == 0.0 || elapsed_secs <= 0.0 {
            return f64::INFINITY;
        }
        let hps = h / elapsed_secs;
        ((2.0 * search_space + h * h).sqrt() - h) / hps
    }
}
