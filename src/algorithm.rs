//! The contract between the coordinator and a collision search.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use crate::md5::{compress, Block, HashState};
use crate::params::{SearchInput, SearchParameters};
use crate::stats::{AtomicStats, ProgressSnapshot};

/// Two distinct blocks that compress the same state to the same state.
#[derive(Clone, PartialEq, Eq)]
pub struct CollisionResult {
    pub first: Block,
    pub second: Block,
}

impl CollisionResult {
    pub fn new(first: Block, second: Block) -> Self {
        Self { first, second }
    }

    pub fn outputs(&self, state: HashState) -> (HashState, HashState) {
        (compress(state, &self.first), compress(state, &self.second))
    }

    pub fn matching_bits(&self, state: HashState) -> u32 {
        let (a, b) = self.outputs(state);
        a.common_prefix_bits(b)
    }

    /// True when the blocks differ and collide completely from `state`.
    pub fn is_collision(&self, state: HashState) -> bool {
        self.first != self.second && self.matching_bits(state) == 128
    }
}

impl core::fmt::Debug for CollisionResult {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CollisionResult")
            .field("first", &hex::encode(self.first))
            .field("second", &hex::encode(self.second))
            .finish()
    }
}

/// What the coordinator needs from a search instance.
///
/// `find_collision` runs on a worker thread while `stop` and the telemetry
/// getters are called from other threads, hence `&self` everywhere.
pub trait CollisionAlgorithm: Send + Sync {
    /// Rearms the instance: clears the stop flag, counters and last result.
    fn reset(&self);

    /// Blocks until a collision is found or a stop is observed.
    fn find_collision(&self, params: &SearchParameters) -> Option<CollisionResult>;

    /// Asks a running search to return. Also honoured if it arrives before
    /// `find_collision` starts.
    fn stop(&self);

    fn collision_result(&self) -> Option<CollisionResult>;

    fn snapshot(&self) -> ProgressSnapshot;

    fn combinations_tried(&self) -> u64 {
        self.snapshot().combinations_tried
    }

    fn elapsed_time(&self) -> Duration {
        self.snapshot().elapsed
    }

    fn match_progress(&self) -> u32 {
        self.snapshot().match_progress
    }

    fn match_progress_max(&self) -> u32 {
        self.snapshot().match_progress_max
    }
}

/// A concrete way of finding collisions, run inside
/// [`Algorithm`](crate::lifecycle::Algorithm).
pub trait SearchStrategy: Send + Sync {
    /// Upper bound of the progress values passed to [`SearchContext::log_return`].
    fn match_progress_max(&self) -> u32;

    /// The search loop. Must poll [`SearchContext::is_stopped`] often enough
    /// to return promptly after a stop.
    fn search(&self, input: &SearchInput, ctx: &SearchContext<'_>) -> Option<CollisionResult>;

    /// Extra cancellation work beyond the stop flag.
    fn on_stop(&self) {}
}

/// Handle a strategy uses to report attempts and check for cancellation.
pub struct SearchContext<'a> {
    pub(crate) stats: &'a AtomicStats,
    pub(crate) stopped: &'a AtomicBool,
}

impl<'a> SearchContext<'a> {
    /// Records one failed candidate and how close it came.
    #[inline]
    pub fn log_return(&self, progress: u32) {
        self.stats.record_attempt(progress);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}
