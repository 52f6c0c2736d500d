//! Races MD5 block-collision searches across threads.
//!
//! A [`CollisionCoordinator`] owns one search instance per CPU, gives each a
//! diversified seed and the same target [`HashState`], starts them all and
//! returns the result of whichever finishes first. Everybody else is stopped.
//!
//! Search strategies plug in through [`SearchStrategy`] and are wrapped in an
//! [`Algorithm`], which handles seeds, counters, elapsed time and progress
//! notifications.
//!
//! ```no_run
//! use md5_race::{Algorithm, CollisionCoordinator, PrefixCollision, SearchParameters};
//!
//! let coordinator = CollisionCoordinator::new(|_| {
//!     Algorithm::new(PrefixCollision::new(24).expect("valid width"))
//! });
//! let result = coordinator
//!     .find_collision(&SearchParameters::new().with_seed(b"seed".to_vec()))
//!     .expect("search ran");
//! println!("{:?} after {} candidates", result, coordinator.combinations_tried());
//! ```

mod algorithm;
mod coordinator;
mod error;
mod lifecycle;
pub mod md5;
mod params;
mod prefix;
mod printer;
mod stats;
mod telemetry;
mod worker;

pub use crate::algorithm::{CollisionAlgorithm, CollisionResult, SearchContext, SearchStrategy};
pub use crate::coordinator::CollisionCoordinator;
pub use crate::error::CollisionError;
pub use crate::lifecycle::Algorithm;
pub use crate::md5::{compress, compress_blocks, Block, HashState, MD5_IV};
pub use crate::params::{
    diversify_seeds, generate_seed, worker_parameters, SearchInput, SearchParameters,
    GENERATED_SEED_LEN,
};
pub use crate::prefix::{split_table_budget, PrefixCollision, DEFAULT_TABLE_LIMIT};
pub use crate::printer::{LogObserver, StatPrinter};
pub use crate::stats::ProgressSnapshot;
pub use crate::telemetry::{ProgressObserver, Ticker, ELAPSED_INTERVAL, PROGRESS_INTERVAL};
pub use crate::worker::{FinishedCallback, Outcome, WorkerHandle};
