use thiserror::Error;

/// Errors raised by the compression helpers and the worker race.
#[derive(Debug, Error)]
pub enum CollisionError {
    #[error("input of {len} bytes is not a whole number of 64-byte blocks")]
    PartialBlock { len: usize },
    #[error("match width must be between 1 and 128 bits, got {0}")]
    InvalidMatchBits(u32),
    #[error("invalid hex input: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("hash state must be 16 bytes, got {0}")]
    InvalidStateLength(usize),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("worker {0} is still running a previous search")]
    WorkerBusy(usize),
    #[error("coordinator has no workers")]
    NoWorkers,
    #[error("a search is already running on this coordinator")]
    AlreadyRunning,
    #[error("all {workers} workers failed before any of them finished")]
    AllWorkersFailed { workers: usize },
}
