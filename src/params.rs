//! Search parameters and their per-worker derivation.

use rand::RngCore;

use crate::md5::{HashState, MD5_IV};

/// Length of a seed generated for a worker that was not given one.
pub const GENERATED_SEED_LEN: usize = 32;

/// Inputs of one search. Immutable once a search has started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParameters {
    /// Seed of the worker's random stream; `None` lets the worker pick one.
    pub seed: Option<Vec<u8>>,
    /// State both colliding blocks start from; `None` means [`MD5_IV`].
    pub target: Option<HashState>,
}

impl SearchParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: impl Into<Vec<u8>>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    pub fn with_target(mut self, target: HashState) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the target from raw bytes. Anything but 16 bytes falls back to
    /// the MD5 IV.
    pub fn with_target_bytes(mut self, bytes: Option<&[u8]>) -> Self {
        self.target = bytes.and_then(HashState::from_slice);
        self
    }

    pub fn target_state(&self) -> HashState {
        self.target.unwrap_or(MD5_IV)
    }
}

/// Parameters as a strategy sees them, with every default filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchInput {
    pub seed: Vec<u8>,
    pub target: HashState,
}

impl SearchInput {
    pub fn resolve(params: &SearchParameters) -> Self {
        let seed = match &params.seed {
            Some(seed) => seed.clone(),
            None => generate_seed(),
        };
        Self {
            seed,
            target: params.target_state(),
        }
    }
}

pub fn generate_seed() -> Vec<u8> {
    let mut seed = vec![0_u8; GENERATED_SEED_LEN];
    rand::thread_rng().fill_bytes(&mut seed);
    seed
}

/// Derives one seed per worker from `seed`.
///
/// Worker 0 gets a copy of `seed`, every later worker gets the previous seed
/// with its first byte incremented. An empty seed grows to one zero byte
/// before the first increment. Without a seed every worker gets `None`.
pub fn diversify_seeds(seed: Option<&[u8]>, workers: usize) -> Vec<Option<Vec<u8>>> {
    let Some(seed) = seed else {
        return vec![None; workers];
    };

    let mut seeds: Vec<Option<Vec<u8>>> = Vec::with_capacity(workers);
    let mut current = seed.to_vec();
    for i in 0..workers {
        if i > 0 {
            if current.is_empty() {
                current.push(0);
            }
            current[0] = current[0].wrapping_add(1);
        }
        seeds.push(Some(current.clone()));
    }
    seeds
}

/// Fans `params` out to `workers` parameter sets: same target, diversified seeds.
pub fn worker_parameters(params: &SearchParameters, workers: usize) -> Vec<SearchParameters> {
    diversify_seeds(params.seed.as_deref(), workers)
        .into_iter()
        .map(|seed| SearchParameters {
            seed,
            target: params.target,
        })
        .collect()
}
