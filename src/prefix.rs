//! Birthday search for blocks whose output states share a prefix.
//!
//! Compresses candidate blocks from the target state and remembers the
//! leading bits of every output. Two different blocks landing on the same
//! prefix end the search. The table holds candidate indices rather than
//! blocks; a block is rebuilt from its index when it is needed again. With `bits = 128` that is a full collision,
//! which is far out of reach of brute force; smaller widths make the engine
//! demonstrable and are what the tests use.

use std::collections::{hash_map::Entry, HashMap};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;

use crate::algorithm::{CollisionResult, SearchContext, SearchStrategy};
use crate::error::CollisionError;
use crate::md5::{compress, digest, Block, HashState, BLOCK_LEN};
use crate::params::SearchInput;

/// Default number of remembered outputs per search before the table starts over.
pub const DEFAULT_TABLE_LIMIT: usize = 1 << 20;

const KEY_BITS: u32 = 64;

const NEIGHBOUR_BITS: u32 = 12;

#[derive(Debug, Clone)]
pub struct PrefixCollision {
    bits: u32,
    table_limit: usize,
}

impl PrefixCollision {
    pub fn new(bits: u32) -> Result<Self, CollisionError> {
        if !(1..=128).contains(&bits) {
            return Err(CollisionError::InvalidMatchBits(bits));
        }
        Ok(Self {
            bits,
            table_limit: DEFAULT_TABLE_LIMIT,
        })
    }

    pub fn with_table_limit(mut self, limit: usize) -> Self {
        self.table_limit = limit.max(1);
        self
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Top `bits` of the output, cut to 64. Wider matches are confirmed
    /// against the full state.
    fn key(&self, state: HashState) -> u64 {
        (state.as_u128() >> (128 - self.bits.min(KEY_BITS))) as u64
    }
}

/// Splits a table budget shared by `workers` searches into a per-search limit.
pub fn split_table_budget(total: usize, workers: usize) -> usize {
    (total / workers.max(1)).max(1)
}

/// Candidate blocks of one search: a random base block with the candidate
/// index written over its first eight bytes.
struct Candidates {
    base: Block,
}

impl Candidates {
    fn from_rng(rng: &mut StdRng) -> Self {
        let mut base = [0_u8; BLOCK_LEN];
        rng.fill_bytes(&mut base);
        Self { base }
    }

    fn block(&self, index: u64) -> Block {
        let mut block = self.base;
        block[..8].copy_from_slice(&index.to_le_bytes());
        block
    }
}

/// Expands an arbitrary seed into the 32 bytes `StdRng` wants.
fn rng_seed(seed: &[u8]) -> [u8; 32] {
    let first = digest(seed);
    let second = digest(&first);
    let mut out = [0_u8; 32];
    out[..16].copy_from_slice(&first);
    out[16..].copy_from_slice(&second);
    out
}

impl SearchStrategy for PrefixCollision {
    fn match_progress_max(&self) -> u32 {
        self.bits
    }

    fn search(&self, input: &SearchInput, ctx: &SearchContext<'_>) -> Option<CollisionResult> {
        let mut rng = StdRng::from_seed(rng_seed(&input.seed));
        let candidates = Candidates::from_rng(&mut rng);
        let mut seen: HashMap<u64, u64> = HashMap::new();
        let mut index = 0_u64;
        // last output per leading 12 bits, for the closeness telemetry
        let mut neighbours = vec![0_u128; 1 << NEIGHBOUR_BITS];

        while !ctx.is_stopped() {
            let block = candidates.block(index);
            let output = compress(input.target, &block);

            match seen.entry(self.key(output)) {
                Entry::Occupied(mut entry) => {
                    let earlier = candidates.block(*entry.get());
                    let earlier_output = compress(input.target, &earlier);
                    if earlier != block && earlier_output.common_prefix_bits(output) >= self.bits {
                        return Some(CollisionResult::new(earlier, block));
                    }
                    entry.insert(index);
                }
                Entry::Vacant(entry) => {
                    entry.insert(index);
                }
            }

            let value = output.as_u128();
            let bucket = (value >> (128 - NEIGHBOUR_BITS)) as usize;
            let closeness = (neighbours[bucket] ^ value).leading_zeros();
            neighbours[bucket] = value;
            ctx.log_return(closeness.min(self.bits.saturating_sub(1)));

            if seen.len() >= self.table_limit {
                debug!(entries = seen.len(), "prefix table full, starting over");
                seen.clear();
            }
            index = index.wrapping_add(1);
        }
        None
    }
}
