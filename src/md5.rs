//! The MD5 compression function and the small helpers built on it.
//!
//! Everything here works on raw intermediate hash values (IHVs). Padding is
//! the caller's business: [`compress`] consumes exactly one 64-byte block and
//! [`compress_blocks`] chains over a buffer of whole blocks. [`digest`] is the
//! only function that applies the standard length padding.

use core::fmt;

use crate::error::CollisionError;

/// Size of one compression input, in bytes.
pub const BLOCK_LEN: usize = 64;

/// One compression input.
pub type Block = [u8; BLOCK_LEN];

/// Standard MD5 initialization vector.
pub const MD5_IV: HashState = HashState([0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476]);

/// Additive constants, `floor(abs(sin(i + 1)) * 2^32)`.
const K: [u32; 64] = [
    0xd76aa478, 0xe8c7b756, 0x242070db, 0xc1bdceee, 0xf57c0faf, 0x4787c62a, 0xa8304613, 0xfd469501,
    0x698098d8, 0x8b44f7af, 0xffff5bb1, 0x895cd7be, 0x6b901122, 0xfd987193, 0xa679438e, 0x49b40821,
    0xf61e2562, 0xc040b340, 0x265e5a51, 0xe9b6c7aa, 0xd62f105d, 0x02441453, 0xd8a1e681, 0xe7d3fbc8,
    0x21e1cde6, 0xc33707d6, 0xf4d50d87, 0x455a14ed, 0xa9e3e905, 0xfcefa3f8, 0x676f02d9, 0x8d2a4c8a,
    0xfffa3942, 0x8771f681, 0x6d9d6122, 0xfde5380c, 0xa4beea44, 0x4bdecfa9, 0xf6bb4b60, 0xbebfbc70,
    0x289b7ec6, 0xeaa127fa, 0xd4ef3085, 0x04881d05, 0xd9d4d039, 0xe6db99e5, 0x1fa27cf8, 0xc4ac5665,
    0xf4292244, 0x432aff97, 0xab9423a7, 0xfc93a039, 0x655b59c3, 0x8f0ccc92, 0xffeff47d, 0x85845dd1,
    0x6fa87e4f, 0xfe2ce6e0, 0xa3014314, 0x4e0811a1, 0xf7537e82, 0xbd3af235, 0x2ad7d2bb, 0xeb86d391,
];

/// Left-rotate amounts; each round repeats its four values four times.
const R: [[u32; 4]; 4] = [[7, 12, 17, 22], [5, 9, 14, 20], [4, 11, 16, 23], [6, 10, 15, 21]];

/// 128-bit running state of the compression function.
///
/// Words are stored as `[a, b, c, d]` and serialized little-endian, so
/// [`HashState::to_bytes`] on the final state of a padded message is the
/// familiar MD5 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashState(pub [u32; 4]);

impl Default for HashState {
    fn default() -> Self {
        MD5_IV
    }
}

impl HashState {
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        let mut words = [0_u32; 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self(words)
    }

    /// Parses a state from a slice, returning `None` unless it is exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; 16] = bytes.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    pub fn from_hex(text: &str) -> Result<Self, CollisionError> {
        let bytes = hex::decode(text.trim())?;
        Self::from_slice(&bytes).ok_or(CollisionError::InvalidStateLength(bytes.len()))
    }

    pub fn to_bytes(self) -> [u8; 16] {
        let mut bytes = [0_u8; 16];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.0) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The serialized state read as one big-endian integer, so that the
    /// leading bits are the leading bits of the hex form.
    pub fn as_u128(self) -> u128 {
        u128::from_be_bytes(self.to_bytes())
    }

    /// Number of leading bits (in serialized order) two states agree on.
    pub fn common_prefix_bits(self, other: HashState) -> u32 {
        (self.as_u128() ^ other.as_u128()).leading_zeros()
    }
}

impl fmt::Display for HashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for HashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashState({})", self.to_hex())
    }
}

#[inline(always)]
fn step(a: u32, b: u32, mix: u32, word: u32, k: u32, r: u32) -> u32 {
    a.wrapping_add(mix)
        .wrapping_add(word)
        .wrapping_add(k)
        .rotate_left(r)
        .wrapping_add(b)
}

/// Runs the 64 steps over sixteen message words and adds the result into `ihv`.
pub fn compress_words(ihv: &mut [u32; 4], data: &[u32; 16]) {
    let [mut a, mut b, mut c, mut d] = *ihv;

    for i in 0..64 {
        let round = i / 16;
        let (mix, g) = match round {
            0 => ((b & c) | (!b & d), i),
            1 => ((d & b) | (!d & c), (5 * i + 1) % 16),
            2 => (b ^ c ^ d, (3 * i + 5) % 16),
            _ => (c ^ (b | !d), (7 * i) % 16),
        };
        let next = step(a, b, mix, data[g], K[i], R[round][i % 4]);
        a = d;
        d = c;
        c = b;
        b = next;
    }

    ihv[0] = ihv[0].wrapping_add(a);
    ihv[1] = ihv[1].wrapping_add(b);
    ihv[2] = ihv[2].wrapping_add(c);
    ihv[3] = ihv[3].wrapping_add(d);
}

/// Applies the compression function to one block.
pub fn compress(state: HashState, block: &Block) -> HashState {
    let mut data = [0_u32; 16];
    for (word, chunk) in data.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    let mut ihv = state.0;
    compress_words(&mut ihv, &data);
    HashState(ihv)
}

fn chain(state: HashState, data: &[u8]) -> HashState {
    data.chunks_exact(BLOCK_LEN).fold(state, |state, chunk| {
        let mut block = [0_u8; BLOCK_LEN];
        block.copy_from_slice(chunk);
        compress(state, &block)
    })
}

/// Chains `state` through every block of `data`.
///
/// `data` must be a whole number of blocks.
pub fn compress_blocks(state: HashState, data: &[u8]) -> Result<HashState, CollisionError> {
    if data.len() % BLOCK_LEN != 0 {
        return Err(CollisionError::PartialBlock { len: data.len() });
    }
    Ok(chain(state, data))
}

/// Like [`compress_blocks`], but a trailing partial block is ignored.
pub fn compress_blocks_truncating(state: HashState, data: &[u8]) -> HashState {
    chain(state, data)
}

/// Appends the standard MD5 padding: `0x80`, zeros, then the bit length as a
/// little-endian `u64`.
pub fn pad_message(message: &[u8]) -> Vec<u8> {
    let bit_len = (message.len() as u64).wrapping_mul(8);
    let mut padded = Vec::with_capacity(message.len() + 2 * BLOCK_LEN);
    padded.extend_from_slice(message);
    padded.push(0x80);
    while padded.len() % BLOCK_LEN != 56 {
        padded.push(0);
    }
    padded.extend_from_slice(&bit_len.to_le_bytes());
    padded
}

/// Full MD5 of `message`, starting from the standard IV.
pub fn digest(message: &[u8]) -> [u8; 16] {
    compress_blocks_truncating(MD5_IV, &pad_message(message)).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn rfc1321_vectors() {
        let vectors = [
            ("", "d41d8cd98f00b204e9800998ecf8427e"),
            ("a", "0cc175b9c0f1b6a831c399e269772661"),
            ("abc", "900150983cd24fb0d6963f7d28e17f72"),
            ("message digest", "f96b697d7cb7938d525a2f31aaf161d0"),
            ("abcdefghijklmnopqrstuvwxyz", "c3fcd3d76192e4007dfb496cca67e13b"),
            (
                "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789",
                "d174ab98d277d9f5a5611c2c9f419d9f",
            ),
            (
                "12345678901234567890123456789012345678901234567890123456789012345678901234567890",
                "57edf4a22be3c955ac49da2e2107b67a",
            ),
        ];
        for (input, expected) in vectors {
            assert_eq!(hex::encode(digest(input.as_bytes())), expected, "input {:?}", input);
        }
    }

    #[test]
    fn padding_spills_into_second_block() {
        // 56 bytes leave no room for the length, so padding takes a second block
        let padded = pad_message(&[0x61; 56]);
        assert_eq!(padded.len(), 128);
        assert_eq!(padded[56], 0x80);
        assert_eq!(&padded[120..], &(56_u64 * 8).to_le_bytes());
    }

    #[test]
    fn wang_two_block_collision() {
        // Wang et al., "How to Break MD5 and Other Hash Functions"
        let m0 = [
            0x02dd31d1, 0xc4eee6c5, 0x069a3d69, 0x5cf9af98, 0x87b5ca2f, 0xab7e4612, 0x3e580440,
            0x897ffbb8, 0x0634ad55, 0x02b3f409, 0x8388e483, 0x5a417125, 0xe8255108, 0x9fc9cdf7,
            0xf2bd1dd9, 0x5b3c3780,
        ];
        let m1 = [
            0xd11d0b96, 0x9c7b41dc, 0xf497d8e4, 0xd555655a, 0xc79a7335, 0x0cfdebf0, 0x66f12930,
            0x8fb109d1, 0x797f2775, 0xeb5cd530, 0xbaade822, 0x5c15cc79, 0xddcb74ed, 0x6dd3c55f,
            0xd80a9bb1, 0xe3a7cc35,
        ];
        let mut m0_prime = m0;
        m0_prime[4] = 0x07b5ca2f;
        m0_prime[11] = 0x5a41f125;
        m0_prime[14] = 0x72bd1dd9;
        let mut m1_prime = m1;
        m1_prime[4] = 0x479a7335;
        m1_prime[11] = 0x5c154c79;
        m1_prime[14] = 0x580a9bb1;

        let first: Vec<u8> = [words_to_bytes(&m0), words_to_bytes(&m1)].concat();
        let second: Vec<u8> = [words_to_bytes(&m0_prime), words_to_bytes(&m1_prime)].concat();
        assert_ne!(first, second);

        let mid = compress_blocks(MD5_IV, &first[..64]).unwrap();
        let mid_prime = compress_blocks(MD5_IV, &second[..64]).unwrap();
        assert_eq!(mid.0, [0x52589324, 0x3093d7ca, 0x2a06dc54, 0x20c5be06]);
        assert_eq!(mid_prime.0, [0xd2589324, 0xb293d7ca, 0xac06dc54, 0xa2c5be06]);

        let out = compress_blocks(MD5_IV, &first).unwrap();
        let out_prime = compress_blocks(MD5_IV, &second).unwrap();
        assert_eq!(out, out_prime);
        assert_eq!(out.0, [0x9603161f, 0xa30f9dbf, 0x9f65ffbc, 0xf41fc7ef]);
        assert_eq!(hex::encode(digest(&first)), "a4c0d35c95a63a805915367dcfe6b751");
        assert_eq!(digest(&first), digest(&second));
    }

    #[test]
    fn partial_blocks() {
        let data = [7_u8; 100];
        match compress_blocks(MD5_IV, &data) {
            Err(CollisionError::PartialBlock { len }) => assert_eq!(len, 100),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            compress_blocks_truncating(MD5_IV, &data),
            compress_blocks(MD5_IV, &data[..64]).unwrap()
        );
        assert_eq!(compress_blocks(MD5_IV, &[]).unwrap(), MD5_IV);
    }

    #[test]
    fn state_bytes_are_little_endian() {
        assert_eq!(MD5_IV.to_hex(), "0123456789abcdeffedcba9876543210");
        assert_eq!(HashState::from_hex("0123456789abcdeffedcba9876543210").unwrap(), MD5_IV);
        assert_eq!(HashState::default(), MD5_IV);
        assert!(HashState::from_slice(&[0; 15]).is_none());
        assert!(matches!(
            HashState::from_hex("0011"),
            Err(CollisionError::InvalidStateLength(2))
        ));
    }

    #[test]
    fn prefix_bits() {
        let a = HashState([0, 0, 0, 0]);
        let mut b = a;
        assert_eq!(a.common_prefix_bits(b), 128);
        // top bit of the first serialized byte is bit 7 of word 0
        b.0[0] = 0x80;
        assert_eq!(a.common_prefix_bits(b), 0);
        b.0[0] = 0x0100;
        assert_eq!(a.common_prefix_bits(b), 15);
    }

    proptest! {
        #[test]
        fn compress_is_pure(words in proptest::array::uniform4(any::<u32>()), fill in any::<u8>(), salt in any::<u64>()) {
            let mut block = [fill; BLOCK_LEN];
            block[..8].copy_from_slice(&salt.to_le_bytes());
            let state = HashState(words);
            let once = compress(state, &block);
            let twice = std::thread::spawn(move || compress(state, &block)).join().unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
