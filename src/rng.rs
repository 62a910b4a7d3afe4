//! Seedable, serializable uniform(0,1) generators for event selection and
//! event timing.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::SimError;

/// Serialized size of one generator: seed (32) + stream id (8) + word
/// position (16).
pub const RNG_BLOB_SIZE: usize = 56;
/// A digest stores the event and time generators back-to-back.
pub const RNG_STATE_SIZE: usize = 2 * RNG_BLOB_SIZE;

const GOLDEN_GAMMA: u64 = 0x9E3779B97F4A7C15;

/// SplitMix64 mix of a base seed and a stream discriminator.
pub fn derive_seed(base: u64, stream: u64) -> u64 {
    let mut z = base ^ stream.wrapping_mul(GOLDEN_GAMMA);
    z = z.wrapping_add(GOLDEN_GAMMA);
    let mut result = z;
    result = (result ^ (result >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    result = (result ^ (result >> 27)).wrapping_mul(0x94D049BB133111EB);
    result ^ (result >> 31)
}

fn tag_hash(tag: &str) -> u64 {
    let mut h = 0xcbf29ce484222325u64;
    for b in tag.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// One uniform(0,1) generator whose full state round-trips through a
/// fixed-size byte blob.
#[derive(Clone, Debug)]
pub struct EventRng {
    inner: ChaCha8Rng,
}

impl EventRng {
    /// Non-deterministic seeding from OS entropy (user seed 0).
    pub fn from_entropy() -> Self {
        Self {
            inner: ChaCha8Rng::from_entropy(),
        }
    }

    /// Deterministic seeding from (user seed, salt, method tag, partition
    /// rank). Each (salt, rank) pair gets its own ChaCha stream, so the
    /// keystreams of the event and time generators, and of every partition,
    /// are disjoint.
    pub fn from_parts(seed: u64, salt: u32, tag: &str, rank: u32) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(seed ^ tag_hash(tag), salt as u64));
        rng.set_stream(((salt as u64) << 32) | rank as u64);
        Self { inner: rng }
    }

    /// Next uniform draw in [0, 1).
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.inner.gen()
    }

    /// Append the generator state to `out` as a [`RNG_BLOB_SIZE`]-byte blob.
    pub fn save_state(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.inner.get_seed());
        out.extend_from_slice(&self.inner.get_stream().to_le_bytes());
        out.extend_from_slice(&self.inner.get_word_pos().to_le_bytes());
    }

    /// Restore a state previously captured by [`save_state`](Self::save_state).
    /// Bit-exact: the restored generator replays the same draws.
    pub fn restore_state(&mut self, blob: &[u8]) -> Result<(), SimError> {
        if blob.len() != RNG_BLOB_SIZE {
            return Err(SimError::InvalidArgument(format!(
                "RNG state blob is {} bytes, expected {}",
                blob.len(),
                RNG_BLOB_SIZE
            )));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&blob[..32]);
        let mut stream = [0u8; 8];
        stream.copy_from_slice(&blob[32..40]);
        let mut word_pos = [0u8; 16];
        word_pos.copy_from_slice(&blob[40..56]);

        let mut rng = ChaCha8Rng::from_seed(seed);
        rng.set_stream(u64::from_le_bytes(stream));
        rng.set_word_pos(u128::from_le_bytes(word_pos));
        self.inner = rng;
        Ok(())
    }
}
