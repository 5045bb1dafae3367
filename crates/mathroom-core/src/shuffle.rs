//! Seeded deterministic shuffle.
//!
//! The seed string is folded into a 32-bit state (`h = h * 31 + unit` over
//! UTF-16 code units) which drives a Mulberry32 generator. A Fisher–Yates
//! pass over a copy of the input uses that generator for each swap index, so
//! the same `(items, seed)` always yields the same ordering on every process.

/// Fold a seed string into a 32-bit state.
pub fn seed_hash(seed: &str) -> u32 {
    seed.encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as u32))
}

/// Mulberry32: small, fast, non-cryptographic 32-bit generator.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(state: u32) -> Self {
        Self { state }
    }

    pub fn from_seed(seed: &str) -> Self {
        Self::new(seed_hash(seed))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Uniform index in `0..bound`. `bound` must be non-zero.
    pub fn next_index(&mut self, bound: usize) -> usize {
        ((self.next_u32() as u64 * bound as u64) >> 32) as usize
    }
}

/// Return a seeded permutation of `items`. The input is not modified.
pub fn seeded_shuffle<T: Clone>(items: &[T], seed: &str) -> Vec<T> {
    let mut result = items.to_vec();
    let mut rng = Mulberry32::from_seed(seed);
    for i in (1..result.len()).rev() {
        let j = rng.next_index(i + 1);
        result.swap(i, j);
    }
    result
}
