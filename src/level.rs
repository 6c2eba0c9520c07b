// Copyright (c) 2026-present, skipstore
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::atomic::{AtomicU32, Ordering};

use rand::RngCore;

/// Source of random node heights for a skip list.
///
/// Heights follow a geometric distribution with p = 1/2: a draw yields
/// level `k` or above with probability 2^-(k-1), truncated at the list's
/// `max_level`. Every draw is at least 1.
///
/// The generator is shared between concurrent inserters; draws under
/// contention may repeat, which only skews the height distribution and
/// never affects correctness.
pub struct LevelGenerator {
    state: AtomicU32,
}

impl LevelGenerator {
    /// Creates a generator with a random seed.
    pub fn new() -> Self {
        Self::with_seed(rand::rng().next_u32())
    }

    /// Creates a generator with a fixed seed, making the height sequence
    /// deterministic. Intended for tests.
    pub fn with_seed(seed: u32) -> Self {
        // Xorshift has a single absorbing state at zero.
        let seed = if seed == 0 { 1 } else { seed };
        Self {
            state: AtomicU32::new(seed),
        }
    }

    /// Draws a level in `[1, max_level]`.
    pub fn random_level(&self, max_level: usize) -> usize {
        // Every low bit of the draw is a fair coin: keep climbing while
        // it comes up heads.
        let flips = self.next_u32().trailing_ones() as usize;
        (1 + flips).min(max_level)
    }

    // Pseudorandom number generation from "Xorshift RNGs" by George
    // Marsaglia. Racing load/store pairs can hand two inserters the same
    // draw; that is acceptable here.
    fn next_u32(&self) -> u32 {
        let mut num = self.state.load(Ordering::Relaxed);
        num ^= num << 13;
        num ^= num >> 17;
        num ^= num << 5;
        self.state.store(num, Ordering::Relaxed);
        num
    }
}

impl Default for LevelGenerator {
    fn default() -> Self {
        Self::new()
    }
}
