//! Randomized pacing
//!
//! Every humanlike delay and pointer coordinate is drawn through [`Jitter`] so
//! the harvest can run deterministically under test.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Pointer coordinates stay inside this viewport region
const POINTER_X: (i64, i64) = (100, 800);
const POINTER_Y: (i64, i64) = (100, 600);

/// Source of randomized durations, counts and coordinates
pub trait Jitter: Send {
    /// A duration in `[lo, hi]`
    fn between(&mut self, lo: Duration, hi: Duration) -> Duration;

    /// A count in `[lo, hi]`
    fn count(&mut self, lo: u32, hi: u32) -> u32;

    /// A pointer position inside the viewport
    fn point(&mut self) -> (i64, i64);
}

/// Uniform randomness from a seedable generator
#[derive(Debug)]
pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    /// Seeds from the operating system
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence for a seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Jitter for RandomJitter {
    fn between(&mut self, lo: Duration, hi: Duration) -> Duration {
        if hi <= lo {
            return lo;
        }
        let millis = self.rng.gen_range(lo.as_millis()..=hi.as_millis());
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    fn count(&mut self, lo: u32, hi: u32) -> u32 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    fn point(&mut self) -> (i64, i64) {
        (
            self.rng.gen_range(POINTER_X.0..=POINTER_X.1),
            self.rng.gen_range(POINTER_Y.0..=POINTER_Y.1),
        )
    }
}

/// Always the lower bound; for tests and dry runs
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedJitter;

impl Jitter for FixedJitter {
    fn between(&mut self, lo: Duration, _hi: Duration) -> Duration {
        lo
    }

    fn count(&mut self, lo: u32, _hi: u32) -> u32 {
        lo
    }

    fn point(&mut self) -> (i64, i64) {
        (POINTER_X.0, POINTER_Y.0)
    }
}
