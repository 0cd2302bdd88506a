//! Example protected resource: a bounded random reading only authorized
//! callers may fetch. Uses a seedable statistical RNG, never the token CSPRNG.

use std::ops::RangeInclusive;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SecretSource {
    range: RangeInclusive<i64>,
    rng: Mutex<StdRng>,
}

impl SecretSource {
    /// Returns `None` when `min > max`.
    pub fn new(min: i64, max: i64) -> Option<Self> {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    /// Deterministic sequence for a given seed.
    pub fn seeded(min: i64, max: i64, seed: u64) -> Option<Self> {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min: i64, max: i64, rng: StdRng) -> Option<Self> {
        (min <= max).then(|| Self { range: min..=max, rng: Mutex::new(rng) })
    }

    pub fn range(&self) -> &RangeInclusive<i64> { &self.range }

    pub fn fetch(&self) -> i64 {
        self.rng.lock().gen_range(self.range.clone())
    }
}

impl std::fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSource").field("range", &self.range).finish()
    }
}
