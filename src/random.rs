use std::f64::consts::PI;

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Uniform};

/// Random source injected into layer constructors and the trainer.
/// Provides the draws the network needs: uniform reals, standard normals and
/// inclusive integer ranges for shuffling.
pub struct Random {
    engine: StdRng,
    unit: Uniform<f64>
}

impl Random {
    /// Deterministic generator, useful for tests and reproducible runs.
    pub fn new(seed: u64) -> Self {
        Random { engine: StdRng::seed_from_u64(seed), unit: Uniform::new(0.0, 1.0) }
    }

    pub fn from_entropy() -> Self {
        Random { engine: StdRng::from_entropy(), unit: Uniform::new(0.0, 1.0) }
    }

    /// Uniform draw in [0, 1).
    pub fn next_real(&mut self) -> f64 {
        self.unit.sample(&mut self.engine)
    }

    /// Standard normal draw using the Box-Muller transform over two uniform draws.
    pub fn normal(&mut self) -> f64 {
        // 1 - u keeps the logarithm argument in (0, 1].
        let r1 = 1.0 - self.next_real();
        let r2 = self.next_real();
        (-2.0 * r1.ln()).sqrt() * (2.0 * PI * r2).sin()
    }

    /// Integer draw in [low, high] inclusive.
    pub fn next_int(&mut self, low: usize, high: usize) -> usize {
        assert!(low <= high, "Integer range must not be empty.");
        Uniform::new_inclusive(low, high).sample(&mut self.engine)
    }

    /// Fisher-Yates shuffle, swapping each slot with a slot drawn from itself to the end.
    pub fn shuffle<T>(&mut self, values: &mut [T]) {
        let n = values.len();
        for i in 0..n {
            let k = self.next_int(i, n - 1);
            values.swap(i, k);
        }
    }
}
