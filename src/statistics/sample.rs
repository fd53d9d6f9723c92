use crate::random::Random;

/// Hands out random batches of sample indices without repeats until reset.
pub struct Sample {
    order: Vec<usize>,
    cursor: usize
}

impl Sample {
    /// Creates a sample over `count` items, shuffled once up front.
    pub fn create_sample(count: usize, rng: &mut Random) -> Sample {
        let mut order: Vec<usize> = (0..count).collect();
        rng.shuffle(&mut order);

        Sample { order, cursor: 0 }
    }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    /// Indices not yet handed out since the last reset.
    pub fn remaining(&self) -> usize { self.order.len() - self.cursor }

    /// Next batch of indices, or None once the sample is exhausted.
    /// The final batch picks up stragglers and may be shorter than requested.
    pub fn random_batch(&mut self, requested_batch_size: usize) -> Option<&[usize]> {
        let batch_size = requested_batch_size.min(self.remaining());
        if batch_size == 0 {
            return None;
        }

        let start = self.cursor;
        self.cursor += batch_size;
        Some(&self.order[start..self.cursor])
    }

    /// Reshuffles to allow a fresh series of random batches.
    pub fn reset(&mut self, rng: &mut Random) {
        rng.shuffle(&mut self.order);
        self.cursor = 0;
    }
}
