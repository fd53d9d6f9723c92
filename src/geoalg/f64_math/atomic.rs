use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed size buffer of f64 slots that many threads may add into at once.
/// Each slot stores the bit pattern of an f64 and is updated with compare-and-swap,
/// so concurrent additions into the same slot are never lost.
pub struct AtomicAccumulator {
    slots: Vec<AtomicU64>
}

impl AtomicAccumulator {
    /// Creates a buffer of zeroes.
    pub fn new_zeroed(len: usize) -> Self {
        let zero = 0f64.to_bits();
        AtomicAccumulator { slots: (0..len).map(|_| AtomicU64::new(zero)).collect() }
    }

    /// Adds value into the slot at index.
    pub fn add(&self, index: usize, value: f64) {
        let slot = &self.slots[index];
        let mut current = slot.load(Ordering::Relaxed);
        loop {
            let updated = (f64::from_bits(current) + value).to_bits();
            match slot.compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(observed) => current = observed
            }
        }
    }

    pub fn load(&self, index: usize) -> f64 {
        f64::from_bits(self.slots[index].load(Ordering::Relaxed))
    }

    /// Consumes the buffer, returning plain values.
    pub fn into_values(self) -> Vec<f64> {
        self.slots.into_iter().map(|slot| f64::from_bits(slot.into_inner())).collect()
    }
}
