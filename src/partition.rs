use std::ops::RangeInclusive;

/// A contiguous, inclusive run of iteration indices handed to one worker.
#[derive(Hash, Debug, Clone, PartialEq, Copy)]
pub struct Partition {
    start: usize,
    end: usize
}

impl Partition {
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "Partition start must not pass its end.");
        Self { start, end }
    }

    pub fn get_start(&self) -> usize { self.start }
    pub fn get_end(&self) -> usize { self.end }

    /// Returns size of the partition.
    pub fn get_size(&self) -> usize { self.end - self.start + 1 }

    /// Creates a range to work with when processing data for the partition.
    pub fn get_range(&self) -> RangeInclusive<usize> { self.start..=self.end }
}

#[cfg(test)]
mod tests {
    use crate::partitioner::Partitioner;

    #[test]
    fn test_partition_sizes() {
        let actual = Partitioner::with_partitions(98, 4);

        assert_eq!(actual[0].get_range(), (0..=24));
        assert_eq!(actual[0].get_size(), 25);

        assert_eq!(actual[1].get_range(), (25..=49));
        assert_eq!(actual[1].get_size(), 25);

        assert_eq!(actual[2].get_range(), (50..=73));
        assert_eq!(actual[2].get_size(), 24);

        assert_eq!(actual[3].get_start(), 74);
        assert_eq!(actual[3].get_end(), 97);
        assert_eq!(actual[3].get_size(), 24);
    }

    #[test]
    #[should_panic]
    fn test_panic_on_invalid_partition() {
        let actual = Partitioner::with_partitions(98, 4);
        let _partition = actual[4];
    }
}
