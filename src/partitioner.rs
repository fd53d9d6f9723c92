use std::{ops::Index, thread};

use crate::partition::Partition;

/// Splits a known iteration count into partitions and runs them on scoped threads.
/// Partitions never overlap, so work done on one never races work done on another
/// unless it writes through shared atomics.
#[derive(Hash, Debug, Clone, PartialEq, Default)]
pub struct Partitioner {
    partitions: Vec<Partition>
}

impl Index<usize> for Partitioner {
    type Output = Partition;

    fn index(&self, index: usize) -> &Self::Output {
        &self.partitions[index]
    }
}

impl Partitioner {
    /// Creates a partitioner with partitions that are mostly equal in size, with no more than a difference of 1.
    pub fn with_partitions(count: usize, partition_count: usize) -> Self {
        if count == 0 {
            return Partitioner::default();
        }

        let partition_count = partition_count.max(1);
        let partition_size = count / partition_count;

        if partition_size < 1 {
        // Count is not large enough to split into partitions
            return Partitioner { partitions: vec![Partition::new(0, count - 1)] };
        }

        // Calculates left over items and distributes remainder
        let spread = count % partition_count;
        let mut partitions = Vec::with_capacity(partition_count);
        let mut cursor = 0;
        for partition_index in 0..partition_count {
            let adjusted_partition_size = partition_size + if partition_index < spread { 1 } else { 0 };
            let start = cursor;
            cursor = start + adjusted_partition_size;

            partitions.push(Partition::new(start, cursor - 1));
        }

        Partitioner { partitions }
    }

    /// One partition per available core.
    pub fn for_available_cores(count: usize) -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Partitioner::with_partitions(count, cores)
    }

    pub fn len(&self) -> usize { self.partitions.len() }

    pub fn is_empty(&self) -> bool { self.partitions.is_empty() }

    /// Parallelizes work among partitions as evenly as possible.
    /// Ensures result is aggregated in correct order.
    pub fn parallelized<T, F>(&self, function: F) -> Vec<T>
    where
        F: Fn(&Partition) -> Vec<T> + Send + Sync,
        T: Send
    {
        match self.partitions.len() {
            0 => return Vec::new(),
            // Since only 1 partition, do not use threading.
            1 => return function(&self.partitions[0]),
            _ => {}
        }

        let function = &function;
        let mut values: Vec<T> = Vec::new();
        thread::scope(|s| {
            let scope_join_handles: Vec<_> = self.partitions.iter()
                .map(|partition| s.spawn(move || function(partition)))
                .collect();

            for scope_join_handle in scope_join_handles {
                match scope_join_handle.join() {
                    Ok(result) => values.extend(result),
                    Err(payload) => std::panic::resume_unwind(payload)
                }
            }
        });

        values
    }

    /// Runs a side-effecting function over every partition.
    /// Any writes shared between partitions must go through atomics.
    pub fn for_each_partition<F>(&self, function: F)
    where
        F: Fn(&Partition) + Send + Sync
    {
        self.parallelized(|partition| {
            function(partition);
            Vec::<()>::new()
        });
    }
}
