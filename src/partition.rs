//! Partition module: static assignment of blocks to worker threads.

use crate::error::PartitionError;
use crate::graph::{BlockId, Graph};
use crate::invariant_ppt::{assert_invariant, PARTITION_REJECTS_INVALID, PARTITION_TOTAL};

/// Job lists: worker `i` runs `jobs()[i]`, in that order, round-robin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    jobs: Vec<Vec<BlockId>>,
}

impl Partition {
    /// Wrap explicit job lists, one per worker.
    pub fn new(jobs: Vec<Vec<BlockId>>) -> Self {
        Self { jobs }
    }

    /// `workers` empty lists, filled with [`Partition::assign`].
    pub fn with_workers(workers: usize) -> Self {
        Self {
            jobs: vec![Vec::new(); workers],
        }
    }

    /// Append `block` to worker `worker`'s list.
    ///
    /// # Panics
    /// If `worker` is out of range.
    pub fn assign(&mut self, worker: usize, block: BlockId) {
        self.jobs[worker].push(block);
    }

    /// Number of workers.
    pub fn num_workers(&self) -> usize {
        self.jobs.len()
    }

    /// The job lists.
    pub fn jobs(&self) -> &[Vec<BlockId>] {
        &self.jobs
    }

    /// Worker that owns `block`, if any.
    pub fn worker_of(&self, block: BlockId) -> Option<usize> {
        self.jobs.iter().position(|list| list.contains(&block))
    }

    /// Check that every block of `graph` appears in exactly one list.
    pub fn validate(&self, graph: &Graph) -> Result<(), PartitionError> {
        let result = self.check_total(graph.len());
        if let Err(err) = &result {
            tracing::debug!("partition_rejected: {err}");
            assert_invariant(
                PARTITION_REJECTS_INVALID,
                result.is_err(),
                "Partition rejected before any worker starts",
                Some("validate"),
            );
        }
        result
    }

    fn check_total(&self, num_blocks: usize) -> Result<(), PartitionError> {
        if self.jobs.is_empty() {
            return Err(PartitionError::NoWorkers);
        }
        let mut owner: Vec<Option<usize>> = vec![None; num_blocks];
        for (worker, list) in self.jobs.iter().enumerate() {
            for &block in list {
                let slot = owner
                    .get_mut(block.0)
                    .ok_or(PartitionError::UnknownBlock { block, worker })?;
                if let Some(first) = *slot {
                    return Err(PartitionError::DuplicateBlock {
                        block,
                        first,
                        second: worker,
                    });
                }
                *slot = Some(worker);
            }
        }
        if let Some(missing) = owner.iter().position(Option::is_none) {
            return Err(PartitionError::MissingBlock(BlockId(missing)));
        }
        assert_invariant(
            PARTITION_TOTAL,
            owner.iter().all(Option::is_some),
            "Every block owned by exactly one worker",
            Some("validate"),
        );
        Ok(())
    }

    /// Single worker running every block of `graph` in insertion order.
    pub fn sequential(graph: &Graph) -> Self {
        Self {
            jobs: vec![graph.block_ids()],
        }
    }
}

/// Kernels per core when `num_kernels` kernels are spread over `num_cpus`
/// cores: an even split, with the remainder going to the first cores.
pub fn kernels_per_core(num_kernels: usize, num_cpus: usize) -> Vec<usize> {
    (0..num_cpus)
        .map(|n| num_kernels / num_cpus + usize::from(n < num_kernels % num_cpus))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, WorkIo, WorkStatus};
    use crate::error::BlockError;
    use crate::port::PortSpec;

    struct Idle;

    impl Block for Idle {
        fn name(&self) -> &str {
            "Idle"
        }
        fn input_ports(&self) -> Vec<PortSpec> {
            Vec::new()
        }
        fn output_ports(&self) -> Vec<PortSpec> {
            Vec::new()
        }
        fn work(&mut self, _io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
            Ok(WorkStatus::Done)
        }
    }

    fn graph_of(n: usize) -> Graph {
        let mut graph = Graph::new();
        for _ in 0..n {
            graph.emplace_block(Idle);
        }
        graph
    }

    #[test]
    fn total_partition_is_accepted() {
        let graph = graph_of(3);
        let partition = Partition::new(vec![vec![BlockId(0), BlockId(2)], vec![BlockId(1)]]);
        assert_eq!(partition.validate(&graph), Ok(()));
        assert_eq!(partition.worker_of(BlockId(2)), Some(0));
    }

    #[test]
    fn omission_is_rejected() {
        let graph = graph_of(3);
        let partition = Partition::new(vec![vec![BlockId(0)], vec![BlockId(2)]]);
        assert_eq!(
            partition.validate(&graph),
            Err(PartitionError::MissingBlock(BlockId(1)))
        );
    }

    #[test]
    fn duplicate_is_rejected() {
        let graph = graph_of(2);
        let partition = Partition::new(vec![vec![BlockId(0), BlockId(1)], vec![BlockId(1)]]);
        assert_eq!(
            partition.validate(&graph),
            Err(PartitionError::DuplicateBlock {
                block: BlockId(1),
                first: 0,
                second: 1,
            })
        );
    }

    #[test]
    fn unknown_block_is_rejected() {
        let graph = graph_of(1);
        let partition = Partition::new(vec![vec![BlockId(0), BlockId(5)]]);
        assert_eq!(
            partition.validate(&graph),
            Err(PartitionError::UnknownBlock {
                block: BlockId(5),
                worker: 0,
            })
        );
    }

    #[test]
    fn empty_partition_is_rejected() {
        assert_eq!(
            Partition::default().validate(&graph_of(1)),
            Err(PartitionError::NoWorkers)
        );
    }

    #[test]
    fn empty_worker_lists_are_allowed() {
        let graph = graph_of(1);
        let mut partition = Partition::with_workers(3);
        partition.assign(2, BlockId(0));
        assert_eq!(partition.validate(&graph), Ok(()));
    }

    #[test]
    fn sequential_covers_everything() {
        let graph = graph_of(4);
        let partition = Partition::sequential(&graph);
        assert_eq!(partition.num_workers(), 1);
        assert_eq!(partition.validate(&graph), Ok(()));
    }

    #[test]
    fn kernels_are_spread_with_remainder_first() {
        assert_eq!(kernels_per_core(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(kernels_per_core(4, 4), vec![1, 1, 1, 1]);
        assert_eq!(kernels_per_core(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(kernels_per_core(7, 1), vec![7]);
    }
}
