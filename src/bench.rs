//! Benchmark topologies: a dummy source, a chain of Saxpy kernels and a
//! throughput sink, placed on one core, on explicit job lists, or on a pool.

use crate::blocks::{BenchmarkSink, DummySource, Head, Saxpy};
use crate::config::{BenchConfig, BenchMode};
use crate::error::{BenchError, GraphError};
use crate::graph::{BlockId, Graph};
use crate::partition::{kernels_per_core, Partition};
use crate::scheduler::{ExecutionMode, RunSummary, Scheduler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A benchmark graph with the placement it should run under.
#[derive(Debug)]
pub struct Topology {
    /// Source, kernel chain and sink.
    pub graph: Graph,
    /// Placement of the graph's blocks.
    pub mode: ExecutionMode,
    /// Job-list workers run pinned to their cores.
    pub pin_cores: bool,
}

impl Topology {
    /// Bind to a scheduler sized from `config`.
    pub fn into_scheduler(self, config: &BenchConfig) -> Result<Scheduler, BenchError> {
        let mut scheduler_config = config.scheduler_config();
        scheduler_config.pin_cores = self.pin_cores;
        Ok(Scheduler::with_config(self.graph, self.mode, scheduler_config)?)
    }
}

/// Validate `config`, build its topology and run it to completion.
///
/// Without a `limit` the source never ends, so this only returns on error.
pub fn run(config: &BenchConfig) -> Result<RunSummary, BenchError> {
    let scheduler = build(config)?.into_scheduler(config)?;
    tracing::info!(
        "bench_start: {:?}, {} kernels, {} workers, quantum {}",
        config.mode,
        config.num_kernels,
        scheduler.num_workers(),
        scheduler.quantum()
    );
    Ok(scheduler.run()?)
}

/// Graph and placement for `config`.
pub fn build(config: &BenchConfig) -> Result<Topology, BenchError> {
    config.validate()?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let topology = match config.mode {
        BenchMode::SingleCore => single_core(config, &mut rng)?,
        BenchMode::MultiKernel => multi_kernel(config, &mut rng)?,
        BenchMode::MultiKernelSimple => Topology {
            mode: ExecutionMode::Pool {
                workers: config.num_cpus,
            },
            pin_cores: false,
            ..multi_kernel(config, &mut rng)?
        },
    };
    Ok(topology)
}

/// Everything on the calling thread.
fn single_core(config: &BenchConfig, rng: &mut StdRng) -> Result<Topology, GraphError> {
    let mut graph = Graph::new();
    let mut previous = source(&mut graph, config)?;
    for _ in 0..config.num_kernels {
        previous = saxpy_after(&mut graph, previous, rng)?;
    }
    sink_after(&mut graph, previous, config)?;
    Ok(Topology {
        graph,
        mode: ExecutionMode::Sequential,
        pin_cores: false,
    })
}

/// Source and first kernel on core 0, the remaining kernels spread by
/// [`kernels_per_core`], sink on the last core.
fn multi_kernel(config: &BenchConfig, rng: &mut StdRng) -> Result<Topology, GraphError> {
    let per_core = kernels_per_core(config.num_kernels, config.num_cpus);
    let mut partition = Partition::with_workers(config.num_cpus);
    let mut graph = Graph::new();

    let source = source(&mut graph, config)?;
    for id in (0..graph.len()).map(BlockId) {
        partition.assign(0, id);
    }
    let mut previous = saxpy_after(&mut graph, source, rng)?;
    partition.assign(0, previous);

    let mut core = 0;
    let mut kernels_in_core = 1;
    for _ in 1..config.num_kernels {
        if kernels_in_core == per_core[core] {
            core += 1;
            kernels_in_core = 0;
        }
        previous = saxpy_after(&mut graph, previous, rng)?;
        partition.assign(core, previous);
        kernels_in_core += 1;
    }

    let sink = sink_after(&mut graph, previous, config)?;
    partition.assign(config.num_cpus - 1, sink);
    Ok(Topology {
        graph,
        mode: ExecutionMode::JobList(partition),
        pin_cores: config.pin_cores,
    })
}

/// Dummy source, followed by a `Head` when the run is limited. Returns the
/// block the first kernel reads from.
fn source(graph: &mut Graph, config: &BenchConfig) -> Result<BlockId, GraphError> {
    let source = graph.emplace_block(DummySource::<f32>::new());
    let Some(limit) = config.limit else {
        return Ok(source);
    };
    let head = graph.emplace_block(Head::<f32>::new(limit));
    graph.connect(source, "out", head, "in")?;
    Ok(head)
}

fn saxpy_after(
    graph: &mut Graph,
    previous: BlockId,
    rng: &mut StdRng,
) -> Result<BlockId, GraphError> {
    let saxpy = graph.emplace_block(Saxpy::new(rng.gen(), rng.gen()));
    graph.connect(previous, "out", saxpy, "in")?;
    Ok(saxpy)
}

fn sink_after(
    graph: &mut Graph,
    previous: BlockId,
    config: &BenchConfig,
) -> Result<BlockId, GraphError> {
    let sink = graph.emplace_block(BenchmarkSink::<f32>::every(config.measure_every));
    graph.connect(previous, "out", sink, "in")?;
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: BenchMode, num_kernels: usize, num_cpus: usize) -> BenchConfig {
        BenchConfig {
            mode,
            num_kernels,
            num_cpus,
            seed: Some(1),
            ..BenchConfig::default()
        }
    }

    fn jobs(topology: &Topology) -> Vec<Vec<usize>> {
        match &topology.mode {
            ExecutionMode::JobList(partition) => partition
                .jobs()
                .iter()
                .map(|list| list.iter().map(|id| id.0).collect())
                .collect(),
            other => panic!("expected job lists, got {other:?}"),
        }
    }

    #[test]
    fn single_core_is_one_sequential_chain() {
        let topology = build(&config(BenchMode::SingleCore, 3, 1)).unwrap();
        assert_eq!(topology.mode, ExecutionMode::Sequential);
        // source, three kernels, sink
        assert_eq!(topology.graph.len(), 5);
        assert_eq!(topology.graph.edges().len(), 4);
    }

    #[test]
    fn multi_kernel_places_like_the_reference_layout() {
        let topology = build(&config(BenchMode::MultiKernel, 5, 2)).unwrap();
        // ids: 0 source, 1..=5 kernels, 6 sink; kernels split 3 + 2
        assert_eq!(jobs(&topology), vec![vec![0, 1, 2, 3], vec![4, 5, 6]]);
    }

    #[test]
    fn more_cores_than_kernels_leaves_middle_cores_empty() {
        let topology = build(&config(BenchMode::MultiKernel, 1, 3)).unwrap();
        assert_eq!(jobs(&topology), vec![vec![0, 1], vec![], vec![2]]);
    }

    #[test]
    fn limit_puts_head_on_core_zero() {
        let mut cfg = config(BenchMode::MultiKernel, 2, 2);
        cfg.limit = Some(1000);
        let topology = build(&cfg).unwrap();
        assert_eq!(topology.graph.block_name(BlockId(1)), Some("Head#1"));
        assert_eq!(jobs(&topology), vec![vec![0, 1, 2], vec![3, 4]]);
    }

    #[test]
    fn simple_mode_uses_a_pool() {
        let topology = build(&config(BenchMode::MultiKernelSimple, 4, 2)).unwrap();
        assert_eq!(topology.mode, ExecutionMode::Pool { workers: 2 });
        assert!(!topology.pin_cores);
    }

    #[test]
    fn only_job_lists_are_pinned() {
        assert!(build(&config(BenchMode::MultiKernel, 4, 2)).unwrap().pin_cores);
        assert!(!build(&config(BenchMode::SingleCore, 4, 1)).unwrap().pin_cores);

        let mut unpinned = config(BenchMode::MultiKernel, 4, 2);
        unpinned.pin_cores = false;
        assert!(!build(&unpinned).unwrap().pin_cores);
    }

    #[test]
    fn limited_runs_terminate_in_every_mode() {
        for mode in [
            BenchMode::SingleCore,
            BenchMode::MultiKernel,
            BenchMode::MultiKernelSimple,
        ] {
            let mut cfg = config(mode, 3, 2);
            cfg.limit = Some(200_000);
            cfg.buffer_capacity = 4096;
            let summary = run(&cfg).unwrap();
            assert!(summary.invocations > 0, "{mode:?}");
        }
    }

    #[test]
    fn invalid_config_is_rejected_before_building() {
        let cfg = config(BenchMode::MultiKernel, 0, 2);
        assert!(matches!(build(&cfg), Err(BenchError::Config(_))));
    }
}
