//! Scheduler module: runs a finalized graph on one or more worker threads.
//!
//! Construction validates everything (topology, partition, worker count) so
//! that a bad setup never reaches `run`. The per-invocation machinery lives
//! in `worker`, which stays free of invariant logging.

mod worker;

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::graph::{Arena, BlockId, Graph};
use crate::invariant_ppt::{assert_invariant, BLOCKS_STARTED};
use crate::partition::Partition;
use core_affinity::CoreId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use worker::{BlockSlot, Shared};

/// How blocks are placed on threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Calling thread runs every block in graph order.
    Sequential,
    /// `workers` threads pick ready blocks from a shared set.
    Pool {
        /// Thread count, at least 1.
        workers: usize,
    },
    /// One thread per job list, running exactly its blocks.
    JobList(Partition),
}

/// What a completed run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Total `work` invocations across all blocks.
    pub invocations: u64,
    /// Wall time from the first invocation to the end of the run.
    pub elapsed: Duration,
}

#[derive(Debug)]
enum Placement {
    Inline(Vec<BlockId>),
    Lists(Vec<Vec<BlockId>>),
    Pool(usize),
}

/// A graph bound to a placement, ready to run once.
pub struct Scheduler {
    arena: Arena,
    placement: Placement,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Bind `graph` to `mode` with default tuning.
    pub fn new(graph: Graph, mode: ExecutionMode) -> Result<Self, SchedulerError> {
        Self::with_config(graph, mode, SchedulerConfig::default())
    }

    /// Bind `graph` to `mode`, validating the topology and placement and
    /// allocating the connection buffers.
    pub fn with_config(
        graph: Graph,
        mode: ExecutionMode,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        graph.validate()?;
        let placement = match mode {
            ExecutionMode::Sequential => Placement::Inline(graph.block_ids()),
            ExecutionMode::Pool { workers: 0 } => return Err(SchedulerError::InvalidWorkerCount),
            ExecutionMode::Pool { workers } => Placement::Pool(workers),
            ExecutionMode::JobList(partition) => {
                partition.validate(&graph)?;
                Placement::Lists(partition.jobs().to_vec())
            }
        };
        let arena = graph.finalize(config.buffer_capacity)?;
        tracing::debug!(
            "scheduler_new: {} blocks, placement {placement:?}",
            arena.nodes.len()
        );
        Ok(Self {
            arena,
            placement,
            config,
        })
    }

    /// Transfer quantum of the bound graph.
    pub fn quantum(&self) -> usize {
        self.arena.quantum
    }

    /// Capacity of every connection buffer, after rounding.
    pub fn buffer_capacity(&self) -> Option<usize> {
        self.arena.buffers.first().map(|b| b.capacity())
    }

    /// Threads `run` will use; the sequential mode uses the caller's.
    pub fn num_workers(&self) -> usize {
        match &self.placement {
            Placement::Inline(_) => 1,
            Placement::Lists(lists) => lists.len(),
            Placement::Pool(workers) => *workers,
        }
    }

    /// Start every block, then run until all blocks finish or one fails.
    ///
    /// Blocks are started in graph order on the calling thread; a failing
    /// `start` ends the run before any `work` call.
    pub fn run(self) -> Result<RunSummary, SchedulerError> {
        let Scheduler {
            arena,
            placement,
            config,
        } = self;
        let Arena {
            nodes,
            buffers,
            quantum,
        } = arena;

        let total = nodes.len();
        let mut slots = Vec::with_capacity(total);
        for mut node in nodes {
            node.block
                .start()
                .map_err(|source| SchedulerError::Start {
                    block: node.name.clone(),
                    source,
                })?;
            slots.push(BlockSlot::new(node));
        }
        assert_invariant(
            BLOCKS_STARTED,
            slots.len() == total,
            "Every block started before the first invocation",
            Some("run"),
        );

        let shared = Shared::new(slots, &buffers, quantum, &config);
        let started = Instant::now();
        let invocations = match &placement {
            Placement::Inline(ids) => {
                panic::catch_unwind(AssertUnwindSafe(|| shared.run_job_list(ids)))
                    .unwrap_or_else(|_| {
                        shared.fail(SchedulerError::WorkerPanicked(0));
                        0
                    })
            }
            Placement::Lists(lists) => {
                let cores = if config.pin_cores {
                    pinnable_cores()
                } else {
                    Vec::new()
                };
                spawn_workers(&shared, lists.len(), |i| {
                    if !cores.is_empty() {
                        pin_current(i, cores[i % cores.len()]);
                    }
                    shared.run_job_list(&lists[i])
                })
            }
            Placement::Pool(workers) => {
                let ready: Mutex<VecDeque<BlockId>> =
                    Mutex::new((0..shared.num_blocks()).map(BlockId).collect());
                spawn_workers(&shared, *workers, |_| shared.run_pool(&ready))
            }
        };
        let elapsed = started.elapsed();

        if let Some(err) = shared.into_error() {
            tracing::error!("run_failed: {err}");
            return Err(err);
        }
        tracing::info!(
            invocations,
            elapsed_ms = elapsed.as_millis() as u64,
            "run_complete"
        );
        Ok(RunSummary {
            invocations,
            elapsed,
        })
    }
}

/// Cores job-list workers may be pinned to; empty when the OS reports none.
fn pinnable_cores() -> Vec<CoreId> {
    let cores = core_affinity::get_core_ids().unwrap_or_default();
    if cores.is_empty() {
        tracing::warn!("pin_cores: no CPU cores reported, workers run unpinned");
    }
    cores
}

fn pin_current(worker: usize, core: CoreId) {
    if core_affinity::set_for_current(core) {
        tracing::debug!("worker_pinned: worker {worker} on core {}", core.id);
    } else {
        tracing::warn!("pin_failed: worker {worker} could not move to core {}", core.id);
    }
}

/// Run `body(i)` for `i in 0..workers` on scoped threads and sum the
/// invocation counts. Spawn failures and panics are recorded on `shared`.
fn spawn_workers<F>(shared: &Shared<'_>, workers: usize, body: F) -> u64
where
    F: Fn(usize) -> u64 + Sync,
{
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let body = &body;
            let spawned = thread::Builder::new()
                .name(format!("flowbench-worker-{index}"))
                .spawn_scoped(scope, move || {
                    panic::catch_unwind(AssertUnwindSafe(|| body(index))).unwrap_or_else(|_| {
                        shared.fail(SchedulerError::WorkerPanicked(index));
                        0
                    })
                });
            match spawned {
                Ok(handle) => handles.push((index, handle)),
                Err(err) => {
                    shared.fail(SchedulerError::Spawn(err));
                    break;
                }
            }
        }
        handles
            .into_iter()
            .map(|(index, handle)| {
                handle.join().unwrap_or_else(|_| {
                    shared.fail(SchedulerError::WorkerPanicked(index));
                    0
                })
            })
            .sum()
    })
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("blocks", &self.arena.nodes.len())
            .field("quantum", &self.arena.quantum)
            .field("placement", &self.placement)
            .field("config", &self.config)
            .finish()
    }
}
