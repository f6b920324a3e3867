//! Streaming dataflow kernel for throughput micro-benchmarks.
//!
//! Blocks with typed ports are wired into an acyclic [`Graph`]; a
//! [`Scheduler`] then runs them sequentially, on a thread pool, or on
//! explicit per-thread job lists, moving samples through bounded SPSC ring
//! buffers.

pub mod bench;
pub mod block;
pub mod blocks;
pub mod buffer;
pub mod config;
pub mod error;
pub mod graph;
#[doc(hidden)]
pub mod invariant_ppt;
pub mod kernels;
pub mod partition;
pub mod port;
pub mod scheduler;

pub use block::{Block, InputSpan, OutputSpan, WorkIo, WorkStatus};
pub use config::{BenchConfig, BenchMode, SchedulerConfig};
pub use error::{BenchError, BlockError, ConfigError, GraphError, PartitionError, SchedulerError};
pub use graph::{BlockId, ConnectionId, Edge, Graph};
pub use partition::{kernels_per_core, Partition};
pub use port::{Item, ItemType, PortSpec};
pub use scheduler::{ExecutionMode, RunSummary, Scheduler};
