//! Error types for graph construction, partitioning, block execution and runs.

use crate::graph::BlockId;
use thiserror::Error;

/// Errors raised while building or validating a graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Block id does not belong to this graph.
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    /// Block has no port with this name.
    #[error("block `{block}` has no port named `{port}`")]
    UnknownPort {
        /// Block name.
        block: String,
        /// Requested port name.
        port: String,
    },

    /// Port exists but points the other way (e.g. an input used as a source).
    #[error("port `{block}.{port}` has the wrong direction for this connection")]
    WrongDirection {
        /// Block name.
        block: String,
        /// Port name.
        port: String,
    },

    /// Port already has its single connection.
    #[error("port `{block}.{port}` is already connected")]
    PortAlreadyConnected {
        /// Block name.
        block: String,
        /// Port name.
        port: String,
    },

    /// Item types of the two ports differ.
    #[error("item type mismatch: source carries `{source_type}`, sink expects `{sink_type}`")]
    TypeMismatch {
        /// Item type of the output port.
        source_type: &'static str,
        /// Item type of the input port.
        sink_type: &'static str,
    },

    /// Adding the connection would close a cycle.
    #[error("connection would create a cycle")]
    CycleDetected,

    /// A declared port was never wired.
    #[error("port `{block}.{port}` is not connected")]
    UnconnectedPort {
        /// Block name.
        block: String,
        /// Port name.
        port: String,
    },

    /// Port declares a zero minimum or multiple.
    #[error("port `{block}.{port}` declares an invalid item constraint")]
    InvalidPortConstraint {
        /// Block name.
        block: String,
        /// Port name.
        port: String,
    },

    /// Nothing to schedule.
    #[error("graph has no blocks")]
    EmptyGraph,

    /// Port constraints combine into a transfer quantum past the limit.
    #[error("port constraints need a transfer quantum above {limit} items")]
    QuantumOverflow {
        /// Largest quantum allowed.
        limit: usize,
    },

    /// Requested buffer capacity cannot be rounded to the quantum.
    #[error("buffer capacity {requested} cannot be rounded to a multiple of {quantum}")]
    CapacityOverflow {
        /// Capacity asked for.
        requested: usize,
        /// Transfer quantum of the graph.
        quantum: usize,
    },
}

/// Errors raised when a job-list partition does not cover the graph exactly once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// Partition has no worker lists at all.
    #[error("partition has no workers")]
    NoWorkers,

    /// A worker list names a block the graph does not have.
    #[error("worker {worker} lists unknown block {block}")]
    UnknownBlock {
        /// Offending block id.
        block: BlockId,
        /// Worker index.
        worker: usize,
    },

    /// A block is assigned more than once.
    #[error("block {block} assigned to worker {first} and again to worker {second}")]
    DuplicateBlock {
        /// Offending block id.
        block: BlockId,
        /// First worker holding it.
        first: usize,
        /// Worker holding the duplicate.
        second: usize,
    },

    /// A block is not assigned to any worker.
    #[error("block {0} is not assigned to any worker")]
    MissingBlock(BlockId),
}

/// Errors reported by a block from `start` or `work`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// Span accessed with an item type other than the port's.
    #[error("span carries `{actual}`, block asked for `{requested}`")]
    ItemType {
        /// Type stored in the buffer.
        actual: &'static str,
        /// Type the block requested.
        requested: &'static str,
    },

    /// Invocation violates the block's declared constraints.
    #[error("contract violation: {0}")]
    Contract(String),

    /// Unrecoverable block failure.
    #[error("{0}")]
    Failed(String),
}

/// Errors that stop a scheduler from being built or from completing a run.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Topology is invalid.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Job list is invalid.
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// Pool mode requested with zero threads.
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    /// A block's start hook failed.
    #[error("block `{block}` failed to start: {source}")]
    Start {
        /// Block name.
        block: String,
        /// Underlying error.
        source: BlockError,
    },

    /// A block's work function returned an error.
    #[error("block `{block}` failed: {source}")]
    Block {
        /// Block name.
        block: String,
        /// Underlying error.
        source: BlockError,
    },

    /// A block committed counts the scheduler never offered.
    #[error("block `{block}` broke the span contract: {detail}")]
    ContractViolation {
        /// Block name.
        block: String,
        /// What was violated.
        detail: String,
    },

    /// A block stopped short of the closed tail of one of its inputs.
    #[error("block `{block}` left {left} tail items of a closed input unread")]
    TailNotDrained {
        /// Block name.
        block: String,
        /// Items that would have been lost.
        left: usize,
    },

    /// Worker thread could not be created.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker thread panicked.
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Errors loading a benchmark configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// TOML could not be parsed into a config.
    #[error("invalid benchmark config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but make no sense together.
    #[error("invalid benchmark config: {0}")]
    Invalid(String),
}

/// Errors from building and running a benchmark topology.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Topology construction failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Scheduler construction or run failed.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
