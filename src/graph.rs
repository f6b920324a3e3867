//! Graph module: block registry and connection topology.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use crate::block::Block;
use crate::buffer::AnyBuffer;
use crate::error::GraphError;
use crate::invariant_ppt::{
    assert_invariant, BUFFER_QUANTUM_ALIGNED, GRAPH_FULLY_WIRED, GRAPH_LEGALITY,
    GRAPH_REJECTS_INVALID,
};
use crate::port::{transfer_quantum, Direction, PortSpec, MAX_QUANTUM};
use std::fmt;

/// Stable identifier of a block within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a connection (and its buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub usize);

/// One output port wired to one input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Writing block.
    pub source: BlockId,
    /// Output port index on the writing block.
    pub source_port: usize,
    /// Reading block.
    pub sink: BlockId,
    /// Input port index on the reading block.
    pub sink_port: usize,
}

struct BlockEntry {
    name: String,
    block: Box<dyn Block>,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
    input_edges: Vec<Option<ConnectionId>>,
    output_edges: Vec<Option<ConnectionId>>,
}

/// Blocks plus the connections between their ports.
///
/// Built once by the caller, then handed to a
/// [`Scheduler`](crate::scheduler::Scheduler), which finalizes it.
pub struct Graph {
    blocks: Vec<BlockEntry>,
    edges: Vec<Edge>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add a block; its id is its insertion index.
    pub fn emplace_block<B: Block>(&mut self, block: B) -> BlockId {
        let id = BlockId(self.blocks.len());
        let inputs = block.input_ports();
        let outputs = block.output_ports();
        let name = format!("{}{}", block.name(), id);
        tracing::debug!("graph_add: block {name}");
        self.blocks.push(BlockEntry {
            name,
            input_edges: vec![None; inputs.len()],
            output_edges: vec![None; outputs.len()],
            inputs,
            outputs,
            block: Box::new(block),
        });
        id
    }

    /// Wire `source.source_port` (an output) to `sink.sink_port` (an input).
    pub fn connect(
        &mut self,
        source: BlockId,
        source_port: &str,
        sink: BlockId,
        sink_port: &str,
    ) -> Result<ConnectionId, GraphError> {
        let source_index = self.port_index(source, source_port, Direction::Output)?;
        let sink_index = self.port_index(sink, sink_port, Direction::Input)?;

        let from = &self.blocks[source.0];
        let to = &self.blocks[sink.0];
        if from.output_edges[source_index].is_some() {
            return Err(GraphError::PortAlreadyConnected {
                block: from.name.clone(),
                port: source_port.to_string(),
            });
        }
        if to.input_edges[sink_index].is_some() {
            return Err(GraphError::PortAlreadyConnected {
                block: to.name.clone(),
                port: sink_port.to_string(),
            });
        }

        let source_item = from.outputs[source_index].item;
        let sink_item = to.inputs[sink_index].item;
        if source_item != sink_item {
            return Err(GraphError::TypeMismatch {
                source_type: source_item.name(),
                sink_type: sink_item.name(),
            });
        }

        if self.reaches(sink, source) {
            assert_invariant(
                GRAPH_REJECTS_INVALID,
                true,
                "Cycle detected, rejecting",
                Some("connect"),
            );
            return Err(GraphError::CycleDetected);
        }

        let id = ConnectionId(self.edges.len());
        self.edges.push(Edge {
            source,
            source_port: source_index,
            sink,
            sink_port: sink_index,
        });
        self.blocks[source.0].output_edges[source_index] = Some(id);
        self.blocks[sink.0].input_edges[sink_index] = Some(id);
        tracing::debug!(
            "graph_connect: {}.{source_port} → {}.{sink_port}",
            self.blocks[source.0].name,
            self.blocks[sink.0].name
        );

        assert_invariant(
            GRAPH_LEGALITY,
            self.blocks[sink.0].input_edges[sink_index] == Some(id),
            "Connection recorded on both ends",
            Some("connect"),
        );
        Ok(id)
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// No blocks yet.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// All block ids in insertion order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        (0..self.blocks.len()).map(BlockId).collect()
    }

    /// Display name of a block (type name plus id).
    pub fn block_name(&self, id: BlockId) -> Option<&str> {
        self.blocks.get(id.0).map(|b| b.name.as_str())
    }

    /// All connections in creation order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Check that the graph can be scheduled: non-empty, sane port
    /// constraints, every port wired.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.blocks.is_empty() {
            return Err(GraphError::EmptyGraph);
        }
        for entry in &self.blocks {
            for port in entry.inputs.iter().chain(&entry.outputs) {
                if !port.is_valid() {
                    return Err(GraphError::InvalidPortConstraint {
                        block: entry.name.clone(),
                        port: port.name.to_string(),
                    });
                }
            }
            let unwired = entry
                .inputs
                .iter()
                .zip(&entry.input_edges)
                .chain(entry.outputs.iter().zip(&entry.output_edges))
                .find(|(_, edge)| edge.is_none());
            if let Some((port, _)) = unwired {
                return Err(GraphError::UnconnectedPort {
                    block: entry.name.clone(),
                    port: port.name.to_string(),
                });
            }
        }
        assert_invariant(
            GRAPH_FULLY_WIRED,
            self.blocks.iter().all(|b| {
                b.input_edges.iter().chain(&b.output_edges).all(Option::is_some)
            }),
            "Every declared port has a connection",
            Some("validate"),
        );
        Ok(())
    }

    /// Transfer quantum every span of this graph is rounded to.
    pub fn quantum(&self) -> Result<usize, GraphError> {
        transfer_quantum(self.blocks.iter().flat_map(|b| b.inputs.iter().chain(&b.outputs)))
            .ok_or(GraphError::QuantumOverflow { limit: MAX_QUANTUM })
    }

    /// Validate and allocate one buffer per connection.
    ///
    /// Buffer capacity is `requested_capacity` rounded up to a multiple of the
    /// quantum, and never below two quanta.
    pub(crate) fn finalize(self, requested_capacity: usize) -> Result<Arena, GraphError> {
        self.validate()?;
        let quantum = self.quantum()?;
        // quantum <= MAX_QUANTUM, so 2 * quantum cannot overflow
        let capacity = requested_capacity
            .max(2 * quantum)
            .div_ceil(quantum)
            .checked_mul(quantum)
            .ok_or(GraphError::CapacityOverflow {
                requested: requested_capacity,
                quantum,
            })?;
        assert_invariant(
            BUFFER_QUANTUM_ALIGNED,
            capacity % quantum == 0 && capacity >= 2 * quantum,
            "Buffer capacity is a multiple of the quantum",
            Some("finalize"),
        );

        let buffers = self
            .edges
            .iter()
            .map(|edge| {
                self.blocks[edge.source.0].outputs[edge.source_port]
                    .item
                    .new_buffer(capacity)
            })
            .collect();
        tracing::debug!(
            "graph_finalize: {} blocks, {} buffers of {capacity} items, quantum {quantum}",
            self.blocks.len(),
            self.edges.len()
        );

        let nodes = self
            .blocks
            .into_iter()
            .map(|entry| {
                // validate() guarantees every port is wired
                let inputs = entry.input_edges.into_iter().flatten().collect();
                let outputs = entry.output_edges.into_iter().flatten().collect();
                Node {
                    name: entry.name,
                    block: entry.block,
                    inputs,
                    outputs,
                }
            })
            .collect();

        Ok(Arena {
            nodes,
            buffers,
            quantum,
        })
    }

    fn port_index(
        &self,
        id: BlockId,
        port: &str,
        direction: Direction,
    ) -> Result<usize, GraphError> {
        let entry = self.blocks.get(id.0).ok_or(GraphError::UnknownBlock(id))?;
        let (wanted, other) = match direction {
            Direction::Output => (&entry.outputs, &entry.inputs),
            Direction::Input => (&entry.inputs, &entry.outputs),
        };
        if let Some(index) = wanted.iter().position(|p| p.name == port) {
            return Ok(index);
        }
        if other.iter().any(|p| p.name == port) {
            return Err(GraphError::WrongDirection {
                block: entry.name.clone(),
                port: port.to_string(),
            });
        }
        Err(GraphError::UnknownPort {
            block: entry.name.clone(),
            port: port.to_string(),
        })
    }

    /// Whether `target` is downstream of (or equal to) `from`.
    fn reaches(&self, from: BlockId, target: BlockId) -> bool {
        let mut visited = vec![false; self.blocks.len()];
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if std::mem::replace(&mut visited[current.0], true) {
                continue;
            }
            stack.extend(
                self.edges
                    .iter()
                    .filter(|e| e.source == current)
                    .map(|e| e.sink),
            );
        }
        false
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field(
                "blocks",
                &self.blocks.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
            )
            .field("edges", &self.edges)
            .finish()
    }
}

/// A finalized block: the block itself plus the buffers it touches.
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) block: Box<dyn Block>,
    pub(crate) inputs: Vec<ConnectionId>,
    pub(crate) outputs: Vec<ConnectionId>,
}

/// Everything a run needs: blocks, buffer arena and transfer quantum.
pub(crate) struct Arena {
    pub(crate) nodes: Vec<Node>,
    pub(crate) buffers: Vec<Box<dyn AnyBuffer>>,
    pub(crate) quantum: usize,
}
