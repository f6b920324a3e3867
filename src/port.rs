//! Port metadata: item types and per-port transfer constraints.

#![forbid(unsafe_code)]

use crate::buffer::{AnyBuffer, RingBuffer};
use std::any::TypeId;
use std::fmt;

/// Element type that can flow through a connection.
pub trait Item: Copy + Default + Send + Sync + 'static {}

impl<T: Copy + Default + Send + Sync + 'static> Item for T {}

/// Runtime description of a port's element type.
#[derive(Clone, Copy)]
pub struct ItemType {
    id: TypeId,
    name: &'static str,
    size: usize,
    make_buffer: fn(usize) -> Box<dyn AnyBuffer>,
}

fn new_ring<T: Item>(capacity: usize) -> Box<dyn AnyBuffer> {
    Box::new(RingBuffer::<T>::new(capacity))
}

impl ItemType {
    /// Describe `T`.
    pub fn of<T: Item>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            make_buffer: new_ring::<T>,
        }
    }

    /// Type name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size of one item in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn new_buffer(&self, capacity: usize) -> Box<dyn AnyBuffer> {
        (self.make_buffer)(capacity)
    }
}

impl PartialEq for ItemType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ItemType {}

impl fmt::Debug for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Which side of a connection a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Consumes items from a connection.
    Input,
    /// Produces items into a connection.
    Output,
}

/// Declared shape of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Name used by [`Graph::connect`](crate::graph::Graph::connect).
    pub name: &'static str,
    /// Element type.
    pub item: ItemType,
    /// Fewest items the block accepts per invocation (ignoring empty invocations).
    pub min_items: usize,
    /// Every transfer must be a multiple of this.
    pub item_multiple: usize,
}

impl PortSpec {
    /// Port carrying `T` with no size constraint.
    pub fn new<T: Item>(name: &'static str) -> Self {
        Self {
            name,
            item: ItemType::of::<T>(),
            min_items: 1,
            item_multiple: 1,
        }
    }

    /// Require at least `n` items per invocation.
    pub fn with_min_items(mut self, n: usize) -> Self {
        self.min_items = n;
        self
    }

    /// Require transfers in multiples of `n` items.
    pub fn with_item_multiple(mut self, n: usize) -> Self {
        self.item_multiple = n;
        self
    }

    /// Whether `len` items is an acceptable non-empty transfer for this port.
    pub fn accepts(&self, len: usize) -> bool {
        len >= self.min_items && len % self.item_multiple == 0
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.min_items > 0 && self.item_multiple > 0
    }
}

/// Largest transfer quantum a graph may need, in items. Every buffer holds at
/// least two quanta.
pub const MAX_QUANTUM: usize = 1 << 20;

/// Smallest transfer size that satisfies every port in `ports`.
///
/// This is the least common multiple of all item multiples, rounded up until it
/// also covers the largest minimum. `None` when it exceeds [`MAX_QUANTUM`].
pub fn transfer_quantum<'a>(ports: impl IntoIterator<Item = &'a PortSpec>) -> Option<usize> {
    let mut multiple = 1;
    let mut minimum = 1;
    for port in ports {
        // zero constraints are rejected by graph validation
        multiple = lcm(multiple, port.item_multiple.max(1))?;
        if multiple > MAX_QUANTUM {
            return None;
        }
        minimum = minimum.max(port.min_items);
    }
    let quantum = minimum.div_ceil(multiple).checked_mul(multiple)?;
    (quantum <= MAX_QUANTUM).then_some(quantum)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn lcm(a: usize, b: usize) -> Option<usize> {
    (a / gcd(a, b)).checked_mul(b)
}
