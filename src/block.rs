//! Block trait and the per-invocation I/O handed to `work`.

use crate::buffer::{AnyBuffer, ReadState, RingBuffer, Window, WriteState};
use crate::error::BlockError;
use crate::port::{Item, PortSpec};

/// Outcome of one successful `work` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkStatus {
    /// Made progress (or had nothing to do) and may run again.
    Ok,
    /// Finished for good; never invoked again.
    Done,
    /// Not enough input to satisfy the port constraints.
    NeedsMoreInput,
    /// Downstream buffer is full.
    NeedsMoreOutputSpace,
}

/// A computational stage with typed ports.
///
/// The scheduler calls `start` once, then `work` repeatedly from whichever
/// worker owns the block. A block is never invoked by two threads at once.
/// `Err` from `work` is the fatal `ERROR` status: the run fails.
pub trait Block: Send + 'static {
    /// Human-readable name for logs and errors.
    fn name(&self) -> &str;

    /// Input ports, in index order.
    fn input_ports(&self) -> Vec<PortSpec>;

    /// Output ports, in index order.
    fn output_ports(&self) -> Vec<PortSpec>;

    /// Called once before the first `work`.
    fn start(&mut self) -> Result<(), BlockError> {
        Ok(())
    }

    /// Transfer items from input spans to output spans.
    ///
    /// Record how much was taken and written with [`InputSpan::consume`] and
    /// [`OutputSpan::produce`]. Spans may be empty.
    ///
    /// An input span for which [`InputSpan::is_tail`] holds carries the last
    /// items of its stream and may break the port's size constraints. A block
    /// that takes any of a tail must take all of it; it is finished after
    /// that invocation.
    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError>;
}

/// Readable run of one input connection.
pub struct InputSpan<'a> {
    buffer: &'a dyn AnyBuffer,
    window: Window,
    closed: bool,
    tail: bool,
    consumed: usize,
}

impl<'a> InputSpan<'a> {
    pub(crate) fn new(buffer: &'a dyn AnyBuffer, state: ReadState) -> Self {
        Self {
            buffer,
            window: state.window,
            closed: state.closed,
            tail: state.tail,
            consumed: 0,
        }
    }

    /// Items available in this span.
    pub fn len(&self) -> usize {
        self.window.len
    }

    /// No items available.
    pub fn is_empty(&self) -> bool {
        self.window.len == 0
    }

    /// Upstream has finished writing; what is here may be the last of it.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Span holds the final items of a closed stream, fewer than one quantum.
    pub fn is_tail(&self) -> bool {
        self.tail
    }

    /// The available items, typed.
    pub fn items<T: Item>(&self) -> Result<&'a [T], BlockError> {
        let ring = self
            .buffer
            .as_any()
            .downcast_ref::<RingBuffer<T>>()
            .ok_or_else(|| BlockError::ItemType {
                actual: self.buffer.item_name(),
                requested: std::any::type_name::<T>(),
            })?;
        // SAFETY: this span belongs to the buffer's only reader, and the window
        // stays unread until the scheduler commits it after `work` returns.
        Ok(unsafe { ring.read_slice(self.window) })
    }

    /// Mark `n` more items as consumed.
    pub fn consume(&mut self, n: usize) {
        self.consumed = self.consumed.saturating_add(n);
    }

    /// Items consumed so far in this invocation.
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

/// Writable run of one output connection.
pub struct OutputSpan<'a> {
    buffer: &'a dyn AnyBuffer,
    window: Window,
    produced: usize,
}

impl<'a> OutputSpan<'a> {
    pub(crate) fn new(buffer: &'a dyn AnyBuffer, state: WriteState) -> Self {
        Self {
            buffer,
            window: state.window,
            produced: 0,
        }
    }

    /// Free slots in this span.
    pub fn len(&self) -> usize {
        self.window.len
    }

    /// No free slots.
    pub fn is_empty(&self) -> bool {
        self.window.len == 0
    }

    /// The free slots, typed and writable.
    pub fn items_mut<T: Item>(&mut self) -> Result<&mut [T], BlockError> {
        let ring = self
            .buffer
            .as_any()
            .downcast_ref::<RingBuffer<T>>()
            .ok_or_else(|| BlockError::ItemType {
                actual: self.buffer.item_name(),
                requested: std::any::type_name::<T>(),
            })?;
        // SAFETY: this span belongs to the buffer's only writer, and the
        // returned slice borrows `self` mutably so no second view can exist.
        Ok(unsafe { ring.write_slice(self.window) })
    }

    /// Mark `n` more items as written.
    pub fn produce(&mut self, n: usize) {
        self.produced = self.produced.saturating_add(n);
    }

    /// Items produced so far in this invocation.
    pub fn produced(&self) -> usize {
        self.produced
    }
}

/// Spans for one `work` invocation, indexed like the block's ports.
pub struct WorkIo<'a> {
    pub(crate) inputs: Vec<InputSpan<'a>>,
    pub(crate) outputs: Vec<OutputSpan<'a>>,
}

impl<'a> WorkIo<'a> {
    pub(crate) fn new(inputs: Vec<InputSpan<'a>>, outputs: Vec<OutputSpan<'a>>) -> Self {
        Self { inputs, outputs }
    }

    /// Input span for port `index`.
    ///
    /// # Panics
    /// If the block has no input port `index`.
    pub fn input(&mut self, index: usize) -> &mut InputSpan<'a> {
        &mut self.inputs[index]
    }

    /// Output span for port `index`.
    ///
    /// # Panics
    /// If the block has no output port `index`.
    pub fn output(&mut self, index: usize) -> &mut OutputSpan<'a> {
        &mut self.outputs[index]
    }

    /// Number of input spans.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output spans.
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }
}
