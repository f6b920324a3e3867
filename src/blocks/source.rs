use crate::block::{Block, WorkIo, WorkStatus};
use crate::error::BlockError;
use crate::port::{Item, PortSpec};
use std::marker::PhantomData;

/// Publishes every free slot without writing it; never finishes.
///
/// Downstream sees whatever the ring held before, which is fine for a
/// throughput benchmark that only counts items.
#[derive(Debug)]
pub struct DummySource<T> {
    _item: PhantomData<T>,
}

impl<T: Item> DummySource<T> {
    /// Endless source of untouched slots.
    pub fn new() -> Self {
        Self { _item: PhantomData }
    }
}

impl<T: Item> Default for DummySource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Block for DummySource<T> {
    fn name(&self) -> &str {
        "DummySource"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new::<T>("out")]
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        let out = io.output(0);
        let len = out.len();
        if len == 0 {
            return Ok(WorkStatus::NeedsMoreOutputSpace);
        }
        out.produce(len);
        Ok(WorkStatus::Ok)
    }
}

/// Emits `count` copies of one value, then finishes.
#[derive(Debug)]
pub struct ConstantSource<T> {
    value: T,
    remaining: u64,
}

impl<T: Item> ConstantSource<T> {
    /// Emit `value` `count` times.
    pub fn new(value: T, count: u64) -> Self {
        Self {
            value,
            remaining: count,
        }
    }
}

impl<T: Item> Block for ConstantSource<T> {
    fn name(&self) -> &str {
        "ConstantSource"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new::<T>("out")]
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        if self.remaining == 0 {
            return Ok(WorkStatus::Done);
        }
        let out = io.output(0);
        let slots = out.items_mut::<T>()?;
        if slots.is_empty() {
            return Ok(WorkStatus::NeedsMoreOutputSpace);
        }
        let n = slots
            .len()
            .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        slots[..n].fill(self.value);
        out.produce(n);
        self.remaining -= n as u64;
        Ok(if self.remaining == 0 {
            WorkStatus::Done
        } else {
            WorkStatus::Ok
        })
    }
}

/// Emits the items of a vector in order, then finishes.
#[derive(Debug)]
pub struct VectorSource<T> {
    items: Vec<T>,
    position: usize,
}

impl<T: Item> VectorSource<T> {
    /// Emit `items` in order.
    pub fn new(items: Vec<T>) -> Self {
        Self { items, position: 0 }
    }
}

impl<T: Item> Block for VectorSource<T> {
    fn name(&self) -> &str {
        "VectorSource"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new::<T>("out")]
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        let pending = &self.items[self.position..];
        if pending.is_empty() {
            return Ok(WorkStatus::Done);
        }
        let out = io.output(0);
        let slots = out.items_mut::<T>()?;
        if slots.is_empty() {
            return Ok(WorkStatus::NeedsMoreOutputSpace);
        }
        let n = slots.len().min(pending.len());
        slots[..n].copy_from_slice(&pending[..n]);
        out.produce(n);
        self.position += n;
        Ok(if self.position == self.items.len() {
            WorkStatus::Done
        } else {
            WorkStatus::Ok
        })
    }
}
