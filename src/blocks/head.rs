use crate::block::{Block, WorkIo, WorkStatus};
use crate::error::BlockError;
use crate::port::{Item, PortSpec};
use std::marker::PhantomData;

/// Passes the first `limit` items through, then finishes.
///
/// Putting one after an endless source turns a benchmark into a finite run.
#[derive(Debug)]
pub struct Head<T> {
    remaining: u64,
    _item: PhantomData<T>,
}

impl<T: Item> Head<T> {
    /// Pass `limit` items, then finish.
    pub fn new(limit: u64) -> Self {
        Self {
            remaining: limit,
            _item: PhantomData,
        }
    }
}

impl<T: Item> Block for Head<T> {
    fn name(&self) -> &str {
        "Head"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new::<T>("in")]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new::<T>("out")]
    }

    fn work(&mut self, io: &mut WorkIo<'_>) -> Result<WorkStatus, BlockError> {
        if self.remaining == 0 {
            return Ok(WorkStatus::Done);
        }
        let input = io.input(0).items::<T>()?;
        let output = io.output(0).items_mut::<T>()?;
        let n = input
            .len()
            .min(output.len())
            .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        if n == 0 {
            return Ok(if input.is_empty() {
                WorkStatus::NeedsMoreInput
            } else {
                WorkStatus::NeedsMoreOutputSpace
            });
        }
        output[..n].copy_from_slice(&input[..n]);
        io.input(0).consume(n);
        io.output(0).produce(n);
        self.remaining -= n as u64;
        Ok(if self.remaining == 0 {
            WorkStatus::Done
        } else {
            WorkStatus::Ok
        })
    }
}
