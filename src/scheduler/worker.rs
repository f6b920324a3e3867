//! Worker loops and single-block invocation.
//!
//! IMPORTANT: nothing in this file may call `assert_invariant` or touch the
//! invariant log; it runs once per block invocation on every worker.

use crate::block::{InputSpan, OutputSpan, WorkIo, WorkStatus};
use crate::buffer::AnyBuffer;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::graph::{BlockId, ConnectionId, Node};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

/// A block plus its lifecycle flag.
pub(crate) struct BlockSlot {
    node: Node,
    finished: bool,
}

impl BlockSlot {
    pub(crate) fn new(node: Node) -> Self {
        Self {
            node,
            finished: false,
        }
    }
}

/// Result of visiting one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Pool only: block was not ready, `work` not called.
    Waiting,
    /// `work` was called.
    Ran { progress: bool },
    /// Block finished during this visit.
    Finished { invoked: bool },
}

impl Step {
    fn invocations(self) -> u64 {
        match self {
            Step::Waiting | Step::Finished { invoked: false } => 0,
            Step::Ran { .. } | Step::Finished { invoked: true } => 1,
        }
    }

    fn is_progress(self) -> bool {
        match self {
            Step::Waiting => false,
            Step::Ran { progress } => progress,
            Step::Finished { .. } => true,
        }
    }
}

/// Yield for a while, then sleep, until progress resets it.
struct Backoff<'a> {
    config: &'a SchedulerConfig,
    rounds: u32,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a SchedulerConfig) -> Self {
        Self { config, rounds: 0 }
    }

    fn reset(&mut self) {
        self.rounds = 0;
    }

    fn snooze(&mut self) {
        if self.rounds < self.config.spin_rounds {
            self.rounds += 1;
            thread::yield_now();
        } else {
            thread::sleep(self.config.idle_sleep);
        }
    }
}

/// State every worker of one run sees.
pub(crate) struct Shared<'a> {
    slots: Vec<Mutex<BlockSlot>>,
    buffers: &'a [Box<dyn AnyBuffer>],
    quantum: usize,
    config: &'a SchedulerConfig,
    unfinished: AtomicUsize,
    failed: AtomicBool,
    error: Mutex<Option<SchedulerError>>,
}

impl<'a> Shared<'a> {
    pub(crate) fn new(
        slots: Vec<BlockSlot>,
        buffers: &'a [Box<dyn AnyBuffer>],
        quantum: usize,
        config: &'a SchedulerConfig,
    ) -> Self {
        Self {
            unfinished: AtomicUsize::new(slots.len()),
            slots: slots.into_iter().map(Mutex::new).collect(),
            buffers,
            quantum,
            config,
            failed: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    pub(crate) fn num_blocks(&self) -> usize {
        self.slots.len()
    }

    /// Record `err` if it is the first, and tell every worker to stop.
    pub(crate) fn fail(&self, err: SchedulerError) {
        let mut first = self.error.lock();
        if first.is_none() {
            tracing::debug!("run_failing: {err}");
            *first = Some(err);
        }
        self.failed.store(true, Ordering::Release);
    }

    /// First recorded error, if the run failed.
    pub(crate) fn into_error(self) -> Option<SchedulerError> {
        self.error.into_inner()
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn buffer(&self, id: ConnectionId) -> &'a dyn AnyBuffer {
        let buffers: &'a [Box<dyn AnyBuffer>] = self.buffers;
        buffers[id.0].as_ref()
    }

    /// Job-list worker: own `ids` for the whole run and visit them in order,
    /// round-robin, until they are all finished or the run fails.
    pub(crate) fn run_job_list(&self, ids: &[BlockId]) -> u64 {
        let mut owned: Vec<MutexGuard<'_, BlockSlot>> =
            ids.iter().map(|id| self.slots[id.0].lock()).collect();
        let mut backoff = Backoff::new(self.config);
        let mut invocations = 0;
        while !self.has_failed() && owned.iter().any(|slot| !slot.finished) {
            let mut progress = false;
            for slot in owned.iter_mut().filter(|slot| !slot.finished) {
                match self.invoke(slot) {
                    Ok(step) => {
                        invocations += step.invocations();
                        progress |= step.is_progress();
                    }
                    Err(err) => {
                        self.fail(err);
                        return invocations + 1;
                    }
                }
            }
            if progress {
                backoff.reset();
            } else {
                backoff.snooze();
            }
        }
        invocations
    }

    /// Pool worker: claim blocks from `ready`, invoke the ready ones, and put
    /// unfinished ones back.
    pub(crate) fn run_pool(&self, ready: &Mutex<VecDeque<BlockId>>) -> u64 {
        let mut backoff = Backoff::new(self.config);
        let mut invocations = 0;
        let mut idle_visits = 0;
        while !self.has_failed() && self.unfinished.load(Ordering::Acquire) > 0 {
            let claimed = ready.lock().pop_front();
            let Some(id) = claimed else {
                backoff.snooze();
                continue;
            };
            let mut slot = self.slots[id.0].lock();
            let step = if self.is_ready(&slot.node) {
                self.invoke(&mut slot)
            } else {
                Ok(Step::Waiting)
            };
            let finished = slot.finished;
            drop(slot);

            let step = match step {
                Ok(step) => step,
                Err(err) => {
                    self.fail(err);
                    return invocations + 1;
                }
            };
            invocations += step.invocations();
            if !finished {
                ready.lock().push_back(id);
            }
            if step.is_progress() {
                idle_visits = 0;
                backoff.reset();
            } else {
                idle_visits += 1;
                // a full rotation without progress
                if idle_visits >= self.slots.len() {
                    idle_visits = 0;
                    backoff.snooze();
                }
            }
        }
        invocations
    }

    /// Every input can fill a span or is exhausted, and every output can
    /// take a span or has lost its reader.
    fn is_ready(&self, node: &Node) -> bool {
        let q = self.quantum;
        node.inputs.iter().all(|&c| {
            let state = self.buffer(c).read_state(q);
            state.window.len > 0 || state.is_exhausted()
        }) && node.outputs.iter().all(|&c| {
            let state = self.buffer(c).write_state(q);
            state.window.len > 0 || state.detached
        })
    }

    /// Visit one block: finish it if its streams ended, otherwise call
    /// `work` once and commit what it consumed and produced.
    fn invoke(&self, slot: &mut BlockSlot) -> Result<Step, SchedulerError> {
        if slot.finished {
            return Ok(Step::Waiting);
        }
        if self.streams_ended(&slot.node) {
            self.finish(slot);
            return Ok(Step::Finished { invoked: false });
        }

        let q = self.quantum;
        let node = &mut slot.node;
        let inputs = node
            .inputs
            .iter()
            .map(|&c| {
                let buffer = self.buffer(c);
                InputSpan::new(buffer, buffer.read_state(q))
            })
            .collect();
        let outputs = node
            .outputs
            .iter()
            .map(|&c| {
                let buffer = self.buffer(c);
                OutputSpan::new(buffer, buffer.write_state(q))
            })
            .collect();
        let mut io = WorkIo::new(inputs, outputs);

        let status = node
            .block
            .work(&mut io)
            .map_err(|source| SchedulerError::Block {
                block: node.name.clone(),
                source,
            })?;
        let done = status == WorkStatus::Done;
        let draining = io.inputs.iter().any(|s| s.is_tail() && s.consumed() > 0);
        let finishing = done || draining;
        if !finishing {
            stalled_on_tail(&node.name, &io.inputs, status)?;
        }

        let mut moved = 0;
        for (span, &c) in io.inputs.iter().zip(&node.inputs) {
            check_commit(&node.name, "consumed", span.consumed(), span.len(), q, finishing)?;
            self.buffer(c).commit_read(span.consumed());
            moved += span.consumed();
        }
        for (span, &c) in io.outputs.iter().zip(&node.outputs) {
            check_commit(&node.name, "produced", span.produced(), span.len(), q, finishing)?;
            self.buffer(c).commit_write(span.produced());
            moved += span.produced();
        }
        if draining && !done {
            check_drained(&node.name, &io.inputs)?;
        }

        if finishing {
            self.finish(slot);
            return Ok(Step::Finished { invoked: true });
        }
        Ok(Step::Ran {
            progress: moved > 0,
        })
    }

    /// Some input is exhausted, or every output's reader is gone.
    fn streams_ended(&self, node: &Node) -> bool {
        let q = self.quantum;
        let exhausted = node
            .inputs
            .iter()
            .any(|&c| self.buffer(c).read_state(q).is_exhausted());
        let orphaned = !node.outputs.is_empty()
            && node
                .outputs
                .iter()
                .all(|&c| self.buffer(c).write_state(q).detached);
        exhausted || orphaned
    }

    fn finish(&self, slot: &mut BlockSlot) {
        slot.finished = true;
        for &c in &slot.node.outputs {
            self.buffer(c).close_writer();
        }
        for &c in &slot.node.inputs {
            self.buffer(c).detach_reader();
        }
        self.unfinished.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!("block_finished: {}", slot.node.name);
    }
}

/// A commit may never exceed the span, and must stay quantum-aligned unless
/// the block is finishing.
fn check_commit(
    block: &str,
    what: &str,
    count: usize,
    offered: usize,
    quantum: usize,
    finishing: bool,
) -> Result<(), SchedulerError> {
    let detail = if count > offered {
        format!("{what} {count} items from a span of {offered}")
    } else if !finishing && count % quantum != 0 {
        format!("{what} {count} items, not a multiple of the quantum {quantum}")
    } else {
        return Ok(());
    };
    Err(SchedulerError::ContractViolation {
        block: block.to_string(),
        detail,
    })
}

/// A block that took part of a tail without finishing would strand the rest.
fn check_drained(block: &str, inputs: &[InputSpan<'_>]) -> Result<(), SchedulerError> {
    let left: usize = inputs
        .iter()
        .filter(|s| s.is_tail() && s.consumed() > 0)
        .map(|s| s.len() - s.consumed())
        .sum();
    if left == 0 {
        return Ok(());
    }
    Err(SchedulerError::TailNotDrained {
        block: block.to_string(),
        left,
    })
}

/// Asking for more input when every input holds only its final tail can
/// never be satisfied.
fn stalled_on_tail(
    block: &str,
    inputs: &[InputSpan<'_>],
    status: WorkStatus,
) -> Result<(), SchedulerError> {
    if status != WorkStatus::NeedsMoreInput
        || inputs.is_empty()
        || !inputs.iter().all(InputSpan::is_tail)
    {
        return Ok(());
    }
    Err(SchedulerError::TailNotDrained {
        block: block.to_string(),
        left: inputs.iter().map(InputSpan::len).sum(),
    })
}
