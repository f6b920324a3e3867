//! Bounded single-producer/single-consumer ring buffers joining two ports.
//!
//! A buffer lives in the graph's connection arena for the whole lifetime of the
//! graph. Exactly one block writes it and exactly one block reads it; the two
//! may run on different worker threads, so the cursors and flags are atomics:
//!
//! - the writer fills slots, then publishes them by storing the write cursor
//!   with `Release`;
//! - the reader loads the write cursor with `Acquire` before touching slots,
//!   and hands slots back by storing the read cursor with `Release`;
//! - the writer-closed flag is stored after the final write cursor update and
//!   loaded before the write cursor, so a reader that sees it closed also sees
//!   every item written before the close.
//!
//! Cursors count items ever transferred and never wrap in practice; the slot
//! index is the cursor modulo capacity. Spans handed to blocks are always
//! contiguous: they stop at the ring's wrap point and are rounded down to the
//! graph's transfer quantum. The one exception is the tail of a closed stream:
//! once fewer than one quantum is left, the reader is offered all of it.

use crate::port::Item;
use std::any::Any;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Contiguous run of slots: start index in the ring and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    /// Slot index of the first item.
    pub offset: usize,
    /// Number of items.
    pub len: usize,
}

/// Reader's view of a buffer at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadState {
    /// Quantum-aligned contiguous readable run.
    pub window: Window,
    /// Total unread items, including any that do not fit the window.
    pub unread: usize,
    /// Writer has closed the buffer.
    pub closed: bool,
    /// Window is the closed stream's last run, shorter than one quantum.
    pub tail: bool,
}

impl ReadState {
    /// Writer is gone and every item has been read.
    pub fn is_exhausted(&self) -> bool {
        self.closed && self.unread == 0
    }
}

/// Writer's view of a buffer at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteState {
    /// Quantum-aligned contiguous writable run.
    pub window: Window,
    /// Reader has detached; nothing written will ever be read.
    pub detached: bool,
}

/// Type-erased buffer operations used by the graph and scheduler.
pub(crate) trait AnyBuffer: Send + Sync {
    fn item_name(&self) -> &'static str;
    fn capacity(&self) -> usize;
    fn read_state(&self, quantum: usize) -> ReadState;
    fn write_state(&self, quantum: usize) -> WriteState;
    fn commit_read(&self, n: usize);
    fn commit_write(&self, n: usize);
    fn close_writer(&self);
    fn detach_reader(&self);
    fn as_any(&self) -> &dyn Any;
}

/// Fixed-capacity SPSC ring of `T`.
pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    read: AtomicUsize,
    write: AtomicUsize,
    writer_closed: AtomicBool,
    reader_detached: AtomicBool,
}

// SAFETY: slots are only touched through `read_slice`/`write_slice`, whose
// callers uphold the single-reader/single-writer discipline; the cursors keep
// the reader's and writer's regions disjoint.
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T: Item> RingBuffer<T> {
    /// Allocate a ring of `capacity` default-initialized slots.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        let slots = (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();
        Self {
            slots,
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            writer_closed: AtomicBool::new(false),
            reader_detached: AtomicBool::new(false),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Items written and not yet read.
    pub fn len(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        self.write.load(Ordering::Acquire).wrapping_sub(read)
    }

    /// No unread items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writer has closed the buffer.
    pub fn is_closed(&self) -> bool {
        self.writer_closed.load(Ordering::Acquire)
    }

    fn read_window(&self, quantum: usize, closed: bool) -> (Window, usize, bool) {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        let unread = write.wrapping_sub(read);
        let offset = read % self.capacity();
        let contiguous = unread.min(self.capacity() - offset);
        let aligned = contiguous - contiguous % quantum;
        let tail = closed && aligned == 0 && contiguous > 0;
        let len = if tail { contiguous } else { aligned };
        (Window { offset, len }, unread, tail)
    }

    fn write_window(&self, quantum: usize) -> Window {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        let free = self.capacity() - write.wrapping_sub(read);
        let offset = write % self.capacity();
        let contiguous = free.min(self.capacity() - offset);
        Window {
            offset,
            len: contiguous - contiguous % quantum,
        }
    }

    /// View of readable slots.
    ///
    /// # Safety
    /// Only the reader may call this, with a window taken from `read_state`
    /// that has not been committed yet.
    pub(crate) unsafe fn read_slice(&self, window: Window) -> &[T] {
        debug_assert!(window.offset + window.len <= self.capacity());
        // SAFETY: `UnsafeCell<T>` has the layout of `T`, the window is in bounds,
        // and the writer never touches unread slots.
        unsafe {
            let ptr = UnsafeCell::raw_get(self.slots.as_ptr().add(window.offset));
            std::slice::from_raw_parts(ptr as *const T, window.len)
        }
    }

    /// Mutable view of free slots.
    ///
    /// # Safety
    /// Only the writer may call this, with a window taken from `write_state`
    /// that has not been committed yet, and no other view of the same window
    /// may be alive.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn write_slice(&self, window: Window) -> &mut [T] {
        debug_assert!(window.offset + window.len <= self.capacity());
        // SAFETY: as for `read_slice`; free slots are never read until the
        // write cursor publishes them.
        unsafe {
            let ptr = UnsafeCell::raw_get(self.slots.as_ptr().add(window.offset));
            std::slice::from_raw_parts_mut(ptr, window.len)
        }
    }
}

impl<T: Item> AnyBuffer for RingBuffer<T> {
    fn item_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn read_state(&self, quantum: usize) -> ReadState {
        // closed flag first: see module docs
        let closed = self.writer_closed.load(Ordering::Acquire);
        let (window, unread, tail) = self.read_window(quantum, closed);
        ReadState {
            window,
            unread,
            closed,
            tail,
        }
    }

    fn write_state(&self, quantum: usize) -> WriteState {
        WriteState {
            window: self.write_window(quantum),
            detached: self.reader_detached.load(Ordering::Acquire),
        }
    }

    fn commit_read(&self, n: usize) {
        let read = self.read.load(Ordering::Relaxed);
        debug_assert!(n <= self.write.load(Ordering::Acquire).wrapping_sub(read));
        self.read.store(read.wrapping_add(n), Ordering::Release);
    }

    fn commit_write(&self, n: usize) {
        let write = self.write.load(Ordering::Relaxed);
        debug_assert!(
            write.wrapping_add(n).wrapping_sub(self.read.load(Ordering::Acquire))
                <= self.capacity()
        );
        self.write.store(write.wrapping_add(n), Ordering::Release);
    }

    fn close_writer(&self) {
        self.writer_closed.store(true, Ordering::Release);
    }

    fn detach_reader(&self) {
        self.reader_detached.store(true, Ordering::Release);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.slots.len())
            .field("read", &self.read.load(Ordering::Relaxed))
            .field("write", &self.write.load(Ordering::Relaxed))
            .field("writer_closed", &self.writer_closed.load(Ordering::Relaxed))
            .finish()
    }
}
