//! A process-wide, size-keyed pool of bare [`Buffer`]s.
//!
//! This replaces the original implementation's `BufferedStream._reader_pool`
//! / `_writer_pool` class-level dicts keyed by buffer size, and their
//! `_borrowed_reader` / `_borrowed_writer` context managers. The Python
//! version kept a `stream` back-reference on the borrowed object so
//! `__exit__` could decide whether to reattach it to the stream or return it
//! to the pool — a reference cycle GC had to collect. Here a borrow is a
//! scoped guard holding `&mut BufferedStream` directly; there is nothing to
//! collect, and the same retain-if-non-empty-else-return-to-pool decision is
//! made in `Drop`.

use std::collections::HashMap;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::{LazyLock, Mutex};

use crossbeam_queue::ArrayQueue;

use crate::buffer::Buffer;

const POOL_CAPACITY: usize = 128;

pub static GLOBAL_BUFFER_POOL: LazyLock<BufferPool> = LazyLock::new(BufferPool::default);

#[derive(Debug, Default)]
pub struct BufferPool {
    queues: Mutex<HashMap<usize, ArrayQueue<Buffer>>>,
}

impl BufferPool {
    /// Take a buffer of the given capacity from the pool, or allocate a
    /// fresh one if the pool for that size is empty.
    pub fn acquire(&self, capacity: usize) -> Buffer {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        match queues.get(&capacity).and_then(ArrayQueue::pop) {
            Some(buffer) => buffer,
            None => Buffer::new_empty_reader(capacity),
        }
    }

    /// Return an emptied buffer to the pool. Silently dropped if the pool
    /// for that size is already full.
    pub fn release(&self, mut buffer: Buffer) {
        buffer.clear();
        let capacity = buffer.capacity();
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let queue = queues
            .entry(capacity)
            .or_insert_with(|| ArrayQueue::new(POOL_CAPACITY));
        let _ = queue.push(buffer);
    }
}

/// A scoped, mutable borrow of a [`BufferedStream`](crate::stream::BufferedStream)'s
/// read buffer. On drop, a buffer left with unread bytes stays attached to
/// the stream (it holds a partially-consumed packet); an empty one goes back
/// to [`GLOBAL_BUFFER_POOL`].
pub struct BorrowedReader<'a> {
    pub(crate) slot: &'a mut Option<Buffer>,
    pub(crate) buffer: ManuallyDrop<Buffer>,
}

impl Deref for BorrowedReader<'_> {
    type Target = Buffer;
    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}

impl DerefMut for BorrowedReader<'_> {
    fn deref_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }
}

impl Drop for BorrowedReader<'_> {
    fn drop(&mut self) {
        // SAFETY: `buffer` is not accessed again after this take.
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        if buffer.has_remaining() {
            *self.slot = Some(buffer);
        } else {
            GLOBAL_BUFFER_POOL.release(buffer);
        }
    }
}

/// A scoped, mutable borrow of a stream's write buffer. On drop, a buffer
/// with pending unflushed writes (`position != 0`) stays attached; an empty
/// one goes back to the pool.
pub struct BorrowedWriter<'a> {
    pub(crate) slot: &'a mut Option<Buffer>,
    pub(crate) buffer: ManuallyDrop<Buffer>,
}

impl Deref for BorrowedWriter<'_> {
    type Target = Buffer;
    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}

impl DerefMut for BorrowedWriter<'_> {
    fn deref_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }
}

impl Drop for BorrowedWriter<'_> {
    fn drop(&mut self) {
        // SAFETY: `buffer` is not accessed again after this take.
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        if buffer.position() != 0 {
            *self.slot = Some(buffer);
        } else {
            GLOBAL_BUFFER_POOL.release(buffer);
        }
    }
}
