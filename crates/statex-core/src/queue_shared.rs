//! Chunked FIFO shared by the pseudo-BFS workers.
//!
//! Workers publish and take whole chunks, so the shared lock is touched once
//! per chunk instead of once per vertex. `pending` counts items that were
//! pushed but not yet finished. It is incremented before an item becomes
//! visible to anybody and decremented only after the item has been processed
//! (in batches), so it never under-counts: reading zero means no work is left
//! anywhere, including in other workers' private chunks.

use crate::queue::WorkQueue;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DEFAULT_CHUNK: usize = 64;

#[derive(Debug)]
pub struct SharedQueue<T> {
    chunks: Mutex<VecDeque<Vec<T>>>,
    pending: AtomicUsize,
    chunk_size: usize,
}

impl<T> SharedQueue<T> {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunks: Mutex::new(VecDeque::new()),
            pending: AtomicUsize::new(0),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn handle(&self) -> QueueHandle<'_, T> {
        QueueHandle {
            shared: self,
            incoming: VecDeque::new(),
            outgoing: Vec::new(),
            finished: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// A worker's view of the shared queue.
#[derive(Debug)]
pub struct QueueHandle<'a, T> {
    shared: &'a SharedQueue<T>,
    incoming: VecDeque<T>,
    outgoing: Vec<T>,
    finished: usize,
}

impl<T> QueueHandle<'_, T> {
    /// Marks one popped item as processed.
    pub fn done(&mut self) {
        self.finished += 1;
        if self.finished >= self.shared.chunk_size {
            self.flush_finished();
        }
    }

    /// Publishes the private outgoing chunk and the finished count.
    pub fn flush(&mut self) {
        self.flush_outgoing();
        self.flush_finished();
    }

    /// True once no item is outstanding in any worker. Flushes first.
    pub fn is_finished(&mut self) -> bool {
        self.flush();
        self.incoming.is_empty() && self.shared.pending() == 0
    }

    fn flush_outgoing(&mut self) {
        if self.outgoing.is_empty() {
            return;
        }
        let chunk = std::mem::take(&mut self.outgoing);
        self.shared.chunks.lock().push_back(chunk);
    }

    fn flush_finished(&mut self) {
        if self.finished > 0 {
            self.shared.pending.fetch_sub(self.finished, Ordering::SeqCst);
            self.finished = 0;
        }
    }
}

impl<T> WorkQueue<T> for QueueHandle<'_, T> {
    fn push(&mut self, item: T) {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.outgoing.push(item);
        if self.outgoing.len() >= self.shared.chunk_size {
            self.flush_outgoing();
        }
    }

    fn pop(&mut self) -> Option<T> {
        if let Some(item) = self.incoming.pop_front() {
            return Some(item);
        }
        self.flush_outgoing();
        let chunk = self.shared.chunks.lock().pop_front()?;
        self.incoming = chunk.into();
        self.incoming.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.incoming.is_empty() && self.outgoing.is_empty() && self.shared.chunks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_come_back_in_chunk_order() {
        let queue = SharedQueue::new(2);
        let mut handle = queue.handle();
        for item in 0..5 {
            handle.push(item);
        }
        let mut seen = Vec::new();
        while let Some(item) = handle.pop() {
            seen.push(item);
            handle.done();
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(handle.is_finished());
    }

    #[test]
    fn pending_counts_unfinished_items_of_other_workers() {
        let queue = SharedQueue::new(8);
        let mut producer = queue.handle();
        let mut consumer = queue.handle();

        producer.push(1u32);
        producer.flush();
        assert_eq!(consumer.pop(), Some(1));
        // popped but not yet done: still outstanding
        assert!(!producer.is_finished());
        consumer.done();
        assert!(consumer.is_finished());
        assert!(producer.is_finished());
    }
}
