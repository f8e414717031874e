use std::collections::VecDeque;

/// Frontier of vertices awaiting expansion.
pub trait WorkQueue<T> {
    fn push(&mut self, item: T);
    fn pop(&mut self) -> Option<T>;
    fn is_empty(&self) -> bool;
}

/// Worker-local FIFO, used by the partitioned visitor.
#[derive(Debug)]
pub struct LocalQueue<T> {
    queue: VecDeque<T>,
}

impl<T> Default for LocalQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LocalQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<T> WorkQueue<T> for LocalQueue<T> {
    fn push(&mut self, item: T) {
        self.queue.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
