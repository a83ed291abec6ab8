//! Bounded per-destination write queue.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::codec::Priority;
use crate::error::TransportError;

/// Three-level priority queue with a shared depth bound.
///
/// Higher priorities drain first; pushes of equal priority pop FIFO, which
/// preserves per-destination send ordering. A push that would exceed the
/// depth fails with [`TransportError::Backpressure`]; the queue never
/// grows past its high-water mark.
pub struct WriteQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
    depth: usize,
}

struct QueueState {
    high: VecDeque<Vec<u8>>,
    normal: VecDeque<Vec<u8>>,
    low: VecDeque<Vec<u8>>,
    closed: bool,
}

impl QueueState {
    fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }
}

impl WriteQueue {
    pub fn new(depth: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                high: VecDeque::new(),
                normal: VecDeque::new(),
                low: VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
            depth,
        }
    }

    /// Enqueue a frame, or fail synchronously when the queue is full or
    /// closed.
    pub fn push(&self, frame: Vec<u8>, priority: Priority) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.len() >= self.depth {
            return Err(TransportError::Backpressure);
        }
        match priority {
            Priority::High => state.high.push_back(frame),
            Priority::Normal => state.normal.push_back(frame),
            Priority::Low => state.low.push_back(frame),
        }
        self.cond.notify_one();
        Ok(())
    }

    /// Block until a frame is available. `None` once the queue is closed;
    /// frames still queued at close time are discarded.
    pub fn pop(&self) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state
                .high
                .pop_front()
                .or_else(|| state.normal.pop_front())
                .or_else(|| state.low.pop_front())
            {
                return Some(frame);
            }
            self.cond.wait(&mut state);
        }
    }

    /// Close the queue and wake the writer thread.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_a_priority() {
        let q = WriteQueue::new(8);
        q.push(vec![1], Priority::Normal).unwrap();
        q.push(vec![2], Priority::Normal).unwrap();
        q.push(vec![3], Priority::Normal).unwrap();
        assert_eq!(q.pop(), Some(vec![1]));
        assert_eq!(q.pop(), Some(vec![2]));
        assert_eq!(q.pop(), Some(vec![3]));
    }

    #[test]
    fn higher_priority_drains_first() {
        let q = WriteQueue::new(8);
        q.push(vec![1], Priority::Low).unwrap();
        q.push(vec![2], Priority::Normal).unwrap();
        q.push(vec![3], Priority::High).unwrap();
        assert_eq!(q.pop(), Some(vec![3]));
        assert_eq!(q.pop(), Some(vec![2]));
        assert_eq!(q.pop(), Some(vec![1]));
    }

    #[test]
    fn full_queue_backpressures() {
        let q = WriteQueue::new(2);
        q.push(vec![1], Priority::Normal).unwrap();
        q.push(vec![2], Priority::High).unwrap();
        assert!(matches!(
            q.push(vec![3], Priority::Normal),
            Err(TransportError::Backpressure)
        ));
    }

    #[test]
    fn close_wakes_and_discards() {
        let q = std::sync::Arc::new(WriteQueue::new(4));
        q.push(vec![1], Priority::Normal).unwrap();
        q.close();
        assert_eq!(q.pop(), None);
        assert!(matches!(
            q.push(vec![2], Priority::Normal),
            Err(TransportError::Closed)
        ));
    }
}
