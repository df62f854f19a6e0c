use crossbeam::queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of a cancellable pop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popped<T> {
    /// The next item in FIFO order
    Item(T),
    /// The queue is closed and every item has been consumed
    EndOfStream,
    /// The cancel flag was raised while waiting
    Cancelled,
}

#[derive(Debug, Default)]
struct QueueState {
    closed: bool,
}

#[derive(Debug)]
struct Shared<T> {
    items: SegQueue<T>,
    state: Mutex<QueueState>,
    ready: Condvar,
}

/// An unbounded, closeable FIFO connecting two adjacent stages.
///
/// Handles are cheap clones of the same underlying buffer. Each edge of the
/// pipeline has one producer and one consumer. Pushes never block; pops block
/// until an item arrives or the queue is closed and drained.
///
/// A queue that is never closed and never fed blocks its consumer forever, so
/// every producer must close its output when it exits.
#[derive(Debug)]
pub struct WorkQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    /// Create a new open, empty queue
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                items: SegQueue::new(),
                state: Mutex::new(QueueState::default()),
                ready: Condvar::new(),
            }),
        }
    }

    /// Append an item at the tail.
    ///
    /// Never blocks. A closed queue refuses the item and hands it back.
    pub fn push(&self, item: T) -> Result<(), T> {
        let state = self.shared.state.lock();
        if state.closed {
            return Err(item);
        }
        self.shared.items.push(item);
        drop(state);
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Block until an item is available; `None` once closed and drained
    pub fn pop(&self) -> Option<T> {
        let never = AtomicBool::new(false);
        match self.pop_or_cancel(&never) {
            Popped::Item(item) => Some(item),
            Popped::EndOfStream | Popped::Cancelled => None,
        }
    }

    /// Like [`pop`](Self::pop), but gives up with `Popped::Cancelled` once
    /// `cancel` is raised and [`interrupt`](Self::interrupt) wakes the waiter.
    ///
    /// Items already queued are returned before cancellation is observed.
    pub fn pop_or_cancel(&self, cancel: &AtomicBool) -> Popped<T> {
        loop {
            if let Some(item) = self.shared.items.pop() {
                return Popped::Item(item);
            }

            let mut state = self.shared.state.lock();
            // Re-check under the lock: a push may have landed in between.
            if !self.shared.items.is_empty() {
                continue;
            }
            if state.closed {
                return Popped::EndOfStream;
            }
            if cancel.load(Ordering::SeqCst) {
                return Popped::Cancelled;
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// Pop without blocking
    pub fn try_pop(&self) -> Option<T> {
        self.shared.items.pop()
    }

    /// Mark that no further pushes will occur and wake any waiting consumer
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        drop(state);
        self.shared.ready.notify_all();
    }

    /// Accept pushes again after a [`close`](Self::close). Only used when a
    /// stopped producer is restarted.
    pub fn reopen(&self) {
        self.shared.state.lock().closed = false;
    }

    /// Wake any blocked consumer so it re-checks its cancel flag
    pub fn interrupt(&self) {
        let _state = self.shared.state.lock();
        self.shared.ready.notify_all();
    }

    /// Get the number of items currently queued
    pub fn len(&self) -> usize {
        self.shared.items.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.shared.items.is_empty()
    }

    /// Check if the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Closed and with nothing left to pop
    pub fn is_drained(&self) -> bool {
        let state = self.shared.state.lock();
        state.closed && self.shared.items.is_empty()
    }
}
