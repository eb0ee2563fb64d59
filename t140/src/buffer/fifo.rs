//! Bounded blocking FIFO shared between threads

use network::{NetworkError, Result};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct FifoState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Blocking queue with a fixed capacity.
///
/// `put` waits while the queue is full, `get` while it is empty. After
/// [`close`](FifoBuffer::close) producers fail with [`NetworkError::Closed`]
/// and consumers drain what is left before failing the same way.
pub struct FifoBuffer<T> {
    state: Mutex<FifoState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> FifoBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(FifoState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FifoState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `item`, waiting for room.
    pub fn put(&self, item: T) -> Result<()> {
        let mut state = self.lock();
        while state.items.len() >= self.capacity && !state.closed {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if state.closed {
            return Err(NetworkError::Closed);
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends `item` only if there is room. A full queue hands the item back.
    pub fn try_put(&self, item: T) -> Result<std::result::Result<(), T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(NetworkError::Closed);
        }
        if state.items.len() >= self.capacity {
            return Ok(Err(item));
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(Ok(()))
    }

    /// Removes the oldest item, waiting until one is available.
    pub fn get(&self) -> Result<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(NetworkError::Closed);
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Like [`get`](FifoBuffer::get) but gives up after `timeout` with `Ok(None)`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Ok(Some(item));
            }
            if state.closed {
                return Err(NetworkError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            state = self
                .not_empty
                .wait_timeout(state, remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }
    }

    pub fn try_get(&self) -> Option<T> {
        let mut state = self.lock();
        let item = state.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Wakes every waiter. Items already queued can still be taken.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
