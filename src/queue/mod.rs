// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded blocking byte queue shared between engine-owned producers and
//! session-owned consumers.
//!
//! Graph endpoints run inside the engine, but the threads that forward their
//! output to remote callers must never need engine access to read it. Each
//! observable endpoint therefore writes serialized events into a
//! [`BlockingQueue`] that any native thread can pop from. Command endpoints use
//! the same type in the opposite direction.
//!
//! # Lifecycle
//!
//! ```text
//! open ──push/pop──▶ open ──close_and_wake()──▶ closed ──pop until empty──▶ drained
//! ```
//!
//! * Once closed, `push` is rejected with [`QueueError::Closed`] and the item
//!   is dropped. Items already buffered stay poppable.
//! * `pop_blocking` returns `None` only when the queue is closed **and** empty,
//!   so a consumer that loops until `None` sees every item pushed before close.
//! * The buffered byte total is bounded by the capacity given at construction.
//!   An item that would exceed it is rejected with
//!   [`QueueError::CapacityExceeded`]; the producer reports it to the operator.
//!
//! # Ownership
//!
//! Queues are shared as [`QueueHandle`]s. The session owns deletion: it drops
//! its handles only after joining every thread that could still be blocked in
//! `pop_blocking`.
//!
//! # Example
//!
//! ```rust
//! use flowstream::queue::BlockingQueue;
//!
//! let queue = BlockingQueue::new(1024);
//! queue.push(b"frame".to_vec()).unwrap();
//! queue.close_and_wake();
//!
//! assert_eq!(queue.pop_blocking(), Some(b"frame".to_vec()));
//! assert_eq!(queue.pop_blocking(), None);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::errors::QueueError;

/// Shared handle to a queue. Dropping the last handle releases it.
pub type QueueHandle = Arc<BlockingQueue>;

#[derive(Default)]
struct QueueState {
    items: VecDeque<Vec<u8>>,
    buffered_bytes: usize,
    closed: bool,
}

/// Thread-safe FIFO of byte strings with close-and-drain semantics.
pub struct BlockingQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl BlockingQueue {
    /// Creates an open queue that buffers at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
        }
    }

    /// Creates a queue already wrapped in a [`QueueHandle`].
    pub fn handle(capacity: usize) -> QueueHandle {
        Arc::new(Self::new(capacity))
    }

    // A panic while holding the lock cannot leave the state half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends an item and wakes one waiter.
    pub fn push(&self, item: Vec<u8>) -> Result<(), QueueError> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        if state.buffered_bytes + item.len() > self.capacity {
            return Err(QueueError::CapacityExceeded {
                capacity: self.capacity,
                buffered: state.buffered_bytes,
                item: item.len(),
            });
        }
        state.buffered_bytes += item.len();
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Returns the next item without waiting.
    pub fn pop_nonblocking(&self) -> Option<Vec<u8>> {
        let mut state = self.lock();
        Self::take_front(&mut state)
    }

    /// Waits for the next item.
    ///
    /// Returns `None` once the queue is closed and everything pushed before
    /// the close has been popped.
    pub fn pop_blocking(&self) -> Option<Vec<u8>> {
        let mut state = self.lock();
        while state.items.is_empty() && !state.closed {
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        Self::take_front(&mut state)
    }

    /// Marks the queue closed and wakes every blocked consumer. Idempotent.
    pub fn close_and_wake(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.lock().buffered_bytes
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes and returns every buffered item in FIFO order.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        let mut state = self.lock();
        state.buffered_bytes = 0;
        state.items.drain(..).collect()
    }

    fn take_front(state: &mut QueueState) -> Option<Vec<u8>> {
        let item = state.items.pop_front()?;
        state.buffered_bytes -= item.len();
        Some(item)
    }
}

impl std::fmt::Debug for BlockingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BlockingQueue")
            .field("capacity", &self.capacity)
            .field("items", &state.items.len())
            .field("buffered_bytes", &state.buffered_bytes)
            .field("closed", &state.closed)
            .finish()
    }
}
