// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Rejections from [`BlockingQueue::push`](crate::queue::BlockingQueue::push).
///
/// A rejected item is dropped; the queue never holds a partial item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was closed; buffered items can still be popped.
    #[error("queue is closed")]
    Closed,

    /// Accepting the item would take the buffered total past the configured ceiling.
    #[error("queue capacity of {capacity} bytes exceeded ({buffered} buffered, item of {item} bytes)")]
    CapacityExceeded {
        capacity: usize,
        buffered: usize,
        item: usize,
    },
}
