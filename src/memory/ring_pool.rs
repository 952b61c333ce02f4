//! FIFO staging allocator over one host-visible buffer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::Result;
use crate::gpu::{Buffer, BufferDescriptor, BufferUsage, Device};

/// A sub-range of the staging buffer handed out by [`StagingPool::allocate`].
/// Returned to the pool through [`StagingPool::release`].
#[derive(Debug)]
pub struct StagingSpan {
    pub(crate) offset: u64,
    pub(crate) len: u64,
}

impl StagingSpan {
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct PoolSpan {
    offset: u64,
    len: u64,
    released: bool,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Live spans in allocation order. Wrap-around padding is stored as a
    /// pre-released span so it reclaims once it reaches the front.
    spans: VecDeque<PoolSpan>,
    /// Next free offset.
    head: u64,
    /// Bytes currently unavailable, padding included.
    used: u64,
}

/// Linear FIFO allocator on top of a host-visible staging buffer.
///
/// Allocation never blocks; it fails by returning `None` when no contiguous
/// range is free. Space is reclaimed when spans are released, oldest first;
/// out-of-order releases are deferred until the older spans come back too.
#[derive(Debug)]
pub struct StagingPool {
    buffer: Arc<Buffer>,
    capacity: u64,
    state: Mutex<PoolState>,
}

impl StagingPool {
    pub fn new(device: &Device, capacity: u64) -> Result<Self> {
        let buffer = device.create_buffer(&BufferDescriptor {
            size: capacity,
            usage: BufferUsage::TRANSFER_SRC,
            host_visible: true,
        })?;
        Ok(Self {
            buffer,
            capacity,
            state: Mutex::new(PoolState::default()),
        })
    }

    #[must_use]
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    #[must_use]
    pub fn free_space(&self) -> u64 {
        self.capacity - self.state.lock().used
    }

    /// Try to allocate a contiguous span. Returns `None` when the pool
    /// cannot currently satisfy the request.
    #[must_use]
    pub fn allocate(&self, size: u64) -> Option<StagingSpan> {
        if size == 0 {
            return Some(StagingSpan { offset: 0, len: 0 });
        }
        if size > self.capacity {
            return None;
        }
        let mut state = self.state.lock();
        let offset = if state.spans.is_empty() {
            state.head = 0;
            0
        } else {
            let tail = state.spans.front().expect("spans not empty").offset;
            if state.head > tail {
                // Free space is [head, capacity) plus [0, tail).
                if size <= self.capacity - state.head {
                    state.head
                } else if size <= tail {
                    // Wrap around, padding out the end of the buffer.
                    let padding = self.capacity - state.head;
                    if padding > 0 {
                        let pad_offset = state.head;
                        state.spans.push_back(PoolSpan {
                            offset: pad_offset,
                            len: padding,
                            released: true,
                        });
                        state.used += padding;
                    }
                    0
                } else {
                    log::trace!("staging pool exhausted: {size} bytes requested");
                    return None;
                }
            } else if state.head < tail {
                // Free space is [head, tail).
                if size <= tail - state.head {
                    state.head
                } else {
                    log::trace!("staging pool exhausted: {size} bytes requested");
                    return None;
                }
            } else {
                // head == tail with live spans: completely full.
                log::trace!("staging pool exhausted: {size} bytes requested");
                return None;
            }
        };
        state.spans.push_back(PoolSpan {
            offset,
            len: size,
            released: false,
        });
        state.head = offset + size;
        state.used += size;
        Some(StagingSpan { offset, len: size })
    }

    /// Return a span to the pool. Space becomes free once every older span
    /// has been returned as well.
    pub fn release(&self, span: StagingSpan) {
        if span.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        if let Some(entry) = state
            .spans
            .iter_mut()
            .find(|entry| !entry.released && entry.offset == span.offset && entry.len == span.len)
        {
            entry.released = true;
        } else {
            debug_assert!(false, "released span was not allocated from this pool");
        }
        while state.spans.front().is_some_and(|front| front.released) {
            let front = state.spans.pop_front().expect("front exists");
            state.used -= front.len;
        }
        if state.spans.is_empty() {
            state.head = 0;
        }
    }
}
