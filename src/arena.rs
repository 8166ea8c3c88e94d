// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Pre-allocated buffer arena.
//!
//! One contiguous byte block is allocated up front and sliced into
//! fixed-size windows, one per connection slot, so the receive/send path
//! never allocates. A window on loan is exclusively owned by its holder;
//! exclusivity is enforced by ownership of the [`Window`] value rather than
//! by any lock. The free list is a bounded channel, which is safe for
//! concurrent acquire and release from many tasks.

use bytes::BytesMut;
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::TimeServiceError;

/// Default per-operation window size in bytes.
pub const DEFAULT_OPERATION_SIZE: usize = 1024;

/// Default operations per connection: one for receive headroom, one for
/// send.
pub const DEFAULT_OPERATIONS_PER_CONNECTION: usize = 2;

/// One fixed-size slice of the arena's backing block, on loan to exactly
/// one holder at a time.
#[derive(Debug)]
pub struct Window {
    offset: usize,
    buf: BytesMut,
}

impl Window {
    pub(crate) fn new(offset: usize, buf: BytesMut) -> Self {
        Window { offset, buf }
    }

    /// Byte offset of this window inside the arena's backing block.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the window in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the window is empty (never true for arena-issued windows).
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The window's bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// The window's bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// A pre-allocated arena of per-connection buffer windows.
///
/// The backing block is `size × operations_per_connection × connections`
/// bytes; each window is `size × operations_per_connection` bytes, placed
/// at offsets `0, w, 2w, ...` where `w` is the window length.
#[derive(Debug)]
pub struct BufferArena {
    free_tx: Sender<Window>,
    free_rx: Receiver<Window>,
    op_size: usize,
    window_len: usize,
    block_len: usize,
    connections: usize,
}

impl BufferArena {
    /// Create an arena for `connections` windows of
    /// `size × operations_per_connection` bytes each.
    ///
    /// Fails with an invalid-argument error naming the offending parameter
    /// when `size == 0`, `connections <= 1`, or
    /// `operations_per_connection == 0`.
    pub fn new(
        size: usize,
        connections: usize,
        operations_per_connection: usize,
    ) -> Result<Self, TimeServiceError> {
        if size == 0 {
            return Err(TimeServiceError::InvalidArgument {
                param: "size",
                detail: "must be greater than 0".to_string(),
            });
        }
        if connections <= 1 {
            return Err(TimeServiceError::InvalidArgument {
                param: "connections",
                detail: format!("must be greater than 1, got {connections}"),
            });
        }
        if operations_per_connection == 0 {
            return Err(TimeServiceError::InvalidArgument {
                param: "operations_per_connection",
                detail: "must be greater than 0".to_string(),
            });
        }

        let window_len = size * operations_per_connection;
        let block_len = window_len * connections;
        let mut block = BytesMut::zeroed(block_len);
        let (free_tx, free_rx) = bounded(connections);
        for slot in 0..connections {
            // split_to carves an owned view off the front of the same
            // allocation; no copy, no new allocation.
            let buf = block.split_to(window_len);
            let window = Window::new(slot * window_len, buf);
            free_tx
                .send(window)
                .expect("seeding a channel sized to connection count");
        }

        Ok(BufferArena {
            free_tx,
            free_rx,
            op_size: size,
            window_len,
            block_len,
            connections,
        })
    }

    /// Create an arena with default-sized windows (1024 bytes × 2
    /// operations) for `connections` slots.
    pub fn with_connections(connections: usize) -> Result<Self, TimeServiceError> {
        Self::new(
            DEFAULT_OPERATION_SIZE,
            connections,
            DEFAULT_OPERATIONS_PER_CONNECTION,
        )
    }

    /// Pop one free window.
    ///
    /// The arena never waits: an empty free list means the caller acquired
    /// outside the server's semaphore bound, reported as an exhaustion
    /// error.
    pub fn acquire(&self) -> Result<Window, TimeServiceError> {
        self.free_rx
            .try_recv()
            .map_err(|_| TimeServiceError::Exhausted {
                resource: "buffer arena",
            })
    }

    /// Push a window back onto the free list.
    ///
    /// Fails with an invalid-argument error if the window's offset is not a
    /// window-aligned offset inside the backing block, or if the window is
    /// not one this arena issued.
    pub fn release(&self, window: Window) -> Result<(), TimeServiceError> {
        if window.offset % self.window_len != 0 || window.offset >= self.block_len {
            return Err(TimeServiceError::InvalidArgument {
                param: "offset",
                detail: format!(
                    "{} is not a multiple of {} below {}",
                    window.offset, self.window_len, self.block_len
                ),
            });
        }
        if window.buf.len() != self.window_len {
            return Err(TimeServiceError::InvalidArgument {
                param: "window",
                detail: format!(
                    "window of {} bytes does not match arena window length {}",
                    window.buf.len(),
                    self.window_len
                ),
            });
        }
        self.free_tx
            .try_send(window)
            .map_err(|_| TimeServiceError::InvalidArgument {
                param: "window",
                detail: "free list is full; window was not on loan from this arena".to_string(),
            })
    }

    /// Per-operation byte size (the I/O slice length bound to a
    /// descriptor).
    pub fn operation_size(&self) -> usize {
        self.op_size
    }

    /// Length of one window in bytes.
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Length of the backing block in bytes.
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Number of connection slots (windows).
    pub fn connections(&self) -> usize {
        self.connections
    }

    // Drop all free windows; backing memory is reclaimed once every
    // outstanding loan is dropped too.
    pub(crate) fn drain(&self) {
        while self.free_rx.try_recv().is_ok() {}
    }
}
