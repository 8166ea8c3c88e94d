// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Reusable asynchronous-operation descriptors.
//!
//! A fixed set of [`OperationDescriptor`]s is created once when the pool is
//! built and recycled for the life of the server; each loan binds the
//! descriptor to a fresh [`Window`] from the pool's [`BufferArena`], and
//! release unbinds the window and clears the descriptor. The pool never
//! resizes.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::arena::{BufferArena, Window};
use crate::error::TimeServiceError;

/// The kind of socket operation a descriptor last had in flight.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OpKind {
    /// No operation issued since the last reset.
    #[default]
    Idle,
    /// An asynchronous receive.
    Receive,
    /// An asynchronous send.
    Send,
}

/// Per-exchange state: the remote endpoint, the bound buffer window, and
/// the outcome of the last socket operation.
#[derive(Debug, Default)]
pub struct OperationDescriptor {
    pub(crate) remote: Option<SocketAddr>,
    pub(crate) window: Option<Window>,
    pub(crate) last_op: OpKind,
    pub(crate) bytes_transferred: usize,
    pub(crate) fault: Option<io::ErrorKind>,
    op_size: usize,
}

impl OperationDescriptor {
    /// The remote endpoint of the exchange in flight, if any.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// The kind of the last issued operation.
    pub fn last_op(&self) -> OpKind {
        self.last_op
    }

    /// Bytes transferred by the last completed operation.
    pub fn bytes_transferred(&self) -> usize {
        self.bytes_transferred
    }

    /// The socket error of the last completed operation, if it failed.
    pub fn fault(&self) -> Option<io::ErrorKind> {
        self.fault
    }

    /// Offset of the bound window inside the arena block, if bound.
    pub fn window_offset(&self) -> Option<usize> {
        self.window.as_ref().map(Window::offset)
    }

    /// The descriptor's I/O buffer: the first operation-size bytes of its
    /// bound window.
    ///
    /// Panics if the descriptor is not on loan; a loaned descriptor is
    /// always bound.
    pub fn buf_mut(&mut self) -> &mut [u8] {
        let op_size = self.op_size;
        let window = self
            .window
            .as_mut()
            .expect("descriptor on loan is bound to a window");
        &mut window.as_mut_slice()[..op_size]
    }

    /// The descriptor's I/O buffer, read-only.
    pub fn buf(&self) -> &[u8] {
        let window = self
            .window
            .as_ref()
            .expect("descriptor on loan is bound to a window");
        &window.as_slice()[..self.op_size]
    }

    fn bind(&mut self, window: Window, op_size: usize) {
        self.window = Some(window);
        self.op_size = op_size;
    }

    fn unbind(&mut self) -> Option<Window> {
        self.window.take()
    }

    fn reset(&mut self) {
        self.remote = None;
        self.last_op = OpKind::Idle;
        self.bytes_transferred = 0;
        self.fault = None;
        self.op_size = 0;
    }
}

/// A fixed-depth pool of pre-created operation descriptors, each bound to
/// one arena window while on loan.
#[derive(Debug)]
pub struct OperationPool {
    arena: BufferArena,
    free_tx: Sender<OperationDescriptor>,
    free_rx: Receiver<OperationDescriptor>,
    disposed: AtomicBool,
    capacity: usize,
}

impl OperationPool {
    /// Create a pool over `arena`, seeded with one descriptor per arena
    /// connection slot.
    pub fn new(arena: BufferArena) -> Self {
        let capacity = arena.connections();
        let (free_tx, free_rx) = bounded(capacity);
        for _ in 0..capacity {
            free_tx
                .send(OperationDescriptor::default())
                .expect("seeding a channel sized to pool capacity");
        }
        OperationPool {
            arena,
            free_tx,
            free_rx,
            disposed: AtomicBool::new(false),
            capacity,
        }
    }

    /// Create a pool over the default arena sized for `connections` slots.
    pub fn with_connections(connections: usize) -> Result<Self, TimeServiceError> {
        Ok(Self::new(BufferArena::with_connections(connections)?))
    }

    /// Pop a descriptor and bind it to a fresh arena window.
    ///
    /// The pool never waits: under the server's semaphore bound a free
    /// descriptor is always available, so an empty pool is reported as an
    /// exhaustion error rather than retried.
    pub fn acquire(&self) -> Result<OperationDescriptor, TimeServiceError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(TimeServiceError::AlreadyDisposed);
        }
        let mut desc = self
            .free_rx
            .try_recv()
            .map_err(|_| TimeServiceError::Exhausted {
                resource: "descriptor pool",
            })?;
        match self.arena.acquire() {
            Ok(window) => {
                let op_size = self.arena.operation_size();
                desc.bind(window, op_size);
                Ok(desc)
            }
            Err(e) => {
                // Descriptor goes back so the pool stays at fixed depth.
                let _ = self.free_tx.try_send(desc);
                Err(e)
            }
        }
    }

    /// Unbind the descriptor's window back to the arena, clear the
    /// descriptor, and push it back onto the pool.
    ///
    /// After shutdown this is a safe no-op: the window and descriptor are
    /// simply dropped.
    pub fn release(&self, mut desc: OperationDescriptor) -> Result<(), TimeServiceError> {
        let window = desc.unbind();
        desc.reset();
        if self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }
        let result = match window {
            Some(window) => self.arena.release(window),
            None => Ok(()),
        };
        // The descriptor goes back even when the window was rejected, so
        // the pool depth never drops below the server's permit count. A
        // full or disconnected free list here means the descriptor was not
        // on loan from this pool; drop it.
        let _ = self.free_tx.try_send(desc);
        result
    }

    /// Dispose the pool: drains the arena and the descriptor stack.
    ///
    /// A second call fails with [`TimeServiceError::AlreadyDisposed`].
    pub fn shutdown(&self) -> Result<(), TimeServiceError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Err(TimeServiceError::AlreadyDisposed);
        }
        self.arena.drain();
        while self.free_rx.try_recv().is_ok() {}
        Ok(())
    }

    /// Number of descriptors the pool was seeded with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Per-operation byte size of the underlying arena.
    pub fn operation_size(&self) -> usize {
        self.arena.operation_size()
    }
}
