// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Minimal NTP responder over UDP.
//!
//! The server owns one UDP socket and drives an accept/receive/process/
//! send/complete cycle per exchange, using pooled operation descriptors and
//! an injectable [`ClockSource`]. Concurrency is bounded by a counting
//! semaphore sized to capacity; acquiring a permit is the one deliberate
//! blocking point and provides backpressure once every descriptor is in
//! flight.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> Result<(), timeservice::TimeServiceError> {
//! use timeservice::server::TimeServer;
//!
//! let server = TimeServer::builder()
//!     .port(123)
//!     .capacity(100)
//!     .build()
//!     .await?;
//!
//! // ... the server is already answering requests ...
//! server.dispose()?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::{ClockSource, SystemClock};
use crate::error::TimeServiceError;
use crate::pool::{OpKind, OperationDescriptor, OperationPool};
use crate::protocol::{CLIENT_REQUEST_BYTE, PACKET_LEN, PORT, TRANSMIT_TIMESTAMP_OFFSET};

/// Default number of concurrently in-flight exchanges.
pub const DEFAULT_CAPACITY: usize = 100;

/// Builder for configuring and creating a [`TimeServer`].
#[derive(Default)]
pub struct TimeServerBuilder {
    port: Option<u16>,
    capacity: Option<usize>,
    listen_addr: Option<String>,
    clock: Option<Arc<dyn ClockSource>>,
    pool: Option<OperationPool>,
}

impl TimeServerBuilder {
    /// Create a builder with all parameters at their defaults: port 123,
    /// capacity 100, the host system clock, and a default-sized pool.
    pub fn new() -> Self {
        TimeServerBuilder::default()
    }

    /// Set the UDP port to listen on. Must be greater than 0.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the exchange capacity (semaphore permits). Must be greater
    /// than 0.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Override the listen address entirely, e.g. `127.0.0.1:0` to bind an
    /// ephemeral port in tests. Takes precedence over [`port`](Self::port).
    pub fn listen(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Set the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: impl ClockSource + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Supply a pre-built operation pool. Its capacity must be at least the
    /// server's capacity, or the semaphore bound could not guarantee a free
    /// descriptor per permit.
    pub fn pool(mut self, pool: OperationPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Build the server. Binds the socket and immediately starts accepting.
    pub async fn build(self) -> Result<TimeServer, TimeServiceError> {
        let capacity = self.capacity.unwrap_or(DEFAULT_CAPACITY);
        if capacity == 0 {
            return Err(TimeServiceError::InvalidArgument {
                param: "capacity",
                detail: "must be greater than 0".to_string(),
            });
        }

        let listen_addr = match self.listen_addr {
            Some(addr) => addr,
            None => {
                let port = self.port.unwrap_or(PORT);
                if port == 0 {
                    return Err(TimeServiceError::InvalidArgument {
                        param: "port",
                        detail: "must be greater than 0".to_string(),
                    });
                }
                format!("[::]:{port}")
            }
        };

        let pool = match self.pool {
            Some(pool) => {
                if pool.capacity() < capacity {
                    return Err(TimeServiceError::InvalidArgument {
                        param: "pool",
                        detail: format!(
                            "pool capacity {} is below server capacity {capacity}",
                            pool.capacity()
                        ),
                    });
                }
                pool
            }
            // The arena needs at least two connection slots.
            None => OperationPool::with_connections(capacity.max(2))?,
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let sock = UdpSocket::bind(&listen_addr).await?;
        debug!(
            "time server listening on {listen_addr}, clock authority: {}",
            clock.authority()
        );

        let inner = Arc::new(Inner {
            sock,
            pool,
            clock,
            permits: Arc::new(Semaphore::new(capacity)),
            active: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        });

        let accept_task = tokio::spawn(accept_loop(Arc::clone(&inner)));

        Ok(TimeServer {
            inner,
            _accept_task: accept_task,
        })
    }
}

/// A deterministic NTP responder.
///
/// Created via [`TimeServer::builder()`]; the accept cycle starts inside
/// `build()`, so a freshly built server is already answering requests.
/// [`dispose()`](TimeServer::dispose) is the only stop mechanism.
pub struct TimeServer {
    inner: Arc<Inner>,
    _accept_task: JoinHandle<()>,
}

impl std::fmt::Debug for TimeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeServer")
            .field("local_addr", &self.inner.sock.local_addr())
            .finish_non_exhaustive()
    }
}

struct Inner {
    sock: UdpSocket,
    pool: OperationPool,
    clock: Arc<dyn ClockSource>,
    permits: Arc<Semaphore>,
    active: AtomicUsize,
    cancel: CancellationToken,
    disposed: AtomicBool,
}

impl TimeServer {
    /// Create a builder for configuring the server.
    pub fn builder() -> TimeServerBuilder {
        TimeServerBuilder::new()
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.sock.local_addr()
    }

    /// Number of exchanges currently in flight, the server's one
    /// externally observable health signal.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// The authority label of the configured clock source.
    pub fn clock_authority(&self) -> &str {
        self.inner.clock.authority()
    }

    /// Stop the server: stop accepting, fault in-flight operations, and
    /// dispose the descriptor pool, swallowing secondary teardown errors.
    ///
    /// A second call fails with [`TimeServiceError::AlreadyDisposed`].
    /// In-flight exchanges complete as dropped exchanges; their eventual
    /// completion releases resources but does not re-accept.
    pub fn dispose(&self) -> Result<(), TimeServiceError> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Err(TimeServiceError::AlreadyDisposed);
        }
        self.inner.permits.close();
        self.inner.cancel.cancel();
        if let Err(e) = self.inner.pool.shutdown() {
            debug!("pool shutdown during dispose: {e}");
        }
        Ok(())
    }
}

impl Drop for TimeServer {
    fn drop(&mut self) {
        if !self.inner.disposed.load(Ordering::SeqCst) {
            let _ = self.dispose();
        }
    }
}

// The Accept step, looped: one permit and one descriptor per exchange. The
// semaphore is the sole deliberate blocking point; it closes on dispose,
// which ends the loop.
async fn accept_loop(inner: Arc<Inner>) {
    loop {
        let permit = match Arc::clone(&inner.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break, // semaphore closed by dispose
        };
        let mut desc = match inner.pool.acquire() {
            Ok(desc) => desc,
            Err(TimeServiceError::AlreadyDisposed) => break,
            // The permit guarantees a free descriptor; anything else is a
            // logic fault, not a recoverable condition.
            Err(e) => unreachable!("descriptor pool empty under semaphore bound: {e}"),
        };
        desc.last_op = OpKind::Receive;
        inner.active.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(&inner);
        tokio::spawn(exchange(inner, desc, permit));
    }
}

// One Receive → Process → Send → Complete cycle. Any socket error or
// malformed datagram routes straight to completion as a silently dropped
// exchange.
async fn exchange(inner: Arc<Inner>, mut desc: OperationDescriptor, permit: OwnedSemaphorePermit) {
    let res = tokio::select! {
        _ = inner.cancel.cancelled() => {
            Err(io::Error::new(io::ErrorKind::Interrupted, "server disposed"))
        }
        res = inner.sock.recv_from(desc.buf_mut()) => res,
    };

    match res {
        Ok((len, peer)) if len > 0 => {
            desc.bytes_transferred = len;
            desc.remote = Some(peer);
            process(&inner, &mut desc, len, peer).await;
        }
        Ok((_, peer)) => debug!("empty datagram from {peer}"),
        Err(e) => {
            desc.fault = Some(e.kind());
            debug!("receive aborted: {e}");
        }
    }

    complete(&inner, desc, permit);
}

// Validate the datagram, patch the transmit timestamp in place, and echo
// the packet back. Anything that is not exactly a 48-byte client request is
// dropped unreported.
async fn process(inner: &Inner, desc: &mut OperationDescriptor, len: usize, peer: SocketAddr) {
    if len != PACKET_LEN || desc.buf()[0] != CLIENT_REQUEST_BYTE {
        debug!("dropped datagram from {peer} ({len} bytes)");
        return;
    }

    let now = inner.clock.wire_now();
    // len == PACKET_LEN, so the field always fits.
    if now
        .write_at(&mut desc.buf_mut()[..PACKET_LEN], TRANSMIT_TIMESTAMP_OFFSET)
        .is_err()
    {
        return;
    }

    desc.last_op = OpKind::Send;
    let res = tokio::select! {
        _ = inner.cancel.cancelled() => return,
        res = inner.sock.send_to(&desc.buf()[..PACKET_LEN], peer) => res,
    };
    match res {
        Ok(sent) => desc.bytes_transferred = sent,
        Err(e) => {
            desc.fault = Some(e.kind());
            debug!("send aborted: {e}");
        }
    }
}

// The Complete step: recycle the descriptor and its window, give the permit
// back, drop the active count. Re-accepting is the accept loop's job; once
// disposed that loop has already exited, so completion never restarts it.
fn complete(inner: &Inner, desc: OperationDescriptor, permit: OwnedSemaphorePermit) {
    match desc.last_op() {
        OpKind::Receive | OpKind::Send => {}
        OpKind::Idle => unreachable!("completed descriptor with no issued operation"),
    }
    if let Err(e) = inner.pool.release(desc) {
        debug!("descriptor release failed: {e}");
    }
    drop(permit);
    inner.active.fetch_sub(1, Ordering::SeqCst);
}
