// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests driving the server over localhost UDP with a
//! deterministic clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use timeservice::arena::BufferArena;
use timeservice::clock::{ClockSource, FixedClock};
use timeservice::pool::OperationPool;
use timeservice::protocol::{
    NtpTimestamp, CLIENT_REQUEST_BYTE, PACKET_LEN, TRANSMIT_TIMESTAMP_OFFSET,
};
use timeservice::server::TimeServer;
use timeservice::TimeServiceError;

// 2026-01-01T00:00:00Z.
const TEST_UNIX_SECS: i64 = 1_767_225_600;

fn test_instant() -> DateTime<Utc> {
    DateTime::from_timestamp(TEST_UNIX_SECS, 250_000_000).unwrap()
}

fn client_request() -> [u8; PACKET_LEN] {
    let mut req = [0u8; PACKET_LEN];
    req[0] = CLIENT_REQUEST_BYTE;
    // Recognizable patterns in the fields the server must echo unmodified,
    // including the client's own transmit timestamp.
    for (i, b) in req[1..].iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    req
}

async fn client_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// A clock whose reads park until the test opens the gate, so a test can
/// hold an exchange in its processing step.
struct GateClock {
    instant: DateTime<Utc>,
    calls: Arc<AtomicUsize>,
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl GateClock {
    fn new() -> (Self, Arc<AtomicUsize>, Arc<(Mutex<bool>, Condvar)>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let clock = GateClock {
            instant: test_instant(),
            calls: Arc::clone(&calls),
            gate: Arc::clone(&gate),
        };
        (clock, calls, gate)
    }

    fn open(gate: &(Mutex<bool>, Condvar)) {
        let (lock, cvar) = gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }
}

impl ClockSource for GateClock {
    fn utc_now(&self) -> DateTime<Utc> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (lock, cvar) = &*self.gate;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
        self.instant
    }

    fn authority(&self) -> &str {
        "gated"
    }
}

#[tokio::test]
async fn valid_request_gets_the_clock_timestamp() {
    let server = TimeServer::builder()
        .listen("127.0.0.1:0")
        .capacity(4)
        .clock(FixedClock::at(test_instant()))
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let client = client_socket().await;
    let req = client_request();
    client.send_to(&req, addr).await.unwrap();

    let mut reply = [0u8; 256];
    let (len, from) = timeout(Duration::from_secs(2), client.recv_from(&mut reply))
        .await
        .expect("no reply within 2s")
        .unwrap();

    assert_eq!(from, addr);
    assert_eq!(len, PACKET_LEN);
    // Everything outside the transmit timestamp is echoed unmodified.
    assert_eq!(&reply[..TRANSMIT_TIMESTAMP_OFFSET], &req[..TRANSMIT_TIMESTAMP_OFFSET]);
    // Bytes 40-47 carry the clock's wire timestamp, not the client's junk.
    let ts = NtpTimestamp::read_at(&reply[..len], TRANSMIT_TIMESTAMP_OFFSET).unwrap();
    assert_eq!(ts, NtpTimestamp::from_utc(test_instant()).unwrap());
    assert_ne!(
        &reply[TRANSMIT_TIMESTAMP_OFFSET..PACKET_LEN],
        &req[TRANSMIT_TIMESTAMP_OFFSET..PACKET_LEN]
    );

    server.dispose().unwrap();
}

#[tokio::test]
async fn malformed_datagrams_are_dropped_without_faulting() {
    let server = TimeServer::builder()
        .listen("127.0.0.1:0")
        .capacity(4)
        .clock(FixedClock::at(test_instant()))
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let client = client_socket().await;
    let mut reply = [0u8; 256];

    // Wrong length.
    client.send_to(&[CLIENT_REQUEST_BYTE; 20], addr).await.unwrap();
    assert!(
        timeout(Duration::from_millis(250), client.recv_from(&mut reply))
            .await
            .is_err(),
        "short datagram must not be answered"
    );

    // Right length, wrong leading byte (server mode, not client).
    let mut bad = client_request();
    bad[0] = 0x24;
    client.send_to(&bad, addr).await.unwrap();
    assert!(
        timeout(Duration::from_millis(250), client.recv_from(&mut reply))
            .await
            .is_err(),
        "non-client datagram must not be answered"
    );

    // The server is still alive and answers a valid request.
    client.send_to(&client_request(), addr).await.unwrap();
    let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut reply))
        .await
        .expect("server stopped answering after malformed input")
        .unwrap();
    assert_eq!(len, PACKET_LEN);

    server.dispose().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backpressure_blocks_the_exchange_past_capacity() {
    let (clock, calls, gate) = GateClock::new();
    let pool = OperationPool::new(BufferArena::new(1024, 2, 2).unwrap());
    let server = TimeServer::builder()
        .listen("127.0.0.1:0")
        .capacity(1)
        .clock(clock)
        .pool(pool)
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let first = client_socket().await;
    let second = client_socket().await;
    first.send_to(&client_request(), addr).await.unwrap();
    second.send_to(&client_request(), addr).await.unwrap();

    // The first exchange reaches the clock and parks; with one permit the
    // second request must not be processed until the first completes.
    wait_until("first exchange to reach the clock", || {
        calls.load(Ordering::SeqCst) == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(server.active(), 1);

    GateClock::open(&gate);

    let mut reply = [0u8; 256];
    for client in [&first, &second] {
        let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut reply))
            .await
            .expect("reply after the gate opened")
            .unwrap();
        assert_eq!(len, PACKET_LEN);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    server.dispose().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispose_mid_exchange_neither_deadlocks_nor_reaccepts() {
    let (clock, calls, gate) = GateClock::new();
    let pool = OperationPool::new(BufferArena::new(1024, 2, 2).unwrap());
    let server = TimeServer::builder()
        .listen("127.0.0.1:0")
        .capacity(1)
        .clock(clock)
        .pool(pool)
        .build()
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let client = client_socket().await;
    client.send_to(&client_request(), addr).await.unwrap();
    wait_until("exchange to reach the clock", || {
        calls.load(Ordering::SeqCst) == 1
    })
    .await;

    // Dispose while the exchange is parked inside processing.
    server.dispose().unwrap();
    assert!(matches!(
        server.dispose(),
        Err(TimeServiceError::AlreadyDisposed)
    ));

    // Unpark it; its completion must release resources without re-accepting.
    GateClock::open(&gate);
    wait_until("in-flight exchange to complete", || server.active() == 0).await;

    // A fresh request after disposal gets no reply.
    let probe = client_socket().await;
    probe.send_to(&client_request(), addr).await.unwrap();
    let mut reply = [0u8; 256];
    assert!(
        timeout(Duration::from_millis(250), probe.recv_from(&mut reply))
            .await
            .is_err(),
        "disposed server must not answer"
    );
}
