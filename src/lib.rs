// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

/*!
Deterministic time-service for test suites.

This crate serves one purpose: give tests a trustworthy, injectable notion
of "current time", independent of the host clock, by exposing a minimal
NTP responder over UDP. It answers exactly one request shape — a 48-byte
client-mode datagram — with the configured clock's timestamp patched into
the transmit-timestamp field, and discards everything else. It is not a
conformant general-purpose NTP server: no authentication, no leap-second
handling, no multi-version negotiation, no clock selection.

# Example

```no_run
# async fn example() -> Result<(), timeservice::TimeServiceError> {
use chrono::DateTime;
use timeservice::clock::FixedClock;
use timeservice::server::TimeServer;

let instant = DateTime::from_timestamp(1_767_225_600, 0).unwrap();
let server = TimeServer::builder()
    .listen("127.0.0.1:0")
    .clock(FixedClock::at(instant))
    .build()
    .await?;

// Every reply now carries the fixed instant, whatever the host clock says.
let addr = server.local_addr()?;
# let _ = addr;
server.dispose()?;
# Ok(())
# }
```
*/

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Pre-allocated buffer arena sliced into fixed-size windows.
pub mod arena;
/// Injectable time sources: the [`ClockSource`](clock::ClockSource) trait
/// and its host-clock and fixed implementations.
pub mod clock;
/// Custom error types for construction validation, timestamp decoding, and
/// disposal.
pub mod error;
/// Reusable operation descriptors bound to arena windows.
pub mod pool;
/// NTP wire format: the 64-bit fixed-point timestamp and packet constants.
pub mod protocol;
/// The UDP time server.
pub mod server;

pub use crate::clock::{ClockSource, FixedClock, SystemClock};
pub use crate::error::{TimeServiceError, TimestampError};
pub use crate::protocol::NtpTimestamp;
pub use crate::server::TimeServer;
