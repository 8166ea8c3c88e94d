// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Injectable time sources.
//!
//! [`TimeServer`](crate::server::TimeServer) depends only on the
//! [`ClockSource`] trait, so the owning test harness can substitute a fixed
//! or simulated clock and make server output fully deterministic. The clock
//! is a plain strategy value constructed once by the owner and passed in at
//! construction; there is no process-wide default.

use chrono::{DateTime, Utc};

use crate::protocol::NtpTimestamp;

/// A source of "current time" for the server.
///
/// Implementations must stay within the NTP era-0 domain (1900-01-01 UTC
/// through the 32-bit seconds range); [`ClockSource::wire_now`] panics
/// otherwise, since a clock outside that domain is a harness configuration
/// fault rather than a runtime condition.
pub trait ClockSource: Send + Sync {
    /// The current wall-clock time in UTC.
    fn utc_now(&self) -> DateTime<Utc>;

    /// The current time pre-encoded as an NTP wire timestamp.
    fn wire_now(&self) -> NtpTimestamp {
        NtpTimestamp::from_utc(self.utc_now())
            .expect("clock source instant outside the NTP era")
    }

    /// A label identifying where this clock's time comes from.
    fn authority(&self) -> &str;
}

/// The default clock: reads the host system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn authority(&self) -> &str {
        "local machine"
    }
}

/// A clock frozen at one instant, for deterministic tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    /// Create a clock that always reports `instant`.
    pub fn at(instant: DateTime<Utc>) -> Self {
        FixedClock { instant }
    }
}

impl ClockSource for FixedClock {
    fn utc_now(&self) -> DateTime<Utc> {
        self.instant
    }

    fn authority(&self) -> &str {
        "fixed"
    }
}
