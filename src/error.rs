// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Custom error types for the time service.
//!
//! Errors are constructed as [`TimeServiceError`] variants and can be
//! converted to `io::Error` automatically via
//! `From<TimeServiceError> for io::Error` at boundaries that speak
//! `io::Result`.
//!
//! Users who want programmatic error matching on such a boundary can
//! downcast via `io::Error::get_ref()`:
//!
//! ```no_run
//! use timeservice::error::TimeServiceError;
//!
//! # fn example(result: std::io::Result<()>) {
//! match result {
//!     Ok(()) => println!("server running"),
//!     Err(e) => {
//!         if let Some(svc_err) = e.get_ref()
//!             .and_then(|inner| inner.downcast_ref::<TimeServiceError>())
//!         {
//!             match svc_err {
//!                 TimeServiceError::Timestamp(t) => eprintln!("timestamp error: {t}"),
//!                 _ => eprintln!("time service error: {svc_err}"),
//!             }
//!         }
//!     }
//! }
//! # }
//! ```

use std::fmt;
use std::io;

/// Errors that can occur during time service operations.
#[derive(Debug)]
pub enum TimeServiceError {
    /// A constructor or builder parameter was out of range.
    InvalidArgument {
        /// Name of the offending parameter.
        param: &'static str,
        /// Detail about why it is invalid.
        detail: String,
    },
    /// Timestamp conversion or codec failure.
    Timestamp(TimestampError),
    /// A fixed-depth resource (arena or descriptor pool) had no free slot.
    Exhausted {
        /// Name of the exhausted resource.
        resource: &'static str,
    },
    /// The component was already disposed by an earlier call.
    AlreadyDisposed,
    /// Underlying I/O error (socket bind, send/recv, etc.).
    Io(io::Error),
}

/// Timestamp conversion and wire codec errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TimestampError {
    /// Fewer than 8 bytes remain at the requested offset.
    ShortBuffer {
        /// Number of bytes remaining after the offset.
        remaining: usize,
    },
    /// The requested offset lies past the end of the buffer.
    OffsetOutOfRange {
        /// The requested byte offset.
        offset: usize,
        /// Length of the buffer.
        len: usize,
    },
    /// The instant precedes 1900-01-01 UTC and has no NTP representation.
    BeforeNtpEpoch,
    /// The instant's seconds do not fit the 32-bit NTP seconds field.
    SecondsOverflow,
    /// The local wall-clock time does not exist (skipped by a DST
    /// transition).
    SkippedLocalTime,
}

// ── Display implementations ─────────────────────────────────────────

impl fmt::Display for TimeServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeServiceError::InvalidArgument { param, detail } => {
                write!(f, "invalid argument '{param}': {detail}")
            }
            TimeServiceError::Timestamp(e) => write!(f, "timestamp error: {e}"),
            TimeServiceError::Exhausted { resource } => {
                write!(f, "{resource} exhausted")
            }
            TimeServiceError::AlreadyDisposed => write!(f, "already disposed"),
            TimeServiceError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::ShortBuffer { remaining } => {
                write!(f, "buffer too short: {remaining} bytes remaining, need 8")
            }
            TimestampError::OffsetOutOfRange { offset, len } => {
                write!(f, "offset {offset} out of range for buffer of {len} bytes")
            }
            TimestampError::BeforeNtpEpoch => {
                write!(f, "instant precedes the NTP epoch (1900-01-01 UTC)")
            }
            TimestampError::SecondsOverflow => {
                write!(f, "seconds do not fit the 32-bit NTP field")
            }
            TimestampError::SkippedLocalTime => {
                write!(f, "local time does not exist (skipped by a DST transition)")
            }
        }
    }
}

// ── Error trait implementations ─────────────────────────────────────

impl std::error::Error for TimeServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimeServiceError::Timestamp(e) => Some(e),
            TimeServiceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for TimestampError {}

// ── From conversions ────────────────────────────────────────────────

impl From<TimeServiceError> for io::Error {
    fn from(err: TimeServiceError) -> io::Error {
        let kind = match &err {
            TimeServiceError::InvalidArgument { .. } => io::ErrorKind::InvalidInput,
            TimeServiceError::Timestamp(_) => io::ErrorKind::InvalidData,
            TimeServiceError::Exhausted { .. } => io::ErrorKind::WouldBlock,
            TimeServiceError::AlreadyDisposed => io::ErrorKind::Other,
            TimeServiceError::Io(e) => e.kind(),
        };
        // Preserve the original io::Error directly for the Io variant.
        if let TimeServiceError::Io(e) = err {
            return e;
        }
        io::Error::new(kind, err)
    }
}

impl From<io::Error> for TimeServiceError {
    fn from(err: io::Error) -> TimeServiceError {
        TimeServiceError::Io(err)
    }
}

impl From<TimestampError> for TimeServiceError {
    fn from(err: TimestampError) -> TimeServiceError {
        TimeServiceError::Timestamp(err)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
