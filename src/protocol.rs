// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Types and constants for the minimal NTP wire format served by this crate.
//!
//! Provides `ReadBytes` and `WriteBytes` implementations which extend the
//! byteorder crate `WriteBytesExt` and `ReadBytesExt` traits with the ability
//! to read and write the NTP timestamp format, plus exact fixed-point
//! conversions between 100 ns ticks and the 64-bit wire timestamp.
//!
//! Layout documentation is derived from IETF RFC 5905.

use byteorder::{ByteOrder, ReadBytesExt, WriteBytesExt, BE};
use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use std::io;

use crate::error::TimestampError;

/// NTP port number.
pub const PORT: u16 = 123;

/// Size in bytes of the one datagram shape this service answers: the minimal
/// NTP packet without extension fields.
pub const PACKET_LEN: usize = 48;

/// First byte of a minimal client request: leap indicator 0, version 3,
/// mode 3 (client). Anything else is discarded.
pub const CLIENT_REQUEST_BYTE: u8 = 0x1B;

/// Byte offset of the transmit-timestamp field inside the 48-byte packet.
pub const TRANSMIT_TIMESTAMP_OFFSET: usize = 40;

/// Number of 100 ns ticks in one second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// The number of seconds from 1st January 1900 UTC to the start of the Unix
/// epoch.
pub const EPOCH_DELTA: i64 = 2_208_988_800;

/// A trait for writing NTP timestamp types to network-endian bytes.
///
/// A blanket implementation is provided for all types that implement
/// `byteorder::WriteBytesExt`.
pub trait WriteBytes {
    /// Writes an NTP protocol type to this writer in network byte order.
    fn write_bytes<P: WriteToBytes>(&mut self, protocol: P) -> io::Result<()>;
}

/// A trait for reading NTP timestamp types from network-endian bytes.
///
/// A blanket implementation is provided for all types that implement
/// `byteorder::ReadBytesExt`.
pub trait ReadBytes {
    /// Reads an NTP protocol type from this reader in network byte order.
    fn read_bytes<P: ReadFromBytes>(&mut self) -> io::Result<P>;
}

/// Types that may be written to network endian bytes.
pub trait WriteToBytes {
    /// Write the type to bytes.
    fn write_to_bytes<W: WriteBytesExt>(&self, writer: W) -> io::Result<()>;
}

/// Types that may be read from network endian bytes.
pub trait ReadFromBytes: Sized {
    /// Read the type from bytes.
    fn read_from_bytes<R: ReadBytesExt>(reader: R) -> io::Result<Self>;
}

/// Types that have a constant size when written to or read from bytes.
pub trait ConstPackedSizeBytes {
    /// The constant size in bytes when this type is packed for transmission.
    const PACKED_SIZE_BYTES: usize;
}

impl<W: WriteBytesExt> WriteBytes for W {
    fn write_bytes<P: WriteToBytes>(&mut self, protocol: P) -> io::Result<()> {
        protocol.write_to_bytes(self)
    }
}

impl<R: ReadBytesExt> ReadBytes for R {
    fn read_bytes<P: ReadFromBytes>(&mut self) -> io::Result<P> {
        P::read_from_bytes(self)
    }
}

/// Tag distinguishing raw tick counts expressed in UTC from those expressed
/// in the host's local zone.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TickTag {
    /// Ticks count 100 ns units since 1900-01-01T00:00:00 UTC.
    Utc,
    /// Ticks count 100 ns units since 1900-01-01T00:00:00 in the host's
    /// local zone; the value is normalized to UTC on conversion.
    Local,
}

/// **NTP Timestamp Format** - A 32-bit unsigned seconds field spanning 136
/// years and a 32-bit fraction field resolving 232 picoseconds.
///
/// The prime epoch is 0 h 1 January 1900 UTC, when all bits are zero.
///
/// ### Layout
///
/// ```ignore
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            Seconds                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            Fraction                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// All conversions between ticks and the `(seconds, fraction)` pair use
/// scaled 128-bit integer arithmetic, never floating point, so converting
/// through any representation and back reproduces the original instant
/// within one 100 ns tick.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NtpTimestamp {
    /// Seconds since 1900-01-01 00:00:00 UTC (32-bit unsigned).
    pub seconds: u32,
    /// Fractional seconds (32-bit unsigned, resolution of ~232 picoseconds).
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Create a timestamp from an explicit `(seconds, fraction)` pair.
    pub fn new(seconds: u32, fraction: u32) -> Self {
        NtpTimestamp { seconds, fraction }
    }

    /// Create a timestamp from a UTC wall-clock value.
    ///
    /// Fails with [`TimestampError::BeforeNtpEpoch`] for instants before
    /// 1900-01-01 UTC and [`TimestampError::SecondsOverflow`] for instants
    /// past the 32-bit seconds range (2036-02-07T06:28:15Z in era 0).
    pub fn from_utc(instant: DateTime<Utc>) -> Result<Self, TimestampError> {
        let ntp_secs = instant.timestamp() + EPOCH_DELTA;
        // chrono represents a leap second as subsec_nanos >= 10^9; fold it
        // into the last representable fraction of the current second.
        let nanos = instant.timestamp_subsec_nanos().min(999_999_999);
        let frac_ticks = i64::from(nanos) / 100;
        Self::from_parts(ntp_secs, frac_ticks)
    }

    /// Create a timestamp from a local wall-clock value, normalizing to UTC
    /// first.
    pub fn from_local(instant: DateTime<Local>) -> Result<Self, TimestampError> {
        Self::from_utc(instant.with_timezone(&Utc))
    }

    /// Create a timestamp from a raw count of 100 ns ticks since the NTP
    /// epoch, tagged as UTC or local wall-clock ticks.
    ///
    /// Local tick counts are reinterpreted through the host's local zone
    /// before conversion; a value falling inside a zone transition gap fails
    /// with [`TimestampError::SkippedLocalTime`].
    pub fn from_ticks(ticks: i64, tag: TickTag) -> Result<Self, TimestampError> {
        match tag {
            TickTag::Utc => Self::from_parts(
                ticks.div_euclid(TICKS_PER_SECOND),
                ticks.rem_euclid(TICKS_PER_SECOND),
            ),
            TickTag::Local => {
                let secs = ticks.div_euclid(TICKS_PER_SECOND);
                let nanos = ticks.rem_euclid(TICKS_PER_SECOND) * 100;
                let delta = TimeDelta::try_seconds(secs).ok_or(TimestampError::SecondsOverflow)?;
                let naive = ntp_epoch_naive()
                    .checked_add_signed(delta)
                    .and_then(|d| d.checked_add_signed(TimeDelta::nanoseconds(nanos)))
                    .ok_or(TimestampError::SecondsOverflow)?;
                let local = Local
                    .from_local_datetime(&naive)
                    .earliest()
                    .ok_or(TimestampError::SkippedLocalTime)?;
                Self::from_utc(local.with_timezone(&Utc))
            }
        }
    }

    /// Decode a timestamp from 8 big-endian bytes at `offset` inside `buf`.
    ///
    /// Fails with [`TimestampError::OffsetOutOfRange`] if the offset lies
    /// past the end of the buffer and [`TimestampError::ShortBuffer`] if
    /// fewer than 8 bytes remain from that offset.
    pub fn read_at(buf: &[u8], offset: usize) -> Result<Self, TimestampError> {
        if offset > buf.len() {
            return Err(TimestampError::OffsetOutOfRange {
                offset,
                len: buf.len(),
            });
        }
        let rest = &buf[offset..];
        if rest.len() < Self::PACKED_SIZE_BYTES {
            return Err(TimestampError::ShortBuffer {
                remaining: rest.len(),
            });
        }
        Ok(NtpTimestamp {
            seconds: BE::read_u32(&rest[0..4]),
            fraction: BE::read_u32(&rest[4..8]),
        })
    }

    /// Encode the timestamp as 8 big-endian bytes at `offset` inside `buf`.
    ///
    /// Same offset and length validation as [`NtpTimestamp::read_at`].
    pub fn write_at(&self, buf: &mut [u8], offset: usize) -> Result<(), TimestampError> {
        if offset > buf.len() {
            return Err(TimestampError::OffsetOutOfRange {
                offset,
                len: buf.len(),
            });
        }
        let rest = &mut buf[offset..];
        if rest.len() < Self::PACKED_SIZE_BYTES {
            return Err(TimestampError::ShortBuffer {
                remaining: rest.len(),
            });
        }
        BE::write_u32(&mut rest[0..4], self.seconds);
        BE::write_u32(&mut rest[4..8], self.fraction);
        Ok(())
    }

    /// The count of 100 ns ticks since the NTP epoch this timestamp encodes,
    /// rounded to the nearest tick.
    pub fn ticks(&self) -> i64 {
        let fixed = (u128::from(self.seconds) << 32) | u128::from(self.fraction);
        ((fixed * TICKS_PER_SECOND as u128 + (1 << 31)) >> 32) as i64
    }

    /// The UTC wall-clock value this timestamp encodes.
    pub fn to_utc(&self) -> DateTime<Utc> {
        let ticks = self.ticks();
        let unix_secs = ticks.div_euclid(TICKS_PER_SECOND) - EPOCH_DELTA;
        let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        // Era-0 NTP instants are a tiny subset of chrono's representable range.
        DateTime::from_timestamp(unix_secs, nanos)
            .expect("era-0 NTP instant within chrono's range")
    }

    // Shared fixed-point path: whole NTP seconds plus 100 ns ticks into the
    // current second.
    fn from_parts(ntp_secs: i64, frac_ticks: i64) -> Result<Self, TimestampError> {
        if ntp_secs < 0 {
            return Err(TimestampError::BeforeNtpEpoch);
        }
        let seconds = u32::try_from(ntp_secs).map_err(|_| TimestampError::SecondsOverflow)?;
        // round(frac_ticks / 10^7 * 2^32) without floating point.
        let fraction = (((frac_ticks as u128) << 32) + (TICKS_PER_SECOND as u128 / 2))
            / TICKS_PER_SECOND as u128;
        Ok(NtpTimestamp {
            seconds,
            fraction: fraction as u32,
        })
    }
}

impl ConstPackedSizeBytes for NtpTimestamp {
    const PACKED_SIZE_BYTES: usize = 8;
}

impl WriteToBytes for NtpTimestamp {
    fn write_to_bytes<W: WriteBytesExt>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<BE>(self.seconds)?;
        writer.write_u32::<BE>(self.fraction)?;
        Ok(())
    }
}

impl ReadFromBytes for NtpTimestamp {
    fn read_from_bytes<R: ReadBytesExt>(mut reader: R) -> io::Result<Self> {
        let seconds = reader.read_u32::<BE>()?;
        let fraction = reader.read_u32::<BE>()?;
        Ok(NtpTimestamp { seconds, fraction })
    }
}

// The NTP epoch as a naive (zoneless) date-time, for local tick counts.
fn ntp_epoch_naive() -> NaiveDateTime {
    (DateTime::<Utc>::UNIX_EPOCH - TimeDelta::seconds(EPOCH_DELTA)).naive_utc()
}
