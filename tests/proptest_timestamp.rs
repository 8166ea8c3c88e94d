// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

use chrono::DateTime;
use proptest::prelude::*;

use timeservice::protocol::{NtpTimestamp, TickTag, EPOCH_DELTA, TICKS_PER_SECOND};

proptest! {
    /// Every representable tick count survives the trip through the
    /// fixed-point wire form exactly.
    #[test]
    fn tick_round_trip_is_exact(
        ticks in 0i64..=(u32::MAX as i64) * TICKS_PER_SECOND + (TICKS_PER_SECOND - 1)
    ) {
        let ts = NtpTimestamp::from_ticks(ticks, TickTag::Utc).unwrap();
        prop_assert_eq!(ts.ticks(), ticks);
    }

    /// Every 8-byte buffer decodes and re-encodes to the same bytes.
    #[test]
    fn wire_round_trip_is_identity(bytes in prop::array::uniform8(any::<u8>())) {
        let ts = NtpTimestamp::read_at(&bytes, 0).unwrap();
        let mut out = [0u8; 8];
        ts.write_at(&mut out, 0).unwrap();
        prop_assert_eq!(out, bytes);
    }

    /// Wall-clock instants in the representable domain round trip within
    /// one 100 ns tick.
    #[test]
    fn utc_round_trip_within_one_tick(
        ntp_secs in 0i64..=u32::MAX as i64,
        nanos in 0u32..1_000_000_000u32,
    ) {
        let instant = DateTime::from_timestamp(ntp_secs - EPOCH_DELTA, nanos).unwrap();
        let ts = NtpTimestamp::from_utc(instant).unwrap();
        let back = ts.to_utc();
        let delta = (back - instant).num_nanoseconds().unwrap().abs();
        prop_assert!(delta <= 100, "round trip drifted by {} ns", delta);
    }

    /// Decoding at an offset that leaves fewer than 8 bytes always fails,
    /// never panics.
    #[test]
    fn short_decode_fails_cleanly(
        len in 0usize..64,
        offset in 0usize..128,
    ) {
        let buf = vec![0u8; len];
        let result = NtpTimestamp::read_at(&buf, offset);
        if offset > len {
            prop_assert!(result.is_err());
        } else if len - offset < 8 {
            prop_assert!(result.is_err());
        } else {
            prop_assert!(result.is_ok());
        }
    }
}
