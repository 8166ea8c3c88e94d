// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Micro-benchmarks for the timestamp codec hot path: the conversion and
//! in-place patch performed once per answered request.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use timeservice::protocol::{NtpTimestamp, TickTag, TRANSMIT_TIMESTAMP_OFFSET};

fn bench_codec(c: &mut Criterion) {
    c.bench_function("from_ticks", |b| {
        b.iter(|| NtpTimestamp::from_ticks(black_box(1_234_567_891_234_567), TickTag::Utc))
    });

    c.bench_function("ticks", |b| {
        let ts = NtpTimestamp::new(3_913_056_000, 0x8000_0000);
        b.iter(|| black_box(ts).ticks())
    });

    c.bench_function("patch_transmit_timestamp", |b| {
        let ts = NtpTimestamp::new(3_913_056_000, 0x8000_0000);
        let mut packet = [0u8; 48];
        b.iter(|| ts.write_at(black_box(&mut packet), TRANSMIT_TIMESTAMP_OFFSET))
    });
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
