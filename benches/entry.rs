// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-request fixed-cost benchmarks.
//
// Run with:
//   cargo bench --bench entry
//
// Groups:
//   entry_cycle — write-request / publish-result / harvest on one entry
//   wire_codec  — request and response record encode + decode

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gtipc::wire::{RequestRecord, ResponseRecord};
use gtipc::{EntryRef, ServiceArg, ENTRY_SIZE};

// ---------------------------------------------------------------------------
// Entry publication protocol
// ---------------------------------------------------------------------------

fn bench_entry_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("entry_cycle");

    let mut seg = vec![0u8; ENTRY_SIZE];
    let entry = unsafe { EntryRef::at(seg.as_mut_ptr(), 0) };

    group.bench_function("request_publish_harvest", |b| {
        b.iter(|| {
            entry.write_request(black_box(ServiceArg { x: 3, y: 4 }));
            entry.publish_result(black_box(7), false);
            let out = entry.take_result();
            entry.reset();
            black_box(out)
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Wire codec
// ---------------------------------------------------------------------------

fn bench_wire_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_codec");

    group.bench_function("request_roundtrip", |b| {
        let rec = RequestRecord {
            request_id: 1,
            service: 0,
            entry_idx: 2,
            pid: 3,
        };
        b.iter(|| {
            let bytes = black_box(&rec).as_bytes();
            black_box(RequestRecord::from_bytes(bytes))
        });
    });

    group.bench_function("response_roundtrip", |b| {
        let rec = ResponseRecord {
            request_id: 1,
            entry_idx: 2,
        };
        b.iter(|| {
            let bytes = black_box(&rec).as_bytes();
            black_box(ResponseRecord::from_bytes(bytes))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_entry_cycle, bench_wire_codec);
criterion_main!(benches);
