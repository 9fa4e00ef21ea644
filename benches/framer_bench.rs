//! Benchmarks for the checksum framer and key-table parsing.
//!
//! A full polling sweep parses one sensor record per room and, on sync, a
//! 72-byte key table per controller; these measure both paths.
//!
//! ```sh
//! cargo bench --bench framer_bench
//! cargo bench --bench framer_bench -- key_table
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use keybus_core::{CellIndex, ControllerAddress, KeyCode};
use keybus_protocol::{ChecksumFramer, CommandCode, Frame, KeyReadout, Request, encode_key_record};
use std::hint::black_box;

fn key_table(cells: u8, corrupt_every: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    for i in 0..cells {
        let mut record = encode_key_record(&KeyCode::new([i, i ^ 0x5A, 0x10, 0x20, 0x30]));
        if corrupt_every > 0 && usize::from(i) % corrupt_every == 0 {
            record[record.len() - 1] ^= 0xFF;
        }
        buf.extend_from_slice(&record);
    }
    buf
}

fn bench_build(c: &mut Criterion) {
    let address = ControllerAddress::new(5).unwrap();
    let cell = CellIndex::new(3, 12).unwrap();
    let code = KeyCode::new([1, 2, 3, 4, 5]);

    let mut group = c.benchmark_group("build");
    group.throughput(Throughput::Elements(1));
    group.bench_function("read_all_keys", |b| {
        b.iter(|| ChecksumFramer::build(black_box(address), CommandCode::ReadAllKeys, &[]))
    });
    group.bench_function("assign_key", |b| {
        b.iter(|| {
            Request::AssignKey {
                address: black_box(address),
                cell,
                code,
            }
            .to_frame()
        })
    });
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let address = ControllerAddress::new(5).unwrap();
    let frame = Request::AssignKey {
        address,
        cell: CellIndex::new(3, 12).unwrap(),
        code: KeyCode::new([1, 2, 3, 4, 5]),
    }
    .to_frame();
    let bytes = frame.as_bytes().to_vec();

    c.bench_function("parse/request", |b| {
        b.iter(|| {
            let frame = Frame::parse(black_box(&bytes)).unwrap();
            Request::from_frame(&frame, 12).unwrap()
        })
    });
}

fn bench_key_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_table");
    for cells in [12u8, 64] {
        let clean = key_table(cells, 0);
        let noisy = key_table(cells, 3);
        group.throughput(Throughput::Bytes(clean.len() as u64));

        group.bench_with_input(BenchmarkId::new("clean", cells), &clean, |b, buf| {
            b.iter(|| KeyReadout::parse(black_box(buf), cells))
        });
        group.bench_with_input(BenchmarkId::new("merge", cells), &noisy, |b, buf| {
            b.iter(|| {
                let mut merged = KeyReadout::unknown(cells);
                for _ in 0..5 {
                    merged.merge_valid(&KeyReadout::parse(black_box(buf), cells));
                }
                merged
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_parse, bench_key_table);
criterion_main!(benches);
