//! Criterion benchmarks for the CRC-32 and tar-checksum primitives.
//!
//! Run with:
//!   cargo bench --bench checksum

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tarx::checksum::crc32::crc32;
use tarx::checksum::{tar_checksum, Crc32};

fn synthetic_block(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_crc32(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32");

    for &size in &[4 * 1024usize, 64 * 1024, 1024 * 1024] {
        let data = synthetic_block(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("one_shot", size), &data, |b, data| {
            b.iter(|| crc32(data))
        });

        group.bench_with_input(BenchmarkId::new("incremental", size), &data, |b, data| {
            b.iter(|| {
                let mut crc = Crc32::new();
                crc.update(data);
                crc.finalize()
            })
        });
    }

    group.finish();
}

fn bench_tar_checksum(c: &mut Criterion) {
    let block = synthetic_block(512);
    let mut group = c.benchmark_group("tar_checksum");
    group.throughput(Throughput::Bytes(512));
    group.bench_function("header_block", |b| {
        b.iter(|| tar_checksum(block.as_slice().try_into().unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_crc32, bench_tar_checksum);
criterion_main!(benches);
