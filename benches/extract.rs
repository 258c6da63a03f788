//! Criterion benchmarks for end-to-end extraction throughput.
//!
//! Run with:
//!   cargo bench --bench extract

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use tarx::container::RawSource;
use tarx::error::Context;
use tarx::tar::{ArchiveReader, Entry, Header, BLOCK_SIZE};
use tarx::{ExtractConfig, Extractor};

/// Builds an uncompressed tar archive of `file_count` regular files, each
/// `file_size` bytes, followed by the two-zero-block terminator.
fn synthetic_archive(file_count: usize, file_size: usize) -> Vec<u8> {
    let mut data = Vec::new();
    let body = vec![b'x'; file_size];
    for i in 0..file_count {
        let entry = Entry::new_file(&format!("file_{i:04}.bin"), file_size as u64);
        let header = Header::encode(&entry, &Context::new()).unwrap();
        data.extend_from_slice(&header.to_block(&Context::new()).unwrap());
        data.extend_from_slice(&body);
        let rem = file_size % BLOCK_SIZE;
        if rem != 0 {
            data.extend(vec![0u8; BLOCK_SIZE - rem]);
        }
    }
    data.extend(vec![0u8; 2 * BLOCK_SIZE]);
    data
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_many_small_files");

    for &file_count in &[10usize, 100, 500] {
        let archive = synthetic_archive(file_count, 4096);
        group.throughput(Throughput::Bytes(archive.len() as u64));

        group.bench_with_input(
            BenchmarkId::new("files", file_count),
            &archive,
            |b, archive| {
                b.iter(|| {
                    let dir = TempDir::new().unwrap();
                    let reader =
                        ArchiveReader::new(RawSource::new(archive.as_slice()), Context::new());
                    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
                    extractor.run().unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
