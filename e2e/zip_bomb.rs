//! End-to-end: archives designed to expand far beyond their on-disk size are
//! stopped by the decompressed-size ceiling and the total-extracted-size
//! ceiling before they can exhaust memory or disk.
//!
//! The compression-ratio ceiling's arithmetic (`check_running_totals`) is
//! covered directly in `src/security/mod.rs`'s unit tests, where the
//! compressed/written byte counts are exact; reproducing it here would mean
//! asserting on `flate2`'s actual achieved ratio for a synthetic payload,
//! which is not something this crate controls.

use std::io::Write;

use tarx::container::RawSource;
use tarx::error::{Context, ErrorKind};
use tarx::security::SecurityPolicy;
use tarx::tar::{ArchiveReader, Entry, Header, BLOCK_SIZE};
use tarx::{ExtractConfig, Extractor};
use tempfile::TempDir;

#[test]
fn decompressed_size_ceiling_stops_a_gzip_bomb() {
    let dir = TempDir::new().unwrap();

    let entry = Entry::new_file("bomb.bin", 8 * 1024 * 1024);
    let header = Header::encode(&entry, &Context::new()).unwrap();
    let mut plaintext = header.to_block(&Context::new()).unwrap().to_vec();
    plaintext.extend(vec![0u8; 8 * 1024 * 1024]); // highly compressible body
    plaintext.extend(vec![0u8; 2 * BLOCK_SIZE]);

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(&plaintext).unwrap();
    let compressed = encoder.finish().unwrap();
    assert!(compressed.len() < 64 * 1024, "fixture should compress down small");

    let context = Context::new().with_archive("bomb.tar.gz");
    // A ceiling far below the 8 MiB body this archive claims.
    let config = ExtractConfig::builder().max_decompressed_size(1024 * 1024).build();
    let reader = tarx::open_archive(std::io::Cursor::new(compressed), config.max_decompressed_size, context.clone())
        .unwrap();
    let mut extractor = Extractor::new(reader, dir.path(), config).with_archive_context(context);
    let err = extractor.run().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FileSizeExceedsLimit);
    assert!(!dir.path().join("bomb.bin").exists(), "partial body must not be left behind");
}

#[test]
fn total_extracted_size_ceiling_stops_many_small_files() {
    let dir = TempDir::new().unwrap();

    let mut data = Vec::new();
    let body = vec![b'y'; 4096];
    for i in 0..50 {
        let entry = Entry::new_file(format!("f{i:03}.bin"), body.len() as u64);
        let header = Header::encode(&entry, &Context::new()).unwrap();
        data.extend_from_slice(&header.to_block(&Context::new()).unwrap());
        data.extend_from_slice(&body);
        let rem = body.len() % BLOCK_SIZE;
        if rem != 0 {
            data.extend(vec![0u8; BLOCK_SIZE - rem]);
        }
    }
    data.extend(vec![0u8; 2 * BLOCK_SIZE]);

    let mut policy = SecurityPolicy::default();
    policy.max_total_extracted_size = 32 * 1024; // trips partway through the 50 files
    let config = ExtractConfig::builder().security_policy(policy).build();

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let mut extractor = Extractor::new(reader, dir.path(), config);
    let err = extractor.run().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TotalSizeExceedsLimit);
    let written = std::fs::read_dir(dir.path()).unwrap().count();
    assert!(written < 50, "ceiling should have stopped extraction before all 50 files landed");
}
