//! End-to-end: an archive containing no entries extracts cleanly and
//! produces an empty result, for both a raw tar stream and a gzip-framed one.

use std::io::Write;

use tarx::container::RawSource;
use tarx::error::Context;
use tarx::tar::{ArchiveReader, BLOCK_SIZE};
use tarx::{ExtractConfig, Extractor};
use tempfile::TempDir;

fn terminator() -> Vec<u8> {
    vec![0u8; 2 * BLOCK_SIZE]
}

#[test]
fn raw_empty_archive_extracts_nothing() {
    let dir = TempDir::new().unwrap();
    let reader = ArchiveReader::new(RawSource::new(terminator().as_slice()), Context::new());
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
    let result = extractor.run().unwrap();

    assert_eq!(result.succeeded, 0);
    assert_eq!(result.failed, 0);
    assert_eq!(result.total_bytes, 0);
    assert!(!result.aborted);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn gzip_framed_empty_archive_extracts_nothing() {
    let dir = TempDir::new().unwrap();
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&terminator()).unwrap();
    let compressed = encoder.finish().unwrap();

    let context = Context::new().with_archive("empty.tar.gz");
    let reader = tarx::open_archive(std::io::Cursor::new(compressed), 1024 * 1024, context.clone())
        .unwrap();
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default()).with_archive_context(context);
    let result = extractor.run().unwrap();

    assert_eq!(result.succeeded, 0);
    assert_eq!(result.total_bytes, 0);
}
