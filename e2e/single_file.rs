//! End-to-end: a single regular file round-trips through a raw tar stream,
//! a gzip-framed stream, and a zlib-framed stream, with permissions and
//! modification time preserved on Unix.

use std::io::Write;

use tarx::container::RawSource;
use tarx::error::Context;
use tarx::tar::{ArchiveReader, Entry, Header, BLOCK_SIZE};
use tarx::{ExtractConfig, ExtractOptions, Extractor};
use tempfile::TempDir;

fn archive_with_one_file(name: &str, content: &[u8], mode: u32, mtime: i64) -> Vec<u8> {
    let mut entry = Entry::new_file(name, content.len() as u64);
    entry.mode = mode;
    entry.mtime = mtime;
    let header = Header::encode(&entry, &Context::new()).unwrap();

    let mut data = header.to_block(&Context::new()).unwrap().to_vec();
    data.extend_from_slice(content);
    let rem = content.len() % BLOCK_SIZE;
    if rem != 0 {
        data.extend(vec![0u8; BLOCK_SIZE - rem]);
    }
    data.extend(vec![0u8; 2 * BLOCK_SIZE]);
    data
}

#[test]
fn raw_single_file_roundtrip() {
    let dir = TempDir::new().unwrap();
    let content = b"hello, archive\n";
    let data = archive_with_one_file("greeting.txt", content, 0o644, 1_700_000_000);

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let mut config = ExtractConfig::default();
    config.options.preserve_permissions = true;
    let mut extractor = Extractor::new(reader, dir.path(), config);
    let result = extractor.run().unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(result.total_bytes, content.len() as u64);
    assert_eq!(std::fs::read(dir.path().join("greeting.txt")).unwrap(), content);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let meta = std::fs::metadata(dir.path().join("greeting.txt")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o644);
    }
}

#[test]
fn gzip_framed_single_file_roundtrip() {
    let dir = TempDir::new().unwrap();
    let content = b"gzip-framed payload".repeat(200);
    let data = archive_with_one_file("payload.bin", &content, 0o600, 0);

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&data).unwrap();
    let compressed = encoder.finish().unwrap();

    let context = Context::new().with_archive("payload.tar.gz");
    let reader =
        tarx::open_archive(std::io::Cursor::new(compressed), 16 * 1024 * 1024, context.clone())
            .unwrap();
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default()).with_archive_context(context);
    let result = extractor.run().unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(std::fs::read(dir.path().join("payload.bin")).unwrap(), content);
}

#[test]
fn zlib_framed_single_file_roundtrip() {
    let dir = TempDir::new().unwrap();
    let content = b"zlib-framed payload".repeat(200);
    let data = archive_with_one_file("payload.bin", &content, 0o600, 0);

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&data).unwrap();
    let compressed = encoder.finish().unwrap();

    let context = Context::new().with_archive("payload.tar.zz");
    let reader =
        tarx::open_archive(std::io::Cursor::new(compressed), 16 * 1024 * 1024, context.clone())
            .unwrap();
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default()).with_archive_context(context);
    let result = extractor.run().unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(std::fs::read(dir.path().join("payload.bin")).unwrap(), content);
}

#[test]
fn overwrite_flag_controls_existing_file_behavior() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("greeting.txt"), b"stale").unwrap();
    let data = archive_with_one_file("greeting.txt", b"fresh", 0o644, 0);

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
    assert!(extractor.run().is_err());
    assert_eq!(std::fs::read(dir.path().join("greeting.txt")).unwrap(), b"stale");

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let config = ExtractConfig::builder()
        .options(ExtractOptions {
            overwrite: true,
            ..ExtractOptions::default()
        })
        .build();
    let mut extractor = Extractor::new(reader, dir.path(), config);
    extractor.run().unwrap();
    assert_eq!(std::fs::read(dir.path().join("greeting.txt")).unwrap(), b"fresh");
}
