//! End-to-end: corrupted gzip-framed archives are rejected with the right
//! diagnostic before any file is written, whether the corruption is in the
//! header, the DEFLATE body, or the trailer.

use std::io::Write;

use tarx::error::{Context, ErrorKind};
use tarx::tar::{Entry, Header, BLOCK_SIZE};
use tarx::{ExtractConfig, Extractor};
use tempfile::TempDir;

fn plaintext_archive() -> Vec<u8> {
    let entry = Entry::new_file("a.txt", 3);
    let header = Header::encode(&entry, &Context::new()).unwrap();
    let mut data = header.to_block(&Context::new()).unwrap().to_vec();
    data.extend_from_slice(b"Hi\n");
    data.extend(vec![0u8; BLOCK_SIZE - 3]);
    data.extend(vec![0u8; 2 * BLOCK_SIZE]);
    data
}

fn gzip_of(plaintext: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(plaintext).unwrap();
    encoder.finish().unwrap()
}

fn run_against(compressed: Vec<u8>) -> tarx::Result<tarx::ExtractionResult> {
    let dir = TempDir::new().unwrap();
    let context = Context::new().with_archive("bad.tar.gz");
    let reader = tarx::open_archive(std::io::Cursor::new(compressed), 16 * 1024 * 1024, context.clone())?;
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default()).with_archive_context(context);
    let result = extractor.run();
    // Whatever happened, the destination must stay empty: no partial writes.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0, "partial write leaked out of a rejected archive");
    result
}

#[test]
fn truncated_magic_is_not_treated_as_gzip() {
    // A single byte can never look like the two-byte gzip magic when read in
    // isolation, so this degrades to "raw tar" and then fails as a corrupted
    // header instead — exercising the same "reject before writing" contract.
    let err = run_against(vec![0x1F]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompleteArchive);
}

#[test]
fn corrupted_deflate_body_is_rejected() {
    let mut compressed = gzip_of(&plaintext_archive());
    // Flip bytes in the middle of the DEFLATE body, past the 10-byte header.
    let mid = compressed.len() / 2;
    compressed[mid] ^= 0xFF;
    compressed[mid + 1] ^= 0xFF;

    let err = run_against(compressed).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::InvalidData | ErrorKind::IncompleteArchive | ErrorKind::ChecksumMismatch
    ));
}

#[test]
fn corrupted_trailer_crc_is_rejected() {
    let mut compressed = gzip_of(&plaintext_archive());
    let len = compressed.len();
    compressed[len - 8] ^= 0xFF; // first byte of the little-endian CRC32 trailer

    let err = run_against(compressed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
}

#[test]
fn unsupported_compression_method_is_rejected() {
    let mut compressed = gzip_of(&plaintext_archive());
    compressed[2] = 0x09; // CM byte must be 8 (deflate); anything else is unsupported
    let err = run_against(compressed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedCompressionMethod);
}
