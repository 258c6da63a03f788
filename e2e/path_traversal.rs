//! End-to-end: archives attempting to escape the destination root via `..`
//! components, absolute paths, or symlink targets are rejected by default
//! and the destination tree is left untouched.

use tarx::container::RawSource;
use tarx::error::{Context, ErrorKind};
use tarx::security::{SecurityPolicy, SymlinkPolicy};
use tarx::tar::{ArchiveReader, Entry, Header, Kind, BLOCK_SIZE};
use tarx::{ExtractConfig, Extractor};
use tempfile::TempDir;

fn single_entry_archive(entry: &Entry) -> Vec<u8> {
    let header = Header::encode(entry, &Context::new()).unwrap();
    let mut data = header.to_block(&Context::new()).unwrap().to_vec();
    if entry.size > 0 {
        data.extend(vec![b'x'; entry.size as usize]);
        let rem = entry.size % BLOCK_SIZE as u64;
        if rem != 0 {
            data.extend(vec![0u8; BLOCK_SIZE - rem as usize]);
        }
    }
    data.extend(vec![0u8; 2 * BLOCK_SIZE]);
    data
}

#[test]
fn dotdot_escape_is_rejected_and_nothing_is_written() {
    let dir = TempDir::new().unwrap();
    let entry = Entry::new_file("../../etc/passwd", 0);
    let data = single_entry_archive(&entry);

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
    let err = extractor.run().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PathTraversalAttempt);
    assert!(!dir.path().parent().unwrap().join("etc").exists());
}

#[test]
fn absolute_path_is_rejected_by_default() {
    let dir = TempDir::new().unwrap();
    let entry = Entry::new_file("/etc/shadow", 0);
    let data = single_entry_archive(&entry);

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
    let err = extractor.run().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AbsolutePathNotAllowed);
}

#[test]
fn symlink_escaping_root_is_rejected_by_default() {
    let dir = TempDir::new().unwrap();
    let mut entry = Entry::new_file("link", 0);
    entry.kind = Kind::Symlink;
    entry.link_target = Some("../../outside".to_string());
    let data = single_entry_archive(&entry);

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
    let err = extractor.run().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SymlinkNotAllowed);
    assert!(!dir.path().join("link").exists());
}

#[test]
fn symlink_escape_allowed_inside_root_policy_still_blocks_actual_escape() {
    let dir = TempDir::new().unwrap();
    let mut entry = Entry::new_file("link", 0);
    entry.kind = Kind::Symlink;
    entry.link_target = Some("../../../outside".to_string());
    let data = single_entry_archive(&entry);

    let mut policy = SecurityPolicy::default();
    policy.symlink_policy = SymlinkPolicy::AllowInsideRoot;
    let config = ExtractConfig::builder().security_policy(policy).build();

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let mut extractor = Extractor::new(reader, dir.path(), config);
    let err = extractor.run().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SymlinkEscapeAttempt);
}
