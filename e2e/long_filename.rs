//! End-to-end: GNU long-name/long-link extension headers survive full
//! extraction, not just the low-level reader cursor, landing at the correct
//! nested path on disk.

use tarx::container::RawSource;
use tarx::error::Context;
use tarx::tar::{ArchiveReader, Entry, Header, Kind, BLOCK_SIZE};
use tarx::{ExtractConfig, Extractor};
use tempfile::TempDir;

const GNU_LONGNAME: u8 = b'L';
const GNU_LONGLINK: u8 = b'K';

fn padding_for(size: u64) -> usize {
    let rem = size % BLOCK_SIZE as u64;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE - rem as usize
    }
}

fn extension_header(typeflag: u8, body_len: usize) -> Header {
    Header {
        name: "././@LongLink".to_string(),
        mode: 0,
        uid: 0,
        gid: 0,
        size: body_len as u64,
        mtime: 0,
        typeflag,
        linkname: String::new(),
        uname: String::new(),
        gname: String::new(),
        devmajor: 0,
        devminor: 0,
        prefix: String::new(),
    }
}

fn append_extension(data: &mut Vec<u8>, typeflag: u8, text: &str) {
    let mut body = text.as_bytes().to_vec();
    body.push(0);
    let header = extension_header(typeflag, body.len());
    data.extend_from_slice(&header.to_block(&Context::new()).unwrap());
    data.extend_from_slice(&body);
    data.extend(vec![0u8; padding_for(body.len() as u64)]);
}

#[test]
fn longname_extension_extracts_to_the_correct_nested_path() {
    let dir = TempDir::new().unwrap();
    let long_path = format!("very/deeply/nested/{}/leaf.txt", "segment-".repeat(15));
    assert!(long_path.len() > 100);

    let mut data = Vec::new();
    append_extension(&mut data, GNU_LONGNAME, &long_path);

    let entry = Entry::new_file("placeholder.txt", 5);
    data.extend_from_slice(&Header::encode(&entry, &Context::new()).unwrap().to_block(&Context::new()).unwrap());
    data.extend_from_slice(b"Hello");
    data.extend(vec![0u8; padding_for(5)]);
    data.extend(vec![0u8; 2 * BLOCK_SIZE]);

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
    let result = extractor.run().unwrap();

    assert_eq!(result.succeeded, 1);
    let extracted = dir.path().join(&long_path);
    assert_eq!(std::fs::read(&extracted).unwrap(), b"Hello");
}

#[test]
fn longlink_extension_extracts_a_symlink_with_a_long_target() {
    let dir = TempDir::new().unwrap();
    let long_target = format!("{}/short-name.txt", "segment-".repeat(15));
    assert!(long_target.len() > 100);

    let mut data = Vec::new();
    append_extension(&mut data, GNU_LONGLINK, &long_target);

    let mut entry = Entry::new_file("link.txt", 0);
    entry.kind = Kind::Symlink;
    entry.link_target = Some("short".to_string());
    data.extend_from_slice(&Header::encode(&entry, &Context::new()).unwrap().to_block(&Context::new()).unwrap());
    data.extend(vec![0u8; 2 * BLOCK_SIZE]);

    let mut policy = tarx::SecurityPolicy::default();
    policy.symlink_policy = tarx::SymlinkPolicy::AllowAny;
    let config = ExtractConfig::builder().security_policy(policy).build();

    let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
    let mut extractor = Extractor::new(reader, dir.path(), config);
    let result = extractor.run().unwrap();

    assert_eq!(result.succeeded, 1);
    let link = dir.path().join("link.txt");
    let target = std::fs::read_link(&link).unwrap();
    assert_eq!(target.to_str().unwrap(), long_target);
}
