//! Streaming archive-reader cursor (SPEC_FULL.md §4.4): `Idle -> ReadingHeader
//! -> ReadingBody -> Idle -> ... -> End`, exposed as `next()` / `read()`
//! rather than a buffering iterator.

use std::io::Read;

use crate::error::{Context, ErrorKind, ExtractError, Result};
use crate::tar::entry::Entry;
use crate::tar::header::Header;
use crate::tar::BLOCK_SIZE;

const DISCARD_BUF_SIZE: usize = 64 * 1024;

/// GNU tar extension typeflags: the header they tag carries no real entry of
/// its own, only an oversized name/link-target for the header that follows.
const GNU_LONGNAME: u8 = b'L';
const GNU_LONGLINK: u8 = b'K';

/// Extension record bodies are bounded to the same ceiling as a sanitised
/// path (SPEC_FULL.md §4.5) — a record claiming more than this is almost
/// certainly malicious, not a legitimately long path.
const MAX_EXTENSION_LEN: u64 = 4096;

/// A single-owner, non-reentrant cursor over a tar byte stream.
///
/// Calling [`ArchiveReader::next`] while a body read is in progress
/// implicitly discards the remainder of the previous entry's body (plus its
/// 512-byte alignment padding) and realigns — it never errors, which is the
/// contract the extractor relies on when a security check rejects an entry
/// before consuming its body.
pub struct ArchiveReader<R: Read> {
    source: R,
    /// Physical bytes of the current entry's body not yet consumed.
    remaining: u64,
    /// Alignment padding after the body, not yet consumed.
    padding: u64,
    offset: u64,
    archive_context: Context,
    ended: bool,
    discard_buf: Box<[u8; DISCARD_BUF_SIZE]>,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(source: R, archive_context: Context) -> Self {
        ArchiveReader {
            source,
            remaining: 0,
            padding: 0,
            offset: 0,
            archive_context,
            ended: false,
            discard_buf: Box::new([0u8; DISCARD_BUF_SIZE]),
        }
    }

    fn context_at(&self, entry_path: Option<&str>) -> Context {
        let mut ctx = self.archive_context.clone().with_offset(self.offset);
        if let Some(path) = entry_path {
            ctx = ctx.with_entry(path);
        }
        ctx
    }

    /// Reads exactly `buf.len()` bytes, or fails with [`ErrorKind::IncompleteArchive`]
    /// if the stream ends first.
    fn read_exact_tracked(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source
            .read_exact(buf)
            .map_err(|e| ExtractError::from_io(ErrorKind::ReadError, self.context_at(None), e))?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    /// Attempts to read one 512-byte block. Returns `Ok(None)` only when the
    /// stream ends with zero bytes available (true EOF at a block boundary);
    /// a partial block is a truncation error.
    fn try_read_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let mut block = [0u8; BLOCK_SIZE];
        let mut filled = 0usize;
        loop {
            match self.source.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ExtractError::from_io(ErrorKind::ReadError, self.context_at(None), e))
                }
            }
            if filled == BLOCK_SIZE {
                break;
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled != BLOCK_SIZE {
            return Err(ExtractError::format(
                ErrorKind::IncompleteArchive,
                self.context_at(None),
                format!("stream ended after {filled} bytes of a 512-byte block"),
            ));
        }
        self.offset += BLOCK_SIZE as u64;
        Ok(Some(block))
    }

    /// Discards whatever body bytes and padding remain from the previous
    /// entry, using a single reusable buffer rather than growing allocations.
    fn realign(&mut self) -> Result<()> {
        let mut to_skip = self.remaining + self.padding;
        self.remaining = 0;
        self.padding = 0;
        while to_skip > 0 {
            let chunk = to_skip.min(DISCARD_BUF_SIZE as u64) as usize;
            let buf = self.discard_buf.as_mut_slice();
            self.read_exact_tracked(&mut buf[..chunk])?;
            to_skip -= chunk as u64;
        }
        Ok(())
    }

    /// Advances the cursor to the next logical entry, or `None` at a clean
    /// end of archive (two consecutive all-zero 512-byte blocks).
    ///
    /// Transparently absorbs GNU `LongName`/`LongLink` extension headers
    /// (typeflags `L`/`K`): each carries an oversized name or link-target in
    /// its own body, which this loop reads and then grafts onto the entry
    /// derived from the *next* physical header, exactly as GNU tar does.
    pub fn next(&mut self) -> Result<Option<Entry>> {
        if self.ended {
            return Ok(None);
        }

        self.realign()?;

        let mut long_name: Option<String> = None;
        let mut long_link: Option<String> = None;

        loop {
            let block1 = match self.try_read_block()? {
                None => {
                    // Stream ended exactly at a block boundary with no
                    // trailing zero blocks at all: tolerate as a clean (if
                    // unconventional) end, matching common real-world archives.
                    self.ended = true;
                    return Ok(None);
                }
                Some(block) => block,
            };

            if Header::is_zero_block(&block1) {
                match self.try_read_block()? {
                    Some(block2) if Header::is_zero_block(&block2) => {
                        self.ended = true;
                        return Ok(None);
                    }
                    Some(_) => {
                        return Err(ExtractError::format(
                            ErrorKind::CorruptedHeader,
                            self.context_at(None),
                            "lone all-zero block not followed by a second terminator block",
                        ));
                    }
                    None => {
                        return Err(ExtractError::format(
                            ErrorKind::IncompleteArchive,
                            self.context_at(None),
                            "archive truncated after a single all-zero block",
                        ));
                    }
                }
            }

            let header = Header::parse(&block1, &self.context_at(None))?;

            if header.typeflag == GNU_LONGNAME || header.typeflag == GNU_LONGLINK {
                let text = self.read_extension_body(&header)?;
                if header.typeflag == GNU_LONGNAME {
                    long_name = Some(text);
                } else {
                    long_link = Some(text);
                }
                continue;
            }

            let mut entry = header.derive_entry();
            if let Some(name) = long_name.take() {
                entry.path = name;
            }
            if let Some(target) = long_link.take() {
                entry.link_target = Some(target);
            }

            self.remaining = header.size;
            self.padding = padding_for(header.size);

            return Ok(Some(entry));
        }
    }

    /// Reads a GNU long-name/long-link extension body: `header.size` raw
    /// bytes followed by the usual 512-byte alignment padding, trimmed at
    /// the first NUL. Bounded by [`MAX_EXTENSION_LEN`] to resist a malicious
    /// archive claiming an unbounded extension record.
    fn read_extension_body(&mut self, header: &Header) -> Result<String> {
        if header.size > MAX_EXTENSION_LEN {
            return Err(ExtractError::security(
                ErrorKind::PathTooLong,
                self.context_at(None),
                format!(
                    "GNU long-name/long-link extension record is {} bytes, exceeds {MAX_EXTENSION_LEN}",
                    header.size
                ),
            ));
        }

        let mut buf = vec![0u8; header.size as usize];
        self.read_exact_tracked(&mut buf)?;

        let pad = padding_for(header.size);
        if pad > 0 {
            let mut pad_buf = vec![0u8; pad as usize];
            self.read_exact_tracked(&mut pad_buf)?;
        }

        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    /// Reads up to `buf.len()` bytes of the current entry's body. Returns
    /// `0` once the body is exhausted. Returning `0` while the caller still
    /// expects more bytes (tracked externally via the entry's size) signals
    /// a truncated archive.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.remaining) as usize;
        let n = self
            .source
            .read(&mut buf[..want])
            .map_err(|e| ExtractError::from_io(ErrorKind::ReadError, self.context_at(None), e))?;
        self.offset += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }

    /// Bytes remaining in the current entry's body.
    pub fn body_remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: Read + crate::container::CompressedProgress> ArchiveReader<R> {
    /// Compressed bytes consumed so far by the underlying source, used for
    /// the extractor's compression-ratio ceiling.
    pub fn compressed_consumed(&self) -> u64 {
        self.source.compressed_consumed()
    }
}

fn padding_for(size: u64) -> u64 {
    let rem = size % BLOCK_SIZE as u64;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE as u64 - rem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar::{Entry, Kind};

    fn block_for(entry: &Entry) -> [u8; BLOCK_SIZE] {
        let header = Header::encode(entry, &Context::new()).unwrap();
        header.to_block(&Context::new()).unwrap()
    }

    #[test]
    fn empty_archive_yields_no_entries() {
        let data = vec![0u8; 1024];
        let mut reader = ArchiveReader::new(data.as_slice(), Context::new());
        assert_eq!(reader.next().unwrap(), None);
        // Calling again after end stays at None.
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn single_file_roundtrip() {
        let entry = Entry::new_file("hello.txt", 3);
        let mut data = block_for(&entry).to_vec();
        data.extend_from_slice(b"Hi\n");
        data.extend_from_slice(&[0u8; 509]);
        data.extend_from_slice(&[0u8; 1024]);

        let mut reader = ArchiveReader::new(data.as_slice(), Context::new());
        let got = reader.next().unwrap().unwrap();
        assert_eq!(got.path, "hello.txt");
        assert_eq!(got.size, 3);

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"Hi\n");

        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn next_skips_unread_body_and_realigns() {
        let a = Entry::new_file("a.txt", 5);
        let b = Entry::new_file("b.txt", 2);

        let mut data = block_for(&a).to_vec();
        data.extend_from_slice(b"AAAAA");
        data.extend_from_slice(&[0u8; 507]); // pad to next 512 boundary
        data.extend_from_slice(&block_for(&b));
        data.extend_from_slice(b"BB");
        data.extend_from_slice(&[0u8; 510]);
        data.extend_from_slice(&[0u8; 1024]);

        let mut reader = ArchiveReader::new(data.as_slice(), Context::new());
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.path, "a.txt");
        // Do NOT read the body — next() must skip it and realign anyway.
        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.path, "b.txt");
        let mut buf = [0u8; 4];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"BB");
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn zero_size_regular_file_does_not_consume_extra_block() {
        let entry = Entry::new_file("empty.txt", 0);
        let mut data = block_for(&entry).to_vec();
        data.extend_from_slice(&[0u8; 1024]);

        let mut reader = ArchiveReader::new(data.as_slice(), Context::new());
        let got = reader.next().unwrap().unwrap();
        assert_eq!(got.size, 0);
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn symlink_with_declared_nonzero_body_is_tolerated() {
        let mut entry = Entry::new_file("link", 0);
        entry.kind = Kind::Symlink;
        entry.link_target = Some("target".to_string());
        let mut header = Header::encode(&entry, &Context::new()).unwrap();
        header.size = 512; // malicious/odd: symlink declaring a body
        let block = header.to_block(&Context::new()).unwrap();

        let mut data = block.to_vec();
        data.extend_from_slice(&[0xAB; 512]); // the declared (bogus) body
        data.extend_from_slice(&[0u8; 1024]);

        let mut reader = ArchiveReader::new(data.as_slice(), Context::new());
        let got = reader.next().unwrap().unwrap();
        assert_eq!(got.size, 0); // logical size stays zero for symlinks
        assert_eq!(reader.next().unwrap(), None); // body was skipped cleanly
    }

    #[test]
    fn truncated_body_is_incomplete_archive() {
        let entry = Entry::new_file("a.txt", 100);
        let mut data = block_for(&entry).to_vec();
        data.extend_from_slice(&[0u8; 50]); // far short of 100 + padding
        let mut reader = ArchiveReader::new(data.as_slice(), Context::new());
        reader.next().unwrap();
        let err = reader.next().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteArchive);
    }

    #[test]
    fn gnu_longname_extension_overrides_path() {
        let long_path = format!("{}/file.txt", "d".repeat(150));
        assert!(long_path.len() > 100);

        let ext_header = Header {
            name: "././@LongLink".to_string(),
            mode: 0,
            uid: 0,
            gid: 0,
            size: (long_path.len() + 1) as u64,
            mtime: 0,
            typeflag: GNU_LONGNAME,
            linkname: String::new(),
            uname: String::new(),
            gname: String::new(),
            devmajor: 0,
            devminor: 0,
            prefix: String::new(),
        };
        let ext_block = ext_header.to_block(&Context::new()).unwrap();

        let mut ext_body = long_path.clone().into_bytes();
        ext_body.push(0);
        let ext_pad = padding_for(ext_body.len() as u64) as usize;

        let real_entry = Entry::new_file("placeholder.txt", 3);
        let real_block = block_for(&real_entry);

        let mut data = ext_block.to_vec();
        data.extend_from_slice(&ext_body);
        data.extend(vec![0u8; ext_pad]);
        data.extend_from_slice(&real_block);
        data.extend_from_slice(b"Hi\n");
        data.extend_from_slice(&[0u8; 509]);
        data.extend_from_slice(&[0u8; 1024]);

        let mut reader = ArchiveReader::new(data.as_slice(), Context::new());
        let entry = reader.next().unwrap().unwrap();
        assert_eq!(entry.path, long_path);
        assert_eq!(entry.size, 3);

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"Hi\n");
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn gnu_longlink_extension_overrides_link_target() {
        let long_target = format!("{}/target", "t".repeat(150));
        assert!(long_target.len() > 100);

        let ext_header = Header {
            name: "././@LongLink".to_string(),
            mode: 0,
            uid: 0,
            gid: 0,
            size: (long_target.len() + 1) as u64,
            mtime: 0,
            typeflag: GNU_LONGLINK,
            linkname: String::new(),
            uname: String::new(),
            gname: String::new(),
            devmajor: 0,
            devminor: 0,
            prefix: String::new(),
        };
        let ext_block = ext_header.to_block(&Context::new()).unwrap();

        let mut ext_body = long_target.clone().into_bytes();
        ext_body.push(0);
        let ext_pad = padding_for(ext_body.len() as u64) as usize;

        let mut real_entry = Entry::new_file("link", 0);
        real_entry.kind = Kind::Symlink;
        real_entry.link_target = Some("short".to_string());
        let real_block = block_for(&real_entry);

        let mut data = ext_block.to_vec();
        data.extend_from_slice(&ext_body);
        data.extend(vec![0u8; ext_pad]);
        data.extend_from_slice(&real_block);
        data.extend_from_slice(&[0u8; 1024]);

        let mut reader = ArchiveReader::new(data.as_slice(), Context::new());
        let entry = reader.next().unwrap().unwrap();
        assert_eq!(entry.link_target.as_deref(), Some(long_target.as_str()));
    }

    #[test]
    fn oversized_longname_extension_is_rejected() {
        let ext_header = Header {
            name: "././@LongLink".to_string(),
            mode: 0,
            uid: 0,
            gid: 0,
            size: MAX_EXTENSION_LEN + 1,
            mtime: 0,
            typeflag: GNU_LONGNAME,
            linkname: String::new(),
            uname: String::new(),
            gname: String::new(),
            devmajor: 0,
            devminor: 0,
            prefix: String::new(),
        };
        let ext_block = ext_header.to_block(&Context::new()).unwrap();
        let body_len = ((MAX_EXTENSION_LEN + 1 + 511) / 512 * 512) as usize;

        let mut data = ext_block.to_vec();
        data.extend(vec![0xAB; body_len]);

        let mut reader = ArchiveReader::new(data.as_slice(), Context::new());
        let err = reader.next().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTooLong);
    }
}
