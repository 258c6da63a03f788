//! Physical 512-byte ustar-family header: field layout, checksum
//! validation, and the parse/encode codec (SPEC_FULL.md §3, §4.3).

use crate::checksum::octal::{parse_octal, tar_checksum};
use crate::error::{Context, ErrorKind, ExtractError, Result};
use crate::tar::entry::{Entry, Kind};
use crate::tar::BLOCK_SIZE;

const NAME_RANGE: std::ops::Range<usize> = 0..100;
const MODE_RANGE: std::ops::Range<usize> = 100..108;
const UID_RANGE: std::ops::Range<usize> = 108..116;
const GID_RANGE: std::ops::Range<usize> = 116..124;
const SIZE_RANGE: std::ops::Range<usize> = 124..136;
const MTIME_RANGE: std::ops::Range<usize> = 136..148;
const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;
const TYPEFLAG_OFFSET: usize = 156;
const LINKNAME_RANGE: std::ops::Range<usize> = 157..257;
const MAGIC_RANGE: std::ops::Range<usize> = 257..263;
const UNAME_RANGE: std::ops::Range<usize> = 265..297;
const GNAME_RANGE: std::ops::Range<usize> = 297..329;
const DEVMAJOR_RANGE: std::ops::Range<usize> = 329..337;
const DEVMINOR_RANGE: std::ops::Range<usize> = 337..345;
const PREFIX_RANGE: std::ops::Range<usize> = 345..500;

const MAGIC_POSIX: &[u8; 6] = b"ustar\0";
const MAGIC_LEGACY: &[u8; 6] = b"ustar ";

/// A parsed 512-byte tape-archive header, prior to derivation into a logical
/// [`Entry`]. Kept separate from `Entry` because several header fields
/// (checksum, magic, version) have no place in the logical data model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub mtime: i64,
    pub typeflag: u8,
    pub linkname: String,
    pub uname: String,
    pub gname: String,
    pub devmajor: u32,
    pub devminor: u32,
    pub prefix: String,
}

fn trimmed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn field_octal(block: &[u8; BLOCK_SIZE], range: std::ops::Range<usize>, ctx: &Context) -> Result<u64> {
    parse_octal(&block[range]).map_err(|e| {
        ExtractError::format(
            ErrorKind::CorruptedHeader,
            ctx.clone(),
            format!("invalid octal field: {e}"),
        )
    })
}

impl Header {
    /// Returns `true` if `block` is entirely zero bytes — the end-of-archive
    /// marker when it appears twice in a row.
    pub fn is_zero_block(block: &[u8; BLOCK_SIZE]) -> bool {
        block.iter().all(|&b| b == 0)
    }

    /// Parses a 512-byte header, validating the magic and checksum.
    pub fn parse(block: &[u8; BLOCK_SIZE], ctx: &Context) -> Result<Header> {
        let magic = &block[MAGIC_RANGE];
        if magic != MAGIC_POSIX && magic != MAGIC_LEGACY {
            return Err(ExtractError::format(
                ErrorKind::CorruptedHeader,
                ctx.clone(),
                format!("unrecognised tar magic {magic:?}"),
            ));
        }

        let expected_checksum = field_octal(block, CHECKSUM_RANGE, ctx)?;
        let actual_checksum = tar_checksum(block);
        if expected_checksum != actual_checksum {
            return Err(ExtractError::format(
                ErrorKind::ChecksumMismatch,
                ctx.clone(),
                format!(
                    "header checksum mismatch: expected {expected_checksum}, computed {actual_checksum}"
                ),
            ));
        }

        Ok(Header {
            name: trimmed_string(&block[NAME_RANGE]),
            mode: field_octal(block, MODE_RANGE, ctx)? as u32,
            uid: field_octal(block, UID_RANGE, ctx)? as u32,
            gid: field_octal(block, GID_RANGE, ctx)? as u32,
            size: field_octal(block, SIZE_RANGE, ctx)?,
            mtime: field_octal(block, MTIME_RANGE, ctx)? as i64,
            typeflag: block[TYPEFLAG_OFFSET],
            linkname: trimmed_string(&block[LINKNAME_RANGE]),
            uname: trimmed_string(&block[UNAME_RANGE]),
            gname: trimmed_string(&block[GNAME_RANGE]),
            devmajor: field_octal(block, DEVMAJOR_RANGE, ctx)? as u32,
            devminor: field_octal(block, DEVMINOR_RANGE, ctx)? as u32,
            prefix: trimmed_string(&block[PREFIX_RANGE]),
        })
    }

    /// Joins `prefix` and `name` and maps the typeflag to a logical [`Entry`].
    pub fn derive_entry(&self) -> Entry {
        let path = if self.prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.prefix, self.name)
        };

        let kind = Kind::from_typeflag(self.typeflag);
        let size = match kind {
            Kind::Directory | Kind::Symlink => 0,
            _ => self.size,
        };

        Entry {
            path,
            kind,
            size,
            mode: self.mode & 0o7777,
            mtime: self.mtime,
            uid: self.uid,
            gid: self.gid,
            uname: if self.uname.is_empty() { None } else { Some(self.uname.clone()) },
            gname: if self.gname.is_empty() { None } else { Some(self.gname.clone()) },
            link_target: if kind.is_link() && !self.linkname.is_empty() {
                Some(self.linkname.clone())
            } else {
                None
            },
            devmajor: self.devmajor,
            devminor: self.devminor,
        }
    }

    /// Builds a header from a logical entry, splitting `path` into
    /// `prefix`/`name` when it exceeds 100 bytes. Returns
    /// [`ErrorKind::FilenameTooLong`] when no split lets both halves fit, or
    /// when the link target exceeds 100 bytes.
    pub fn encode(entry: &Entry, ctx: &Context) -> Result<Header> {
        let (prefix, name) = split_path(&entry.path, ctx)?;

        if let Some(target) = &entry.link_target {
            if target.len() > 100 {
                return Err(ExtractError::format(
                    ErrorKind::FilenameTooLong,
                    ctx.clone(),
                    "link target exceeds 100 bytes",
                ));
            }
        }

        Ok(Header {
            name,
            mode: entry.mode & 0o7777,
            uid: entry.uid,
            gid: entry.gid,
            size: entry.size,
            mtime: entry.mtime,
            typeflag: entry.kind.to_typeflag(),
            linkname: entry.link_target.clone().unwrap_or_default(),
            uname: entry.uname.clone().unwrap_or_default(),
            gname: entry.gname.clone().unwrap_or_default(),
            devmajor: entry.devmajor,
            devminor: entry.devminor,
            prefix,
        })
    }

    /// Serialises this header into a 512-byte block, computing the checksum
    /// over the fully-populated block (with the checksum field blanked to
    /// spaces, per SPEC_FULL.md §3).
    pub fn to_block(&self, ctx: &Context) -> Result<[u8; BLOCK_SIZE]> {
        let mut block = [0u8; BLOCK_SIZE];

        write_str(&mut block[NAME_RANGE], &self.name, ctx)?;
        write_octal(&mut block[MODE_RANGE], self.mode as u64, ctx)?;
        write_octal(&mut block[UID_RANGE], self.uid as u64, ctx)?;
        write_octal(&mut block[GID_RANGE], self.gid as u64, ctx)?;
        write_octal(&mut block[SIZE_RANGE], self.size, ctx)?;
        if self.mtime < 0 {
            return Err(ExtractError::format(
                ErrorKind::Overflow,
                ctx.clone(),
                "negative mtime cannot be represented in the basic ustar octal encoding",
            ));
        }
        write_octal(&mut block[MTIME_RANGE], self.mtime as u64, ctx)?;
        block[TYPEFLAG_OFFSET] = self.typeflag;
        write_str(&mut block[LINKNAME_RANGE], &self.linkname, ctx)?;
        block[MAGIC_RANGE].copy_from_slice(MAGIC_POSIX);
        block[263..265].copy_from_slice(b"00");
        write_str(&mut block[UNAME_RANGE], &self.uname, ctx)?;
        write_str(&mut block[GNAME_RANGE], &self.gname, ctx)?;
        write_octal(&mut block[DEVMAJOR_RANGE], self.devmajor as u64, ctx)?;
        write_octal(&mut block[DEVMINOR_RANGE], self.devminor as u64, ctx)?;
        write_str(&mut block[PREFIX_RANGE], &self.prefix, ctx)?;

        // Checksum field is blanked to spaces before the sum is taken.
        for b in &mut block[CHECKSUM_RANGE] {
            *b = b' ';
        }
        let checksum = tar_checksum(&block);
        // 6 octal digits + NUL + space, the conventional GNU layout.
        let digits = format!("{checksum:06o}\0 ");
        block[CHECKSUM_RANGE].copy_from_slice(digits.as_bytes());

        Ok(block)
    }
}

fn write_str(field: &mut [u8], value: &str, ctx: &Context) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > field.len() {
        return Err(ExtractError::format(
            ErrorKind::FilenameTooLong,
            ctx.clone(),
            format!("field value {value:?} exceeds {} bytes", field.len()),
        ));
    }
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn write_octal(field: &mut [u8], value: u64, ctx: &Context) -> Result<()> {
    let digits = field.len() - 1;
    let max = 8u64.saturating_pow(digits as u32) - 1;
    if value > max {
        return Err(ExtractError::format(
            ErrorKind::Overflow,
            ctx.clone(),
            format!("value {value} does not fit in a {digits}-digit octal field"),
        ));
    }
    let text = format!("{value:0width$o}", width = digits);
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits] = 0;
    Ok(())
}

/// Splits `path` into `(prefix, name)` such that `name.len() <= 100` and
/// `prefix.len() <= 155`, joining with `/` to reconstruct the original path.
/// Tries the rightmost `/` first (maximising how much lives in `name`, which
/// is the GNU/POSIX convention), falling back to earlier slashes.
fn split_path(path: &str, ctx: &Context) -> Result<(String, String)> {
    if path.len() <= 100 {
        return Ok((String::new(), path.to_string()));
    }

    let bytes = path.as_bytes();
    for (idx, &b) in bytes.iter().enumerate().rev() {
        if b != b'/' {
            continue;
        }
        let prefix = &path[..idx];
        let name = &path[idx + 1..];
        if prefix.len() <= 155 && !name.is_empty() && name.len() <= 100 {
            return Ok((prefix.to_string(), name.to_string()));
        }
    }

    Err(ExtractError::format(
        ErrorKind::FilenameTooLong,
        ctx.clone(),
        format!("path {path:?} ({} bytes) has no split fitting prefix<=155/name<=100", path.len()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar::Kind;

    fn ctx() -> Context {
        Context::new()
    }

    #[test]
    fn rejects_bad_magic() {
        let block = [0u8; BLOCK_SIZE];
        let err = Header::parse(&block, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptedHeader);
    }

    #[test]
    fn zero_block_detection() {
        let block = [0u8; BLOCK_SIZE];
        assert!(Header::is_zero_block(&block));
        let mut nonzero = block;
        nonzero[0] = 1;
        assert!(!Header::is_zero_block(&nonzero));
    }

    #[test]
    fn encode_then_parse_roundtrips_regular_file() {
        let entry = Entry::new_file("hello.txt", 3);
        let header = Header::encode(&entry, &ctx()).unwrap();
        let block = header.to_block(&ctx()).unwrap();
        let parsed = Header::parse(&block, &ctx()).unwrap();
        let roundtripped = parsed.derive_entry();
        assert_eq!(roundtripped, entry);
    }

    #[test]
    fn encode_then_parse_roundtrips_symlink() {
        let mut entry = Entry::new_file("link", 0);
        entry.kind = Kind::Symlink;
        entry.link_target = Some("../target".to_string());
        let header = Header::encode(&entry, &ctx()).unwrap();
        let block = header.to_block(&ctx()).unwrap();
        let parsed = Header::parse(&block, &ctx()).unwrap().derive_entry();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn long_path_splits_at_acceptable_boundary() {
        // 180-byte path with a '/' at byte 130: prefix 130 bytes (<=155),
        // name 49 bytes (<=100).
        let first = "a".repeat(130);
        let second = "b".repeat(49);
        let path = format!("{first}/{second}");
        assert_eq!(path.len(), 180);
        let entry = Entry::new_file(path.clone(), 0);
        let header = Header::encode(&entry, &ctx()).unwrap();
        let block = header.to_block(&ctx()).unwrap();
        let parsed = Header::parse(&block, &ctx()).unwrap().derive_entry();
        assert_eq!(parsed.path, path);
    }

    #[test]
    fn long_path_with_no_acceptable_split_fails() {
        // No '/' at all, and the path exceeds 100 bytes: encode must fail.
        let path = "x".repeat(180);
        let entry = Entry::new_file(path, 0);
        let err = Header::encode(&entry, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FilenameTooLong);
    }

    #[test]
    fn checksum_mismatch_is_detected() {
        let entry = Entry::new_file("a.txt", 0);
        let header = Header::encode(&entry, &ctx()).unwrap();
        let mut block = header.to_block(&ctx()).unwrap();
        block[0] = b'Z'; // corrupt the name without fixing the checksum
        let err = Header::parse(&block, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    }

    #[test]
    fn typeflag_mapping() {
        assert_eq!(Kind::from_typeflag(b'0'), Kind::RegularFile);
        assert_eq!(Kind::from_typeflag(0), Kind::RegularFile);
        assert_eq!(Kind::from_typeflag(b'7'), Kind::RegularFile);
        assert_eq!(Kind::from_typeflag(b'1'), Kind::HardLink);
        assert_eq!(Kind::from_typeflag(b'2'), Kind::Symlink);
        assert_eq!(Kind::from_typeflag(b'3'), Kind::CharDevice);
        assert_eq!(Kind::from_typeflag(b'4'), Kind::BlockDevice);
        assert_eq!(Kind::from_typeflag(b'5'), Kind::Directory);
        assert_eq!(Kind::from_typeflag(b'6'), Kind::Fifo);
    }

    #[test]
    fn directory_and_symlink_size_forced_to_zero() {
        let mut block = [0u8; BLOCK_SIZE];
        block[MAGIC_RANGE].copy_from_slice(MAGIC_POSIX);
        block[263..265].copy_from_slice(b"00");
        block[TYPEFLAG_OFFSET] = b'5'; // directory
        write_octal(&mut block[SIZE_RANGE], 999, &ctx()).unwrap();
        for b in &mut block[CHECKSUM_RANGE] {
            *b = b' ';
        }
        let checksum = tar_checksum(&block);
        let digits = format!("{checksum:06o}\0 ");
        block[CHECKSUM_RANGE].copy_from_slice(digits.as_bytes());

        let entry = Header::parse(&block, &ctx()).unwrap().derive_entry();
        assert_eq!(entry.size, 0);
    }
}
