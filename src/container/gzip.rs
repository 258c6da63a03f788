//! Gzip container (RFC 1952): header parsing and trailer validation.

use std::io::{self, Read};

use crate::error::{Context, ErrorKind, ExtractError, Result};

pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

const METHOD_DEFLATE: u8 = 8;

const FLAG_TEXT: u8 = 0b0000_0001;
const FLAG_HCRC: u8 = 0b0000_0010;
const FLAG_EXTRA: u8 = 0b0000_0100;
const FLAG_NAME: u8 = 0b0000_1000;
const FLAG_COMMENT: u8 = 0b0001_0000;
const FLAG_RESERVED: u8 = 0b1110_0000;

/// Bound on NAME/COMMENT field length (and EXTRA field length) to resist a
/// malicious archive inflating header parsing memory. See SPEC_FULL.md §4.2.
const MAX_HEADER_FIELD_LEN: usize = 16 * 1024;

fn read_exact(source: &mut impl Read, buf: &mut [u8], context: &Context) -> Result<()> {
    source.read_exact(buf).map_err(|e| {
        let kind = if e.kind() == io::ErrorKind::UnexpectedEof {
            ErrorKind::IncompleteArchive
        } else {
            ErrorKind::ReadError
        };
        ExtractError::io(kind, context.clone(), e)
    })
}

fn read_u8(source: &mut impl Read, context: &Context) -> Result<u8> {
    let mut b = [0u8; 1];
    read_exact(source, &mut b, context)?;
    Ok(b[0])
}

/// Reads a NUL-terminated field (NAME or COMMENT), one byte at a time, and
/// discards it — only its termination matters to header parsing. Fails with
/// [`ErrorKind::InvalidFormat`] if the field exceeds [`MAX_HEADER_FIELD_LEN`]
/// without terminating.
fn skip_nul_terminated(source: &mut impl Read, context: &Context) -> Result<()> {
    for _ in 0..MAX_HEADER_FIELD_LEN {
        let byte = read_u8(source, context)?;
        if byte == 0 {
            return Ok(());
        }
    }
    Err(ExtractError::format(
        ErrorKind::InvalidFormat,
        context.clone(),
        "gzip NAME/COMMENT field exceeds maximum length without a NUL terminator",
    ))
}

/// Parses and validates a gzip header, leaving `source` positioned at the
/// start of the DEFLATE body. The 2-byte magic is read as part of this call.
pub fn parse_header(source: &mut impl Read, context: &Context) -> Result<()> {
    let mut magic = [0u8; 2];
    read_exact(source, &mut magic, context)?;
    if magic != GZIP_MAGIC {
        return Err(ExtractError::format(
            ErrorKind::InvalidGzipMagic,
            context.clone(),
            format!("expected gzip magic 1F8B, found {magic:02X?}"),
        ));
    }

    let method = read_u8(source, context)?;
    if method != METHOD_DEFLATE {
        return Err(ExtractError::format(
            ErrorKind::UnsupportedCompressionMethod,
            context.clone(),
            format!("gzip compression method {method} is not supported (only DEFLATE=8)"),
        ));
    }

    let flags = read_u8(source, context)?;
    if flags & FLAG_RESERVED != 0 {
        return Err(ExtractError::format(
            ErrorKind::InvalidFormat,
            context.clone(),
            "reserved gzip flag bits must be zero",
        ));
    }

    // MTIME (4) + XFL (1) + OS (1).
    let mut rest = [0u8; 6];
    read_exact(source, &mut rest, context)?;

    if flags & FLAG_EXTRA != 0 {
        let mut len_bytes = [0u8; 2];
        read_exact(source, &mut len_bytes, context)?;
        let len = u16::from_le_bytes(len_bytes) as usize;
        if len > MAX_HEADER_FIELD_LEN {
            return Err(ExtractError::format(
                ErrorKind::InvalidFormat,
                context.clone(),
                "gzip EXTRA field exceeds maximum length",
            ));
        }
        let mut discard = vec![0u8; len];
        read_exact(source, &mut discard, context)?;
    }

    if flags & FLAG_NAME != 0 {
        skip_nul_terminated(source, context)?;
    }

    if flags & FLAG_COMMENT != 0 {
        skip_nul_terminated(source, context)?;
    }

    if flags & FLAG_HCRC != 0 {
        let mut hcrc = [0u8; 2];
        read_exact(source, &mut hcrc, context)?;
    }

    let _ = flags & FLAG_TEXT; // informational only, no behavioural effect

    Ok(())
}

/// Reads the 8-byte gzip trailer (CRC-32 LE, ISIZE LE) — the first
/// `leftover` bytes come from the decompressor's input-staging buffer, the
/// rest is read directly from `source` — and validates both fields.
pub fn verify_trailer(
    leftover: &[u8],
    source: &mut impl Read,
    actual_crc: u32,
    actual_len: u64,
    context: &Context,
) -> Result<()> {
    let mut trailer = [0u8; 8];
    let from_leftover = leftover.len().min(8);
    trailer[..from_leftover].copy_from_slice(&leftover[..from_leftover]);
    if from_leftover < 8 {
        read_exact(source, &mut trailer[from_leftover..], context)?;
    }

    let expected_crc = u32::from_le_bytes(trailer[0..4].try_into().unwrap());
    let expected_isize = u32::from_le_bytes(trailer[4..8].try_into().unwrap());
    let actual_isize = (actual_len % (1u64 << 32)) as u32;

    if expected_crc != actual_crc || expected_isize != actual_isize {
        return Err(ExtractError::format(
            ErrorKind::ChecksumMismatch,
            context.clone(),
            format!(
                "gzip trailer mismatch: crc expected {expected_crc:08X} got {actual_crc:08X}, \
                 isize expected {expected_isize} got {actual_isize}"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_magic() {
        let data = [0x1Fu8, 0x8Cu8, 8, 0, 0, 0, 0, 0, 0, 0];
        let err = parse_header(&mut &data[..], &Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGzipMagic);
    }

    #[test]
    fn rejects_unsupported_method() {
        let data = [0x1Fu8, 0x8Bu8, 9, 0, 0, 0, 0, 0, 0, 0];
        let err = parse_header(&mut &data[..], &Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedCompressionMethod);
    }

    #[test]
    fn rejects_reserved_flag_bits() {
        let data = [0x1Fu8, 0x8Bu8, 8, 0b0010_0000, 0, 0, 0, 0, 0, 0];
        let err = parse_header(&mut &data[..], &Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn parses_minimal_header() {
        let data = [0x1Fu8, 0x8Bu8, 8, 0, 0, 0, 0, 0, 0, 0];
        parse_header(&mut &data[..], &Context::new()).unwrap();
    }
}
