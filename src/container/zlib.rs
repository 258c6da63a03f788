//! Zlib container (RFC 1950): 2-byte header validation and 4-byte
//! big-endian Adler-32 trailer verification.
//!
//! Mirrors the gzip container's split: this module consumes and validates
//! the header, the decompressor underneath runs raw DEFLATE (the header is
//! already stripped by the time it sees any bytes), and [`verify_trailer`]
//! checks the Adler-32 of the plaintext against the 4-byte trailer, per
//! SPEC_FULL.md §3.

use std::io::Read;

use crate::error::{Context, ErrorKind, ExtractError, Result};

const METHOD_DEFLATE: u8 = 8;
const MAX_WINDOW_BITS: u8 = 7;

/// `true` if `byte0` (CMF) has the low nibble that every zlib stream uses
/// (method = 8, DEFLATE). Used by [`Container::identify`] as a cheap
/// pre-filter before the full two-byte check.
pub fn is_zlib_header_byte0(byte0: u8) -> bool {
    byte0 & 0x0F == METHOD_DEFLATE
}

/// Full two-byte zlib header check: `(CMF * 256 + FLG) % 31 == 0`, method
/// nibble 8, window bits within range.
pub fn check_header(bytes: [u8; 2]) -> bool {
    let cmf = bytes[0];
    let flg = bytes[1];
    let method = cmf & 0x0F;
    let window_bits = cmf >> 4;
    let checksum_ok = (cmf as u16 * 256 + flg as u16) % 31 == 0;
    method == METHOD_DEFLATE && window_bits <= MAX_WINDOW_BITS && checksum_ok
}

/// Parses and validates the 2-byte zlib header, leaving `source` positioned
/// at the start of the DEFLATE body.
pub fn parse_header(source: &mut impl Read, context: &Context) -> Result<()> {
    let mut header = [0u8; 2];
    source.read_exact(&mut header).map_err(|e| {
        ExtractError::io(ErrorKind::IncompleteArchive, context.clone(), e)
    })?;

    if !check_header(header) {
        return Err(ExtractError::format(
            ErrorKind::InvalidFormat,
            context.clone(),
            format!("invalid zlib header bytes {header:02X?}"),
        ));
    }

    // FDICT (flg & 0x20) is not supported: a preset dictionary is out of
    // scope for archive extraction and would require the caller to supply
    // the dictionary bytes out of band.
    if header[1] & 0x20 != 0 {
        return Err(ExtractError::format(
            ErrorKind::UnsupportedVersion,
            context.clone(),
            "zlib streams with a preset dictionary (FDICT) are not supported",
        ));
    }

    Ok(())
}

/// Reads the 4-byte big-endian Adler-32 trailer — the first `leftover`
/// bytes come from the decompressor's input-staging buffer, the rest is
/// read directly from `source` — and validates it against `actual_adler`.
pub fn verify_trailer(
    leftover: &[u8],
    source: &mut impl Read,
    actual_adler: u32,
    context: &Context,
) -> Result<()> {
    let mut trailer = [0u8; 4];
    let from_leftover = leftover.len().min(4);
    trailer[..from_leftover].copy_from_slice(&leftover[..from_leftover]);
    if from_leftover < 4 {
        read_exact(source, &mut trailer[from_leftover..], context)?;
    }

    let expected_adler = u32::from_be_bytes(trailer);
    if expected_adler != actual_adler {
        return Err(ExtractError::format(
            ErrorKind::ChecksumMismatch,
            context.clone(),
            format!(
                "zlib trailer mismatch: adler32 expected {expected_adler:08X} got {actual_adler:08X}"
            ),
        ));
    }

    Ok(())
}

fn read_exact(source: &mut impl Read, buf: &mut [u8], context: &Context) -> Result<()> {
    source.read_exact(buf).map_err(|e| {
        let kind = if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ErrorKind::IncompleteArchive
        } else {
            ErrorKind::ReadError
        };
        ExtractError::io(kind, context.clone(), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_standard_header() {
        // 0x78 0x9C is the common "default compression" zlib header.
        assert!(check_header([0x78, 0x9C]));
    }

    #[test]
    fn rejects_bad_checksum() {
        assert!(!check_header([0x78, 0x9D]));
    }

    #[test]
    fn rejects_wrong_method() {
        // Method nibble 7 instead of 8, with a checksum that still passes mod 31.
        assert!(!check_header([0x77, 0x85]));
    }

    #[test]
    fn parse_header_rejects_preset_dictionary() {
        // 0x78 0xBB: FDICT bit set, still passes mod-31 checksum.
        let data = [0x78u8, 0xBBu8];
        let err = parse_header(&mut &data[..], &Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
    }
}
