//! Framed decompression front-end: gzip (RFC 1952) and zlib (RFC 1950)
//! containers over a DEFLATE (RFC 1951) body.
//!
//! The DEFLATE codec itself is treated as a black box, supplied by the
//! `flate2` crate's `rust_backend` (miniz_oxide); this module is responsible
//! for everything *around* it: container identification, header validation,
//! bounded header-field reads, and trailer integrity (CRC-32 + length for
//! gzip; Adler-32 for zlib).

mod gzip;
mod zlib;

use std::io::{self, Read};

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Context, ErrorKind, ExtractError};

pub use gzip::GZIP_MAGIC;

/// Default ceiling on decompressed output, enforced independently of any
/// caller-supplied `max_total_extracted_size` policy. See SPEC_FULL.md §4.2
/// and §9 (Open Questions).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: u64 = 512 * 1024 * 1024;

/// Which framing wraps the DEFLATE body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Gzip,
    Zlib,
}

impl Container {
    /// Identifies the container from the first two bytes of a stream.
    /// Returns `None` for bytes that match neither magic (the caller should
    /// then treat the stream as a raw, unframed tar archive).
    pub fn identify(magic: [u8; 2]) -> Option<Container> {
        if magic == gzip::GZIP_MAGIC {
            Some(Container::Gzip)
        } else if zlib::is_zlib_header_byte0(magic[0]) && zlib::check_header(magic) {
            Some(Container::Zlib)
        } else {
            None
        }
    }
}

/// Exposes how many compressed bytes a byte source has consumed so far, so
/// the extractor's compression-ratio ceiling (SPEC_FULL.md §4.5) can be
/// computed uniformly whether the archive is framed or raw.
pub trait CompressedProgress {
    fn compressed_consumed(&self) -> u64;
}

/// Object-safe union of [`Read`] and [`CompressedProgress`], for callers
/// (the CLI front-end) that need to erase whether an archive turned out to
/// be raw, gzip-framed, or zlib-framed behind a single boxed type.
pub trait ProgressRead: Read + CompressedProgress {}
impl<T: Read + CompressedProgress> ProgressRead for T {}

impl CompressedProgress for Box<dyn ProgressRead> {
    fn compressed_consumed(&self) -> u64 {
        (**self).compressed_consumed()
    }
}

const INPUT_BUF_SIZE: usize = 8 * 1024;

/// A streaming, bounded-memory byte source that decodes a gzip or zlib frame
/// on the fly. Implements [`Read`] so the tar reader cursor (C4) can consume
/// it exactly like a raw file.
///
/// Owns exactly one `INPUT_BUF_SIZE` input-staging buffer; the DEFLATE
/// window itself is owned by the wrapped [`Decompress`] engine.
pub struct FramedReader<R: Read> {
    source: R,
    decompress: Decompress,
    container: Container,
    /// Bytes read from `source` but not yet fed to the decompressor.
    input_buf: Box<[u8; INPUT_BUF_SIZE]>,
    input_pos: usize,
    input_len: usize,
    crc: crate::checksum::Crc32,
    adler: crate::checksum::Adler32,
    produced: u64,
    max_decompressed_size: u64,
    state: State,
    context: Context,
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Body,
    Done,
}

impl<R: Read> FramedReader<R> {
    /// Parses the container header from `source` and returns a reader ready
    /// to stream decompressed bytes. `max_decompressed_size` bounds the total
    /// plaintext this reader will ever emit; exceeding it fails with
    /// [`ErrorKind::FileSizeExceedsLimit`] before any more inflation happens.
    pub fn open(
        mut source: R,
        container: Container,
        max_decompressed_size: u64,
        context: Context,
    ) -> crate::error::Result<Self> {
        match container {
            Container::Gzip => gzip::parse_header(&mut source, &context)?,
            Container::Zlib => zlib::parse_header(&mut source, &context)?,
        };

        // Both containers' own framing is already consumed above, so the
        // decompressor underneath always sees a raw DEFLATE body — never
        // re-parse a zlib header that isn't there anymore.
        Ok(Self {
            source,
            decompress: Decompress::new(false),
            container,
            input_buf: Box::new([0u8; INPUT_BUF_SIZE]),
            input_pos: 0,
            input_len: 0,
            crc: crate::checksum::Crc32::new(),
            adler: crate::checksum::Adler32::new(),
            produced: 0,
            max_decompressed_size,
            state: State::Body,
            context,
        })
    }

    fn refill(&mut self) -> io::Result<bool> {
        if self.input_pos < self.input_len {
            return Ok(true);
        }
        let n = self.source.read(&mut self.input_buf[..])?;
        self.input_pos = 0;
        self.input_len = n;
        Ok(n > 0)
    }

    fn finish_trailer(&mut self) -> crate::error::Result<()> {
        // Any bytes still staged in `input_buf` belong to the trailer; read
        // the rest directly from `source`.
        let leftover = &self.input_buf[self.input_pos..self.input_len];
        match self.container {
            Container::Gzip => gzip::verify_trailer(
                leftover,
                &mut self.source,
                self.crc.finalize(),
                self.produced,
                &self.context,
            ),
            Container::Zlib => zlib::verify_trailer(
                leftover,
                &mut self.source,
                self.adler.finalize(),
                &self.context,
            ),
        }
    }
}

impl<R: Read> Read for FramedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state == State::Done || buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.refill()? && self.input_len == 0 {
                // Source exhausted with no staged bytes: the DEFLATE stream
                // ended without a BFINAL block ever firing StreamEnd.
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated compressed stream",
                ));
            }

            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let status = self
                .decompress
                .decompress(
                    &self.input_buf[self.input_pos..self.input_len],
                    buf,
                    FlushDecompress::None,
                )
                .map_err(|e| {
                    let err = ExtractError::format(
                        ErrorKind::InvalidData,
                        self.context.clone(),
                        format!("malformed DEFLATE stream: {e}"),
                    );
                    io::Error::new(io::ErrorKind::Other, err)
                })?;

            let consumed = (self.decompress.total_in() - before_in) as usize;
            let produced = (self.decompress.total_out() - before_out) as usize;
            self.input_pos += consumed;

            if produced > 0 {
                match self.container {
                    Container::Gzip => self.crc.update(&buf[..produced]),
                    Container::Zlib => self.adler.update(&buf[..produced]),
                }
                self.produced += produced as u64;
                if self.produced > self.max_decompressed_size {
                    let err = ExtractError::resource(
                        ErrorKind::FileSizeExceedsLimit,
                        self.context.clone(),
                        format!(
                            "decompressed size exceeds the configured {}-byte ceiling",
                            self.max_decompressed_size
                        ),
                    );
                    return Err(io::Error::new(io::ErrorKind::Other, err));
                }
                return Ok(produced);
            }

            if status == Status::StreamEnd {
                self.state = State::Done;
                self.finish_trailer()
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                return Ok(0);
            }
            // produced == 0 and not StreamEnd: need more input, loop again.
        }
    }
}

impl<R: Read> CompressedProgress for FramedReader<R> {
    fn compressed_consumed(&self) -> u64 {
        self.decompress.total_in()
    }
}

/// Wraps a raw, unframed byte source (a plain tar stream with no gzip/zlib
/// container) so it satisfies [`CompressedProgress`] like [`FramedReader`]
/// does: "compressed" and "written" bytes coincide 1:1, so the ratio ceiling
/// never trips for an uncompressed archive.
pub struct RawSource<R: Read> {
    inner: R,
    consumed: u64,
}

impl<R: Read> RawSource<R> {
    pub fn new(inner: R) -> Self {
        RawSource { inner, consumed: 0 }
    }
}

impl<R: Read> Read for RawSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

impl<R: Read> CompressedProgress for RawSource<R> {
    fn compressed_consumed(&self) -> u64 {
        self.consumed
    }
}

/// One-shot convenience: fully inflates `compressed` and returns the
/// plaintext. Intended for small payloads (tests, `tar test` dry runs);
/// extraction itself always streams via [`FramedReader`].
pub fn inflate(container: Container, compressed: &[u8]) -> crate::error::Result<Vec<u8>> {
    let mut reader = FramedReader::open(
        compressed,
        container,
        DEFAULT_MAX_DECOMPRESSED_SIZE,
        Context::new(),
    )?;
    let mut out = Vec::new();
    reader
        .read_to_end(&mut out)
        .map_err(|e| io_to_extract_error(e, &Context::new()))?;
    Ok(out)
}

fn io_to_extract_error(err: io::Error, context: &Context) -> ExtractError {
    ExtractError::from_io(ErrorKind::InvalidData, context.clone(), err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_gzip(plaintext: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(plaintext).unwrap();
        encoder.finish().unwrap()
    }

    fn make_zlib(plaintext: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(plaintext).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn identifies_gzip_magic() {
        assert_eq!(Container::identify([0x1F, 0x8B]), Some(Container::Gzip));
    }

    #[test]
    fn gzip_roundtrip_empty() {
        let compressed = make_gzip(b"");
        let plaintext = inflate(Container::Gzip, &compressed).unwrap();
        assert!(plaintext.is_empty());
    }

    #[test]
    fn gzip_roundtrip_nonempty() {
        let original = b"The quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = make_gzip(&original);
        let plaintext = inflate(Container::Gzip, &compressed).unwrap();
        assert_eq!(plaintext, original);
    }

    #[test]
    fn zlib_roundtrip() {
        let original = b"hello zlib world".repeat(50);
        let compressed = make_zlib(&original);
        let plaintext = inflate(Container::Zlib, &compressed).unwrap();
        assert_eq!(plaintext, original);
    }

    #[test]
    fn gzip_trailer_crc_mismatch_is_rejected() {
        let mut compressed = make_gzip(b"some data that compresses to a deterministic trailer");
        let len = compressed.len();
        // Flip a bit in the CRC-32 trailer (last 8 bytes are CRC32 || ISIZE).
        compressed[len - 8] ^= 0xFF;
        let err = inflate(Container::Gzip, &compressed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    }

    #[test]
    fn zlib_trailer_adler_mismatch_is_rejected() {
        let mut compressed = make_zlib(b"some data that compresses to a deterministic trailer");
        let len = compressed.len();
        // Flip a bit in the 4-byte Adler-32 trailer.
        compressed[len - 4] ^= 0xFF;
        let err = inflate(Container::Zlib, &compressed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    }

    #[test]
    fn decompressed_size_ceiling_is_enforced() {
        let original = vec![b'x'; 64 * 1024];
        let compressed = make_gzip(&original);
        let mut reader =
            FramedReader::open(compressed.as_slice(), Container::Gzip, 1024, Context::new())
                .unwrap();
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }
}
