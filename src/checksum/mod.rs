//! Integrity primitives shared by the container and tar-header codecs.
//!
//! Covers:
//! - [`crc32`] — IEEE 802.3 CRC-32, one-shot and incremental, used to validate
//!   gzip trailers.
//! - [`adler32`] — Adler-32, one-shot and incremental, used to validate zlib
//!   trailers.
//! - [`octal`] — ASCII-octal field parsing and the tar "simple checksum" used
//!   to validate 512-byte headers.

pub mod adler32;
pub mod crc32;
pub mod octal;

pub use adler32::Adler32;
pub use crc32::Crc32;
pub use octal::{parse_octal, tar_checksum};
