//! Safety-gated tar/gzip/zlib archive extraction.

pub mod checksum;
pub mod cli;
pub mod container;
pub mod error;
pub mod extract;
pub mod platform;
pub mod security;
pub mod tar;

pub use container::{Container, FramedReader, ProgressRead, RawSource};
pub use error::{Context, ErrorKind, ExtractError, Result};
pub use extract::{AbortSignal, ExtractConfig, ExtractOptions, ExtractionResult, Extractor, Warning};
pub use security::{SafePath, SecurityPolicy, SymlinkPolicy};
pub use tar::{ArchiveReader, Entry, Kind};

use std::io::Read;

/// Wraps `source` for tar-reading, peeking its first two bytes to decide
/// whether it is a raw tar stream, a gzip frame, or a zlib frame.
///
/// This is the one place outside the CLI that stitches C2 (the framed
/// decompressor) and C4 (the archive reader) together over an arbitrary
/// `Read` source; embedders who already know their container can construct
/// an `ArchiveReader` directly instead.
pub fn open_archive<R: Read + 'static>(
    mut source: R,
    max_decompressed_size: u64,
    context: Context,
) -> Result<ArchiveReader<Box<dyn ProgressRead>>> {
    let mut magic = [0u8; 2];
    let mut filled = 0usize;
    while filled < 2 {
        let n = source.read(&mut magic[filled..]).map_err(|e| {
            ExtractError::io(ErrorKind::ReadError, context.clone(), e)
        })?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    let prefix = std::io::Cursor::new(magic[..filled].to_vec()).chain(source);

    let boxed: Box<dyn ProgressRead> = if filled == 2 {
        match Container::identify(magic) {
            Some(container) => Box::new(FramedReader::open(
                prefix,
                container,
                max_decompressed_size,
                context.clone(),
            )?),
            None => Box::new(RawSource::new(prefix)),
        }
    } else {
        Box::new(RawSource::new(prefix))
    };

    Ok(ArchiveReader::new(boxed, context))
}
