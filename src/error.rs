//! Error taxonomy and context records shared across every layer.
//!
//! A single [`ExtractError`] enum covers I/O, format, integrity, security,
//! and resource errors. Each variant carries a [`Context`] so the archive
//! path, entry path (when known), and byte offset (when known) survive up to
//! the CLI boundary without re-deriving them from a bare message string.

use std::fmt;
use std::path::PathBuf;

/// Where in the extraction an error occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    /// Path of the archive being read, when known.
    pub archive_path: Option<PathBuf>,
    /// Path of the entry being processed, when known.
    pub entry_path: Option<String>,
    /// Byte offset into the archive stream, when known.
    pub offset: Option<u64>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_path = Some(path.into());
        self
    }

    pub fn with_entry(mut self, path: impl Into<String>) -> Self {
        self.entry_path = Some(path.into());
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(archive) = &self.archive_path {
            write!(f, "archive={}", archive.display())?;
            wrote = true;
        }
        if let Some(entry) = &self.entry_path {
            write!(f, "{}entry={entry}", if wrote { ", " } else { "" })?;
            wrote = true;
        }
        if let Some(offset) = self.offset {
            write!(f, "{}offset={offset}", if wrote { ", " } else { "" })?;
        }
        Ok(())
    }
}

/// The machine-identifiable kind of an [`ExtractError`]. Kept separate from
/// the error itself so the extraction result's warning log can carry a kind
/// tag without cloning the full error (which may wrap an [`std::io::Error`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // I/O
    FileNotFound,
    PermissionDenied,
    DiskFull,
    ReadError,
    WriteError,
    SeekError,
    // Format
    InvalidFormat,
    UnsupportedVersion,
    CorruptedHeader,
    IncompleteArchive,
    InvalidGzipMagic,
    UnsupportedCompressionMethod,
    // Integrity
    ChecksumMismatch,
    InvalidData,
    // Security
    PathTraversalAttempt,
    AbsolutePathNotAllowed,
    SymlinkEscapeAttempt,
    SymlinkNotAllowed,
    AbsoluteSymlinkNotAllowed,
    NullByteInPath,
    PathTooLong,
    EmptyPath,
    FileSizeExceedsLimit,
    TotalSizeExceedsLimit,
    SuspiciousCompressionRatio,
    // Resource
    OutOfMemory,
    Overflow,
    BufferTooSmall,
    UnsupportedEntryType,
    FilenameTooLong,
    FileExists,
    SymlinkNotSupported,
    Aborted,
}

impl ErrorKind {
    /// Maps this kind to the CLI exit-code taxonomy from the external
    /// interface contract (§6): 0 success is never produced here since an
    /// `ErrorKind` only exists when something went wrong.
    pub fn exit_code(self) -> i32 {
        use ErrorKind::*;
        match self {
            FileNotFound => 3,
            PermissionDenied => 4,
            InvalidFormat
            | UnsupportedVersion
            | CorruptedHeader
            | IncompleteArchive
            | InvalidGzipMagic
            | ChecksumMismatch
            | InvalidData => 5,
            UnsupportedCompressionMethod => 6,
            _ => 1,
        }
    }
}

/// The core error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("I/O error ({kind:?}) [{context}]: {source}")]
    Io {
        kind: ErrorKind,
        context: Context,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind:?} [{context}]: {message}")]
    Format {
        kind: ErrorKind,
        context: Context,
        message: String,
    },

    #[error("{kind:?} [{context}]: {message}")]
    Security {
        kind: ErrorKind,
        context: Context,
        message: String,
    },

    #[error("{kind:?} [{context}]: {message}")]
    Resource {
        kind: ErrorKind,
        context: Context,
        message: String,
    },

    #[error("extraction aborted [{context}]")]
    Aborted { context: Context },
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Io { kind, .. } => *kind,
            ExtractError::Format { kind, .. } => *kind,
            ExtractError::Security { kind, .. } => *kind,
            ExtractError::Resource { kind, .. } => *kind,
            ExtractError::Aborted { .. } => ErrorKind::Aborted,
        }
    }

    pub fn context(&self) -> &Context {
        match self {
            ExtractError::Io { context, .. } => context,
            ExtractError::Format { context, .. } => context,
            ExtractError::Security { context, .. } => context,
            ExtractError::Resource { context, .. } => context,
            ExtractError::Aborted { context } => context,
        }
    }

    pub fn format(kind: ErrorKind, context: Context, message: impl Into<String>) -> Self {
        ExtractError::Format {
            kind,
            context,
            message: message.into(),
        }
    }

    pub fn security(kind: ErrorKind, context: Context, message: impl Into<String>) -> Self {
        ExtractError::Security {
            kind,
            context,
            message: message.into(),
        }
    }

    pub fn resource(kind: ErrorKind, context: Context, message: impl Into<String>) -> Self {
        ExtractError::Resource {
            kind,
            context,
            message: message.into(),
        }
    }

    pub fn io(kind: ErrorKind, context: Context, source: std::io::Error) -> Self {
        ExtractError::Io {
            kind,
            context,
            source,
        }
    }

    /// Converts an [`std::io::Error`] bubbling up through a `Read` boundary
    /// (the tar cursor reading from a [`crate::container::FramedReader`])
    /// back into an [`ExtractError`]. If the error was originally an
    /// `ExtractError` wrapped to cross that boundary, recovers it verbatim so
    /// its real kind (e.g. [`ErrorKind::ChecksumMismatch`]) survives instead
    /// of collapsing to `kind`.
    pub fn from_io(kind: ErrorKind, context: Context, source: std::io::Error) -> Self {
        let wraps_extract_error = source.get_ref().map(|inner| inner.is::<ExtractError>()).unwrap_or(false);
        if wraps_extract_error {
            return match source.into_inner().unwrap().downcast::<ExtractError>() {
                Ok(extract_err) => *extract_err,
                Err(_) => ExtractError::format(kind, context, "io error wrapping an unrecognised boxed error"),
            };
        }
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            return ExtractError::io(ErrorKind::IncompleteArchive, context, source);
        }
        ExtractError::io(kind, context, source)
    }

    /// Maps the underlying exit code from the §6 CLI contract.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(ErrorKind::FileNotFound.exit_code(), 3);
        assert_eq!(ErrorKind::PermissionDenied.exit_code(), 4);
        assert_eq!(ErrorKind::CorruptedHeader.exit_code(), 5);
        assert_eq!(ErrorKind::UnsupportedCompressionMethod.exit_code(), 6);
        assert_eq!(ErrorKind::PathTraversalAttempt.exit_code(), 1);
    }

    #[test]
    fn context_display_is_readable() {
        let ctx = Context::new()
            .with_archive("a.tar")
            .with_entry("x/y.txt")
            .with_offset(512);
        assert_eq!(ctx.to_string(), "archive=a.tar, entry=x/y.txt, offset=512");
    }

    #[test]
    fn from_io_recovers_a_wrapped_extract_error() {
        let original = ExtractError::format(ErrorKind::ChecksumMismatch, Context::new(), "trailer mismatch");
        let wrapped = std::io::Error::new(std::io::ErrorKind::Other, original);
        let recovered = ExtractError::from_io(ErrorKind::ReadError, Context::new(), wrapped);
        assert_eq!(recovered.kind(), ErrorKind::ChecksumMismatch);
    }

    #[test]
    fn from_io_maps_unexpected_eof_to_incomplete_archive() {
        let io_err = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        let recovered = ExtractError::from_io(ErrorKind::ReadError, Context::new(), io_err);
        assert_eq!(recovered.kind(), ErrorKind::IncompleteArchive);
    }

    #[test]
    fn from_io_falls_back_to_the_given_kind_for_a_plain_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let recovered = ExtractError::from_io(ErrorKind::ReadError, Context::new(), io_err);
        assert_eq!(recovered.kind(), ErrorKind::ReadError);
    }
}
