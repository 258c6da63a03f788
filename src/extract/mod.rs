//! Extractor orchestrator (SPEC_FULL.md §4.7): drives the archive reader,
//! consults the security policy, and dispatches to the platform facade.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::container::CompressedProgress;
use crate::error::{Context, ErrorKind, ExtractError, Result};
use crate::platform;
use crate::security::{self, SecurityPolicy};
use crate::tar::{ArchiveReader, Kind};

/// Per-entry behaviour flags (SPEC_FULL.md §4.7).
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub overwrite: bool,
    pub preserve_permissions: bool,
    pub preserve_timestamps: bool,
    pub continue_on_error: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            overwrite: false,
            preserve_permissions: false,
            preserve_timestamps: true,
            continue_on_error: false,
        }
    }
}

const DEFAULT_BODY_BUFFER_SIZE: usize = 64 * 1024;

/// Aggregates everything threaded down to the orchestrator by value
/// (SPEC_FULL.md §4.9): no field is ever read from a process-global.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub security_policy: SecurityPolicy,
    pub options: ExtractOptions,
    pub max_decompressed_size: u64,
    pub body_buffer_size: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            security_policy: SecurityPolicy::default(),
            options: ExtractOptions::default(),
            max_decompressed_size: crate::container::DEFAULT_MAX_DECOMPRESSED_SIZE,
            body_buffer_size: DEFAULT_BODY_BUFFER_SIZE,
        }
    }
}

impl ExtractConfig {
    pub fn builder() -> ExtractConfigBuilder {
        ExtractConfigBuilder::default()
    }
}

/// Small builder API mirroring the teacher's `Prefs`-style option
/// aggregation, for callers that want to set a few fields without
/// constructing every field of [`ExtractConfig`] by hand.
#[derive(Debug, Default)]
pub struct ExtractConfigBuilder {
    config: ExtractConfig,
}

impl ExtractConfigBuilder {
    pub fn security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.config.security_policy = policy;
        self
    }

    pub fn options(mut self, options: ExtractOptions) -> Self {
        self.config.options = options;
        self
    }

    pub fn max_decompressed_size(mut self, bytes: u64) -> Self {
        self.config.max_decompressed_size = bytes;
        self
    }

    pub fn body_buffer_size(mut self, bytes: usize) -> Self {
        self.config.body_buffer_size = bytes.max(1);
        self
    }

    pub fn build(self) -> ExtractConfig {
        self.config
    }
}

/// One warning recorded against an entry that failed but did not abort the
/// whole extraction (`continue_on_error = true`).
#[derive(Debug, Clone)]
pub struct Warning {
    pub entry_path: String,
    pub message: String,
    pub kind: ErrorKind,
}

/// The outcome of one `Extractor::run` call.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub succeeded: u64,
    pub failed: u64,
    pub total_bytes: u64,
    pub warnings: Vec<Warning>,
    pub aborted: bool,
}

/// Checked at entry boundaries and between body chunks so a long extraction
/// can be cancelled cooperatively.
pub trait AbortSignal {
    fn is_aborted(&self) -> bool;
}

impl AbortSignal for AtomicBool {
    fn is_aborted(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Never signals abort; used when the caller passes no signal at all.
struct NeverAbort;
impl AbortSignal for NeverAbort {
    fn is_aborted(&self) -> bool {
        false
    }
}

/// Drives one extraction from an [`ArchiveReader`] into `destination_root`.
///
/// `R` must implement [`CompressedProgress`] so the compression-ratio
/// ceiling can be consulted with real numbers: wrap a raw tar stream in
/// [`crate::container::RawSource`], or use [`crate::container::FramedReader`]
/// directly for a compressed one.
pub struct Extractor<'a, R: Read + CompressedProgress> {
    reader: ArchiveReader<R>,
    destination_root: PathBuf,
    config: ExtractConfig,
    archive_context: Context,
    abort: &'a dyn AbortSignal,
}

impl<'a, R: Read + CompressedProgress> Extractor<'a, R> {
    pub fn new(reader: ArchiveReader<R>, destination_root: impl Into<PathBuf>, config: ExtractConfig) -> Extractor<'static, R> {
        Extractor {
            reader,
            destination_root: destination_root.into(),
            config,
            archive_context: Context::new(),
            abort: &NeverAbort,
        }
    }

    pub fn with_archive_context(mut self, context: Context) -> Self {
        self.archive_context = context;
        self
    }

    pub fn with_abort_signal(self, abort: &'a dyn AbortSignal) -> Extractor<'a, R> {
        Extractor {
            reader: self.reader,
            destination_root: self.destination_root,
            config: self.config,
            archive_context: self.archive_context,
            abort,
        }
    }

    fn ctx(&self, entry_path: Option<&str>) -> Context {
        let mut ctx = self.archive_context.clone();
        if let Some(p) = entry_path {
            ctx = ctx.with_entry(p);
        }
        ctx
    }

    /// Runs the extraction to completion. Archive-level errors (truncation,
    /// checksum mismatch, decompressor integrity failures) always propagate,
    /// regardless of `continue_on_error`.
    pub fn run(&mut self) -> Result<ExtractionResult> {
        let span = tracing::info_span!("extract", root = %self.destination_root.display());
        let _guard = span.enter();

        let mut result = ExtractionResult::default();

        loop {
            if self.abort.is_aborted() {
                tracing::info!(succeeded = result.succeeded, failed = result.failed, "extraction aborted");
                result.aborted = true;
                return Ok(result);
            }

            let entry = match self.reader.next() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(kind = ?e.kind(), "archive-level error, aborting extraction");
                    return Err(e);
                }
            };

            tracing::debug!(path = %entry.path, kind = ?entry.kind, size = entry.size, "entry");

            match self.extract_one(&entry, &mut result) {
                Ok(()) => {}
                Err(e) if self.config.options.continue_on_error && is_per_entry_error(&e) => {
                    tracing::warn!(path = %entry.path, kind = ?e.kind(), "entry demoted to warning");
                    result.failed += 1;
                    result.warnings.push(Warning {
                        entry_path: entry.path.clone(),
                        message: e.to_string(),
                        kind: e.kind(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            succeeded = result.succeeded,
            failed = result.failed,
            total_bytes = result.total_bytes,
            "extraction complete"
        );
        Ok(result)
    }

    fn extract_one(&mut self, entry: &crate::tar::Entry, result: &mut ExtractionResult) -> Result<()> {
        let ctx = self.ctx(Some(&entry.path));
        let policy = &self.config.security_policy;

        if entry.kind == Kind::RegularFile {
            security::check_single_file_size(entry.size, policy, &ctx)?;
        }

        let safe_path = security::sanitise(&entry.path, policy, &ctx)?;
        let target = self.destination_root.join(safe_path.as_str());

        match entry.kind {
            Kind::Directory => {
                platform::create_dir_all(&target, &ctx)?;
            }
            Kind::RegularFile => {
                self.extract_regular_file(entry, &target, &ctx, result)?;
            }
            Kind::Symlink => {
                let link_target = entry.link_target.clone().unwrap_or_default();
                security::check_link_target(&link_target, &safe_path, policy, &ctx)?;
                if let Some(parent) = target.parent() {
                    platform::create_dir_all(parent, &ctx)?;
                }
                create_fresh(&target, self.config.options.overwrite, &ctx)?;
                platform::create_symlink(&link_target, &target, &ctx)?;
            }
            Kind::HardLink => {
                let link_target = entry.link_target.clone().unwrap_or_default();
                let safe_target = security::resolve_hardlink_target(&link_target, policy, &ctx)?;
                if let Some(parent) = target.parent() {
                    platform::create_dir_all(parent, &ctx)?;
                }
                create_fresh(&target, self.config.options.overwrite, &ctx)?;
                let existing = self.destination_root.join(safe_target.as_str());
                platform::create_hardlink(&existing, &target, &ctx)?;
            }
            Kind::CharDevice | Kind::BlockDevice | Kind::Fifo => {
                if let Some(parent) = target.parent() {
                    platform::create_dir_all(parent, &ctx)?;
                }
                match platform::try_create_device(&target, entry.kind, entry.devmajor, entry.devminor, &ctx) {
                    Ok(()) => {}
                    Err(_) => {
                        result.warnings.push(Warning {
                            entry_path: entry.path.clone(),
                            message: "device/FIFO entries are not supported on this platform".to_string(),
                            kind: ErrorKind::UnsupportedEntryType,
                        });
                        return Ok(());
                    }
                }
            }
        }

        if self.config.options.preserve_permissions && entry.kind != Kind::Symlink {
            platform::set_permissions(&target, entry.mode, &ctx)?;
            let _ = platform::set_owner(&target, entry.uid, entry.gid, &ctx);
        }
        if self.config.options.preserve_timestamps && entry.kind != Kind::Symlink {
            platform::set_mtime(&target, entry.mtime, &ctx)?;
        }

        result.succeeded += 1;
        result.total_bytes += entry.size;
        Ok(())
    }

    fn extract_regular_file(
        &mut self,
        entry: &crate::tar::Entry,
        target: &Path,
        ctx: &Context,
        result: &mut ExtractionResult,
    ) -> Result<()> {
        if let Some(parent) = target.parent() {
            platform::create_dir_all(parent, ctx)?;
        }

        let mut file = match platform::create_regular_file(target, self.config.options.overwrite, ctx) {
            Ok(f) => f,
            Err(e) => return Err(e),
        };

        let mut buf = vec![0u8; self.config.body_buffer_size];
        let mut written = 0u64;
        let write_result = (|| -> Result<()> {
            loop {
                if self.abort.is_aborted() {
                    return Err(ExtractError::Aborted { context: ctx.clone() });
                }
                let n = self.reader.read(&mut buf)?;
                if n == 0 {
                    if written < entry.size {
                        return Err(ExtractError::format(
                            ErrorKind::IncompleteArchive,
                            ctx.clone(),
                            "archive ended before the declared entry size was reached",
                        ));
                    }
                    break;
                }
                file.write_all(&buf[..n]).map_err(|e| {
                    ExtractError::io(ErrorKind::WriteError, ctx.clone(), e)
                })?;
                written += n as u64;
                security::check_running_totals(
                    result.total_bytes + written,
                    self.reader.compressed_consumed(),
                    &self.config.security_policy,
                    ctx,
                )?;
            }
            Ok(())
        })();

        drop(file);
        if let Err(e) = write_result {
            let _ = std::fs::remove_file(target);
            return Err(e);
        }
        Ok(())
    }
}

fn create_fresh(target: &Path, overwrite: bool, ctx: &Context) -> Result<()> {
    if platform::is_symlink(target) || target.exists() {
        if !overwrite {
            return Err(ExtractError::format(
                ErrorKind::FileExists,
                ctx.clone(),
                format!("{} already exists", target.display()),
            ));
        }
        std::fs::remove_file(target).map_err(|e| ExtractError::io(ErrorKind::WriteError, ctx.clone(), e))?;
    }
    Ok(())
}

/// Archive-level errors (truncation, corrupted header, checksum mismatch,
/// decompressor integrity failure) are never demoted to warnings, even with
/// `continue_on_error` set (SPEC_FULL.md §4.7, §7).
fn is_per_entry_error(err: &ExtractError) -> bool {
    !matches!(
        err.kind(),
        ErrorKind::CorruptedHeader
            | ErrorKind::IncompleteArchive
            | ErrorKind::ChecksumMismatch
            | ErrorKind::InvalidFormat
            | ErrorKind::InvalidGzipMagic
            | ErrorKind::UnsupportedCompressionMethod
            | ErrorKind::InvalidData
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::RawSource;
    use crate::error::Context;
    use crate::tar::{Entry, Header};
    use tempfile::TempDir;

    fn block_for(entry: &Entry) -> [u8; crate::tar::BLOCK_SIZE] {
        let header = Header::encode(entry, &Context::new()).unwrap();
        header.to_block(&Context::new()).unwrap()
    }

    #[test]
    fn extracts_single_regular_file() {
        let dir = TempDir::new().unwrap();
        let entry = Entry::new_file("hello.txt", 3);
        let mut data = block_for(&entry).to_vec();
        data.extend_from_slice(b"Hi\n");
        data.extend_from_slice(&[0u8; 509]);
        data.extend_from_slice(&[0u8; 1024]);

        let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
        let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
        let result = extractor.run().unwrap();

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.total_bytes, 3);
        assert_eq!(std::fs::read(dir.path().join("hello.txt")).unwrap(), b"Hi\n");
    }

    #[test]
    fn path_traversal_is_rejected_without_continue_on_error() {
        let dir = TempDir::new().unwrap();
        let entry = Entry::new_file("../../../etc/passwd", 0);
        let mut data = block_for(&entry).to_vec();
        data.extend_from_slice(&[0u8; 1024]);

        let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
        let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
        let err = extractor.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversalAttempt);
        assert!(!dir.path().parent().unwrap().join("etc").exists());
    }

    #[test]
    fn path_traversal_becomes_a_warning_with_continue_on_error() {
        let dir = TempDir::new().unwrap();
        let bad = Entry::new_file("../escape.txt", 0);
        let good = Entry::new_file("ok.txt", 0);
        let mut data = block_for(&bad).to_vec();
        data.extend_from_slice(&block_for(&good));
        data.extend_from_slice(&[0u8; 1024]);

        let mut config = ExtractConfig::default();
        config.options.continue_on_error = true;
        let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
        let mut extractor = Extractor::new(reader, dir.path(), config);
        let result = extractor.run().unwrap();

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.warnings[0].kind, ErrorKind::PathTraversalAttempt);
        assert!(dir.path().join("ok.txt").exists());
    }

    #[test]
    fn empty_archive_produces_empty_result() {
        let dir = TempDir::new().unwrap();
        let data = vec![0u8; 1024];
        let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
        let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
        let result = extractor.run().unwrap();
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.failed, 0);
        assert_eq!(result.total_bytes, 0);
    }

    #[test]
    fn refuses_to_overwrite_existing_file_by_default() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"old").unwrap();
        let entry = Entry::new_file("hello.txt", 3);
        let mut data = block_for(&entry).to_vec();
        data.extend_from_slice(b"Hi\n");
        data.extend_from_slice(&[0u8; 509]);
        data.extend_from_slice(&[0u8; 1024]);

        let reader = ArchiveReader::new(RawSource::new(data.as_slice()), Context::new());
        let mut extractor = Extractor::new(reader, dir.path(), ExtractConfig::default());
        let err = extractor.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileExists);
        assert_eq!(std::fs::read(dir.path().join("hello.txt")).unwrap(), b"old");
    }
}
