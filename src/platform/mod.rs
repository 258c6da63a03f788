//! Cross-platform filesystem facade (SPEC_FULL.md §4.6).
//!
//! The extractor only ever calls through these free functions — it never
//! touches `std::fs` directly for entry materialisation — so the Unix and
//! Windows capability differences stay isolated to one module per platform.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use self::unix::{
    create_hardlink, create_symlink, is_symlink, read_symlink, set_mtime, set_owner,
    set_permissions, try_create_device,
};
#[cfg(unix)]
use self::unix::open_new_file;

#[cfg(windows)]
pub use self::windows::{
    create_hardlink, create_symlink, is_symlink, read_symlink, set_mtime, set_owner,
    set_permissions, try_create_device,
};
#[cfg(windows)]
use self::windows::open_new_file;

use std::fs::File;
use std::path::Path;

use crate::error::{Context, ErrorKind, ExtractError, Result};

/// Creates `path` and all missing ancestors. Mirrors `std::fs::create_dir_all`
/// but maps the error through the crate's taxonomy.
pub fn create_dir_all(path: &Path, ctx: &Context) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_err(e, ctx))
}

/// Opens `path` for writing a fresh regular file, honouring `overwrite`.
///
/// Never follows an existing symlink at `path`: if one is present and
/// `overwrite` is true, it is removed first rather than opened through.
pub fn create_regular_file(path: &Path, overwrite: bool, ctx: &Context) -> Result<File> {
    if is_symlink(path) || path.exists() {
        if !overwrite {
            return Err(ExtractError::format(
                ErrorKind::FileExists,
                ctx.clone(),
                format!("{} already exists", path.display()),
            ));
        }
        std::fs::remove_file(path).map_err(|e| io_err(e, ctx))?;
    }
    open_new_file(path, ctx)
}

pub(crate) fn io_err(e: std::io::Error, ctx: &Context) -> ExtractError {
    let kind = match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        _ => ErrorKind::WriteError,
    };
    ExtractError::io(kind, ctx.clone(), e)
}
