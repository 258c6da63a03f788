//! Unix filesystem capability implementations, grounded in the same
//! `nix`/`filetime`/`libc` stack the rest of this crate already depends on.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use filetime::FileTime;

use crate::error::{Context, ErrorKind, ExtractError, Result};
use crate::tar::Kind;

use super::io_err;

/// Opens `path` for writing, refusing to follow an existing symlink there.
pub(super) fn open_new_file(path: &Path, ctx: &Context) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
        .map_err(|e| io_err(e, ctx))
}

/// Applies the lower 12 permission bits (rwxrwxrwx + setuid/setgid/sticky).
pub fn set_permissions(path: &Path, mode: u32, ctx: &Context) -> Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| io_err(e, ctx))
}

/// Sets the modification time via `utimensat`/`futimens` (through `filetime`).
/// Access time is bumped to now; only `mtime` is meaningful to the archive.
pub fn set_mtime(path: &Path, mtime: i64, ctx: &Context) -> Result<()> {
    let ft = FileTime::from_unix_time(mtime, 0);
    filetime::set_file_times(path, FileTime::now(), ft).map_err(|e| io_err(e, ctx))
}

/// Best-effort ownership change. Errors here are expected (lack of
/// privilege) and the caller decides whether to surface or swallow them.
pub fn set_owner(path: &Path, uid: u32, gid: u32, ctx: &Context) -> Result<()> {
    use nix::unistd::{chown, Gid, Uid};
    chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
        .map_err(|e| ExtractError::io(ErrorKind::PermissionDenied, ctx.clone(), std::io::Error::from(e)))
}

/// Creates a symlink at `link_path` pointing at `target` (not validated —
/// the security layer is responsible for policy checks before this call).
pub fn create_symlink(target: &str, link_path: &Path, ctx: &Context) -> Result<()> {
    std::os::unix::fs::symlink(target, link_path).map_err(|e| io_err(e, ctx))
}

/// Creates a hard link at `link_path` pointing at the already-materialised
/// file `existing`.
pub fn create_hardlink(existing: &Path, link_path: &Path, ctx: &Context) -> Result<()> {
    std::fs::hard_link(existing, link_path).map_err(|e| io_err(e, ctx))
}

/// `true` if `path` is itself a symlink (never follows).
pub fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Reads the raw target of the symlink at `path`.
pub fn read_symlink(path: &Path, ctx: &Context) -> Result<String> {
    std::fs::read_link(path)
        .map_err(|e| io_err(e, ctx))
        .map(|p| p.to_string_lossy().into_owned())
}

/// Attempts to create a device or FIFO node via `mknod`, gated behind the
/// `device-nodes` feature (most sandboxes lack `CAP_MKNOD`).
#[cfg(feature = "device-nodes")]
pub fn try_create_device(
    path: &Path,
    kind: Kind,
    devmajor: u32,
    devminor: u32,
    ctx: &Context,
) -> Result<()> {
    use nix::sys::stat::{mknod, makedev, Mode, SFlag};

    let sflag = match kind {
        Kind::CharDevice => SFlag::S_IFCHR,
        Kind::BlockDevice => SFlag::S_IFBLK,
        Kind::Fifo => SFlag::S_IFIFO,
        _ => {
            return Err(ExtractError::format(
                ErrorKind::UnsupportedEntryType,
                ctx.clone(),
                "try_create_device called with a non-device entry kind",
            ))
        }
    };
    let dev = makedev(devmajor as u64, devminor as u64);
    mknod(path, sflag, Mode::from_bits_truncate(0o644), dev)
        .map_err(|e| ExtractError::io(ErrorKind::PermissionDenied, ctx.clone(), std::io::Error::from(e)))
}

#[cfg(not(feature = "device-nodes"))]
pub fn try_create_device(
    _path: &Path,
    _kind: Kind,
    _devmajor: u32,
    _devminor: u32,
    ctx: &Context,
) -> Result<()> {
    Err(ExtractError::format(
        ErrorKind::UnsupportedEntryType,
        ctx.clone(),
        "device/FIFO entries require the device-nodes feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_regular_file_refuses_existing_without_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"old").unwrap();
        let err = super::super::create_regular_file(&path, false, &Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileExists);
    }

    #[test]
    fn create_regular_file_overwrites_when_allowed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"old").unwrap();
        super::super::create_regular_file(&path, true, &Context::new()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn is_symlink_detects_links_without_following() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target.txt");
        std::fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link.txt");
        create_symlink("target.txt", &link, &Context::new()).unwrap();
        assert!(is_symlink(&link));
        assert!(!is_symlink(&target));
        assert_eq!(read_symlink(&link, &Context::new()).unwrap(), "target.txt");
    }

    #[test]
    fn set_mtime_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"x").unwrap();
        set_mtime(&path, 1_000_000, &Context::new()).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        let mtime = FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), 1_000_000);
    }
}
