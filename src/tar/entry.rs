//! The logical archive record yielded by [`super::ArchiveReader`].

/// The kind of filesystem object an [`Entry`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    RegularFile,
    Directory,
    Symlink,
    HardLink,
    CharDevice,
    BlockDevice,
    Fifo,
}

impl Kind {
    /// Maps a ustar `typeflag` byte to a [`Kind`]. Typeflag `'7'` (reserved,
    /// "contiguous file") and `0x00`/`'0'` both mean regular file, matching
    /// SPEC_FULL.md §4.3.
    pub fn from_typeflag(typeflag: u8) -> Kind {
        match typeflag {
            b'1' => Kind::HardLink,
            b'2' => Kind::Symlink,
            b'3' => Kind::CharDevice,
            b'4' => Kind::BlockDevice,
            b'5' => Kind::Directory,
            b'6' => Kind::Fifo,
            // '0', '7', NUL, and anything else unrecognised all degrade to
            // a regular file, matching GNU tar's tolerance for vendor
            // extension typeflags it doesn't understand.
            _ => Kind::RegularFile,
        }
    }

    pub fn to_typeflag(self) -> u8 {
        match self {
            Kind::RegularFile => b'0',
            Kind::HardLink => b'1',
            Kind::Symlink => b'2',
            Kind::CharDevice => b'3',
            Kind::BlockDevice => b'4',
            Kind::Directory => b'5',
            Kind::Fifo => b'6',
        }
    }

    pub fn is_link(self) -> bool {
        matches!(self, Kind::Symlink | Kind::HardLink)
    }
}

/// A single logical record enumerated by the archive reader: one per
/// archived file, directory, or link.
///
/// Entries are copied out of the reader's internal header buffer — they do
/// not borrow from it — so callers may retain one past the next `next()`
/// call, at the cost of one small allocation for `path`/`link_target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub kind: Kind,
    pub size: u64,
    pub mode: u32,
    pub mtime: i64,
    pub uid: u32,
    pub gid: u32,
    pub uname: Option<String>,
    pub gname: Option<String>,
    pub link_target: Option<String>,
    pub devmajor: u32,
    pub devminor: u32,
}

impl Entry {
    /// A minimal regular-file entry, useful for constructing test fixtures
    /// and for round-tripping through [`Header::encode`].
    pub fn new_file(path: impl Into<String>, size: u64) -> Self {
        Entry {
            path: path.into(),
            kind: Kind::RegularFile,
            size,
            mode: 0o644,
            mtime: 0,
            uid: 0,
            gid: 0,
            uname: None,
            gname: None,
            link_target: None,
            devmajor: 0,
            devminor: 0,
        }
    }
}
