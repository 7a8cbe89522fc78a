//! Common types and constants for ext2

use alloc::string::String;

/// Device sector size; all block-device I/O happens in these units.
pub const SECTOR_SIZE: usize = 512;

/// Superblock magic value.
pub const EXT2_MAGIC: u16 = 0xEF53;

/// Byte offset of the superblock from the start of the volume.
pub const SUPERBLOCK_OFFSET: u64 = 1024;

/// Inode number of the root directory.
pub const ROOT_INO: u32 = 2;

/// Number of direct block pointers in an inode.
pub const DIRECT_BLOCKS: usize = 12;

/// Symlink targets at most this long are stored inline in the inode.
pub const INLINE_SYMLINK_MAX: u32 = 60;

/// Maximum symlink nesting before resolution reports a loop.
pub const MAX_SYMLINK_DEPTH: u32 = 8;

/// What a directory entry or inode refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Anything else (device node, fifo, socket, unrecognized)
    Other,
}

impl FileKind {
    /// Map a directory-entry type tag, if it carries one.
    pub fn from_dirent_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Regular),
            2 => Some(Self::Directory),
            7 => Some(Self::Symlink),
            0 => None,
            _ => Some(Self::Other),
        }
    }

    /// Map the type bits of an inode mode field.
    pub fn from_mode(mode: u16) -> Self {
        match mode & 0o170000 {
            0o100000 => Self::Regular,
            0o040000 => Self::Directory,
            0o120000 => Self::Symlink,
            _ => Self::Other,
        }
    }
}

/// A directory listing entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Inode number
    pub ino: u32,
    /// Entry name (never "." or "..")
    pub name: String,
    /// Entry kind
    pub kind: FileKind,
    /// File size in bytes
    pub size: u32,
}
