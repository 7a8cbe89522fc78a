//! Error types for ext2 operations

use core::fmt;

/// Result type for ext2 operations
pub type Result<T> = core::result::Result<T, Ext2Error>;

/// Errors that can occur while reading an ext2 volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ext2Error {
    /// I/O error reading from the block device
    IoError,

    /// Access past the end of the partition
    OutOfBounds,

    /// Superblock magic mismatch, volume is not ext2
    NotExt2,

    /// Structurally invalid metadata (triple indirection, zero-length
    /// directory entry, inode number out of range)
    Corrupt,

    /// File or directory not found
    NotFound,

    /// Symlink chain exceeded the nesting limit
    SymlinkLoop,

    /// Nothing is mounted
    NotMounted,
}

impl fmt::Display for Ext2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError => write!(f, "I/O error reading block device"),
            Self::OutOfBounds => write!(f, "access beyond partition size"),
            Self::NotExt2 => write!(f, "filesystem is not ext2"),
            Self::Corrupt => write!(f, "filesystem is corrupted"),
            Self::NotFound => write!(f, "file not found"),
            Self::SymlinkLoop => write!(f, "symlink loop detected"),
            Self::NotMounted => write!(f, "no mounted filesystem"),
        }
    }
}
