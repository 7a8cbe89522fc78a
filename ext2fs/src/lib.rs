//! Read-only ext2 filesystem reader
//!
//! A `no_std` implementation of the classic block-mapped ext2 format, sized
//! for second-stage bootloaders that need to pull a kernel and initrd off a
//! disk before any operating system exists.
//!
//! # Overview
//!
//! The reader supports:
//! - Superblock parsing and validation (revision-0 inode size fallback)
//! - Block group descriptor and inode table lookup
//! - Direct, singly- and doubly-indirect block mapping (triple indirection
//!   is treated as corruption)
//! - Sparse files (zero block pointers read back as zero bytes)
//! - Directory iteration and path resolution with symlink following
//!
//! # Architecture
//!
//! The implementation is layered:
//! 1. **Volume layer** - superblock, group descriptors, raw sector access
//! 2. **Inode layer** - on-disk inode records and their block pointers
//! 3. **File layer** - block-mapped reads with the two indirect caches
//! 4. **Directory layer** - entry iteration and path walking
//!
//! All device access goes through the [`gpt_disk_io::BlockIo`] trait in
//! whole 512-byte sectors; the volume is given its partition geometry at
//! mount time and bounds-checks every access against it.
//!
//! # Usage
//!
//! ```ignore
//! use ext2fs::{mount, lookup, read_at, FileKind};
//!
//! let mut vol = mount(&mut block_io, part_start_lba, part_sectors)?;
//! let mut node = lookup(&mut block_io, &mut vol, "/boot/vmlinux", FileKind::Regular)?;
//! let len = node.size(&mut vol, &mut block_io)? as usize;
//! let mut buf = vec![0u8; len];
//! read_at(&mut block_io, &mut vol, &mut node, 0, &mut buf)?;
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod error;
pub mod types;
pub mod volume;
pub mod inode;
pub mod directory;
pub mod file;

pub use error::{Ext2Error, Result};
pub use types::{DirEntry, FileKind};
pub use inode::Node;
pub use volume::{mount, Volume};
pub use directory::{lookup, read_dir};
pub use file::read_at;
