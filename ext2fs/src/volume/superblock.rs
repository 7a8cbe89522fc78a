//! Superblock parsing

use crate::error::{Ext2Error, Result};
use crate::types::EXT2_MAGIC;

/// Fields of the superblock the reader cares about.
///
/// Everything else (bitmaps, feature flags, journal fields of later
/// revisions) is ignored; incompatible features simply fail later as
/// corruption, which is acceptable for a read-only boot-time reader.
#[derive(Debug, Clone)]
pub struct Superblock {
    /// Total inode count
    pub total_inodes: u32,
    /// First data block (0 for block sizes > 1 KiB, 1 otherwise)
    pub first_data_block: u32,
    /// log2(block size) - 10, i.e. block size is `1024 << log_block_size`
    pub log_block_size: u32,
    /// Blocks per block group
    pub blocks_per_group: u32,
    /// Inodes per block group
    pub inodes_per_group: u32,
    /// Revision level
    pub revision_level: u32,
    /// On-disk inode record size, already defaulted for revision 0
    pub inode_size: u32,
}

impl Superblock {
    /// Parse a superblock from its first 1024 on-disk bytes.
    ///
    /// Fields are little-endian regardless of host byte order. Revision 0
    /// volumes predate the inode-size field and always use 128-byte
    /// inodes.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 90 {
            return Err(Ext2Error::Corrupt);
        }

        let magic = le16(raw, 56);
        if magic != EXT2_MAGIC {
            return Err(Ext2Error::NotExt2);
        }

        let revision_level = le32(raw, 76);
        let inode_size = if revision_level == 0 {
            128
        } else {
            u32::from(le16(raw, 88))
        };

        Ok(Self {
            total_inodes: le32(raw, 0),
            first_data_block: le32(raw, 20),
            log_block_size: le32(raw, 24),
            blocks_per_group: le32(raw, 32),
            inodes_per_group: le32(raw, 40),
            revision_level,
            inode_size,
        })
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> u32 {
        1024 << self.log_block_size
    }

    /// log2 of the block size in 512-byte sectors.
    pub fn log_sectors_per_block(&self) -> u32 {
        self.log_block_size + 1
    }
}

pub(crate) fn le16(raw: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([raw[off], raw[off + 1]])
}

pub(crate) fn le32(raw: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]])
}
