//! On-disk inode records and open-node handles

use crate::error::Result;
use crate::types::FileKind;
use crate::volume::superblock::{le16, le32};
use crate::volume::Volume;
use gpt_disk_io::BlockIo;

/// A parsed inode record.
///
/// The 60 bytes holding the block pointers double as inline storage for
/// short symlink targets, so both views are kept.
#[derive(Debug, Clone)]
pub struct Inode {
    /// Mode bits (type and permissions)
    pub mode: u16,
    /// Size in bytes
    pub size: u32,
    /// Direct pointers, then singly-, doubly-, triply-indirect
    pub blocks: [u32; 15],
    /// Raw bytes of the block-pointer area (inline symlink target)
    pub inline: [u8; 60],
}

impl Inode {
    /// Bytes of an inode record this reader consumes. Records on disk may
    /// be larger (`Superblock::inode_size`); the tail is ignored.
    pub const ON_DISK_SIZE: usize = 128;

    /// Offset of the block-pointer area within the record.
    const BLOCKS_OFF: usize = 40;

    pub(crate) fn empty() -> Self {
        Self {
            mode: 0,
            size: 0,
            blocks: [0; 15],
            inline: [0; 60],
        }
    }

    /// Parse the leading bytes of an on-disk inode record (little-endian).
    pub fn parse(raw: &[u8]) -> Self {
        let mut blocks = [0u32; 15];
        for (i, b) in blocks.iter_mut().enumerate() {
            *b = le32(raw, Self::BLOCKS_OFF + i * 4);
        }

        let mut inline = [0u8; 60];
        inline.copy_from_slice(&raw[Self::BLOCKS_OFF..Self::BLOCKS_OFF + 60]);

        Self {
            mode: le16(raw, 0),
            size: le32(raw, 4),
            blocks,
            inline,
        }
    }

    /// What this inode is.
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }
}

/// An open inode during traversal or file access.
///
/// The record itself is read lazily: directory iteration creates many
/// nodes whose inodes are never needed because the entry's type tag
/// already answers the question at hand.
#[derive(Debug, Clone)]
pub struct Node {
    /// Inode number
    pub ino: u32,
    inode: Option<Inode>,
}

impl Node {
    /// A node whose inode has not been read yet.
    pub fn new(ino: u32) -> Self {
        Self { ino, inode: None }
    }

    /// A node with its inode already resident.
    pub fn with_inode(ino: u32, inode: Inode) -> Self {
        Self {
            ino,
            inode: Some(inode),
        }
    }

    /// The inode record, reading it on first use.
    pub fn inode<B: BlockIo>(&mut self, volume: &Volume, block_io: &mut B) -> Result<&Inode> {
        if self.inode.is_none() {
            self.inode = Some(volume.read_inode(block_io, self.ino)?);
        }
        Ok(self.inode.as_ref().unwrap())
    }

    /// File size in bytes.
    pub fn size<B: BlockIo>(&mut self, volume: &Volume, block_io: &mut B) -> Result<u32> {
        Ok(self.inode(volume, block_io)?.size)
    }
}
