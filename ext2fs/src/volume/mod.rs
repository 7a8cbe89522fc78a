//! Volume mounting and raw sector access
//!
//! A [`Volume`] is the mount state for one ext2 filesystem on one
//! partition: the parsed superblock, the root inode, and the two
//! indirect-block caches. Dropping it is the unmount; at most one should be
//! live per partition, which the caller enforces.

pub mod superblock;

use crate::error::{Ext2Error, Result};
use crate::inode::{Inode, Node};
use crate::types::{ROOT_INO, SECTOR_SIZE, SUPERBLOCK_OFFSET};
use alloc::vec;
use alloc::vec::Vec;
use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;
use log::debug;

pub use superblock::Superblock;
use superblock::le32;

/// Size of an on-disk block group descriptor.
const GROUP_DESC_SIZE: u32 = 32;

/// One cached filesystem block, keyed by its absolute block number.
#[derive(Debug)]
pub(crate) struct BlockCache {
    buf: Vec<u8>,
    blkno: Option<u32>,
}

impl BlockCache {
    fn new(block_size: u32) -> Self {
        Self {
            buf: vec![0u8; block_size as usize],
            blkno: None,
        }
    }

    /// Absolute block number currently resident, if any.
    pub(crate) fn blkno(&self) -> Option<u32> {
        self.blkno
    }

    /// Take the buffer out for refilling, invalidating the cache.
    pub(crate) fn take_buf(&mut self) -> Vec<u8> {
        self.blkno = None;
        core::mem::take(&mut self.buf)
    }

    /// Install a freshly read block.
    pub(crate) fn fill(&mut self, blkno: u32, buf: Vec<u8>) {
        self.buf = buf;
        self.blkno = Some(blkno);
    }

    /// Return the buffer after a failed read; the cache stays empty.
    pub(crate) fn put_buf(&mut self, buf: Vec<u8>) {
        self.buf = buf;
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.buf
    }
}

/// Mount state for one ext2 filesystem
#[derive(Debug)]
pub struct Volume {
    start_lba: u64,
    sector_count: u64,
    sb: Superblock,
    root: Inode,
    pub(crate) indir1: BlockCache,
    pub(crate) indir2: BlockCache,
}

/// Mount an ext2 volume found on a partition.
///
/// Reads and validates the superblock at its fixed offset, then reads the
/// root inode. `start_lba`/`sector_count` are the partition geometry in
/// 512-byte sectors; every subsequent access is bounds-checked against it.
pub fn mount<B: BlockIo>(block_io: &mut B, start_lba: u64, sector_count: u64) -> Result<Volume> {
    let mut raw = [0u8; 1024];
    read_sectors(
        block_io,
        start_lba,
        sector_count,
        SUPERBLOCK_OFFSET / SECTOR_SIZE as u64,
        0,
        &mut raw,
    )?;

    let sb = Superblock::parse(&raw)?;
    debug!(
        "ext2 rev {} block size {} inode size {}",
        sb.revision_level,
        sb.block_size(),
        sb.inode_size
    );

    let block_size = sb.block_size();
    let mut volume = Volume {
        start_lba,
        sector_count,
        sb,
        root: Inode::empty(),
        indir1: BlockCache::new(block_size),
        indir2: BlockCache::new(block_size),
    };

    volume.root = volume.read_inode(block_io, ROOT_INO)?;
    Ok(volume)
}

impl Volume {
    /// The parsed superblock.
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    /// A fresh node for the root directory, inode already resident.
    pub fn root_node(&self) -> Node {
        Node::with_inode(ROOT_INO, self.root.clone())
    }

    /// Read `buf.len()` bytes starting `byte_off` bytes into
    /// partition-relative `sector`.
    pub(crate) fn read_raw<B: BlockIo>(
        &self,
        block_io: &mut B,
        sector: u64,
        byte_off: usize,
        buf: &mut [u8],
    ) -> Result<()> {
        read_sectors(
            block_io,
            self.start_lba,
            self.sector_count,
            sector,
            byte_off,
            buf,
        )
    }

    /// Read a whole filesystem block into `buf` (which must be one block
    /// long).
    pub(crate) fn read_fs_block<B: BlockIo>(
        &self,
        block_io: &mut B,
        blkno: u32,
        buf: &mut [u8],
    ) -> Result<()> {
        let sector = u64::from(blkno) << self.sb.log_sectors_per_block();
        read_sectors(
            block_io,
            self.start_lba,
            self.sector_count,
            sector,
            0,
            buf,
        )
    }

    /// Locate a block group descriptor and return its inode table block.
    ///
    /// Descriptors are packed into the blocks immediately after the first
    /// data block.
    fn group_inode_table<B: BlockIo>(&self, block_io: &mut B, group: u32) -> Result<u32> {
        let desc_per_block = self.sb.block_size() / GROUP_DESC_SIZE;
        let blkno = self.sb.first_data_block + 1 + group / desc_per_block;
        let blkoff = (group % desc_per_block) * GROUP_DESC_SIZE;

        let mut desc = [0u8; GROUP_DESC_SIZE as usize];
        self.read_raw(
            block_io,
            u64::from(blkno) << self.sb.log_sectors_per_block(),
            blkoff as usize,
            &mut desc,
        )?;

        // inode_table_id is the third field
        Ok(le32(&desc, 8))
    }

    /// Read an inode record by number.
    pub(crate) fn read_inode<B: BlockIo>(&self, block_io: &mut B, ino: u32) -> Result<Inode> {
        if ino == 0 || ino > self.sb.total_inodes {
            return Err(Ext2Error::Corrupt);
        }

        // Numbering starts at 1; index from 0 for the arithmetic.
        let index = ino - 1;
        let group = index / self.sb.inodes_per_group;
        let inode_table = self.group_inode_table(block_io, group)?;

        let inodes_per_block = self.sb.block_size() / self.sb.inode_size;
        let index_in_group = index % self.sb.inodes_per_group;
        let blkno = inode_table + index_in_group / inodes_per_block;
        let blkoff = (index_in_group % inodes_per_block) * self.sb.inode_size;

        debug!("ext2 read inode {} (block {} offset {})", ino, blkno, blkoff);

        let mut raw = [0u8; Inode::ON_DISK_SIZE];
        self.read_raw(
            block_io,
            u64::from(blkno) << self.sb.log_sectors_per_block(),
            blkoff as usize,
            &mut raw,
        )?;

        Ok(Inode::parse(&raw))
    }
}

/// Bounds-checked byte read built on whole-sector device I/O.
///
/// `sector` is relative to `start_lba`; the read may start mid-sector and
/// end mid-sector. Aligned reads go straight into `buf`; anything else
/// goes through a covering scratch buffer.
fn read_sectors<B: BlockIo>(
    block_io: &mut B,
    start_lba: u64,
    sector_count: u64,
    sector: u64,
    byte_off: usize,
    buf: &mut [u8],
) -> Result<()> {
    if buf.is_empty() {
        return Ok(());
    }

    let begin = sector * SECTOR_SIZE as u64 + byte_off as u64;
    let end = begin + buf.len() as u64;
    if end > sector_count * SECTOR_SIZE as u64 {
        return Err(Ext2Error::OutOfBounds);
    }

    let first = start_lba + begin / SECTOR_SIZE as u64;
    let skip = (begin % SECTOR_SIZE as u64) as usize;

    if skip == 0 && buf.len() % SECTOR_SIZE == 0 {
        return block_io
            .read_blocks(Lba(first), buf)
            .map_err(|_| Ext2Error::IoError);
    }

    let covered = (skip + buf.len()).div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
    let mut scratch = vec![0u8; covered];
    block_io
        .read_blocks(Lba(first), &mut scratch)
        .map_err(|_| Ext2Error::IoError)?;
    buf.copy_from_slice(&scratch[skip..skip + buf.len()]);
    Ok(())
}
