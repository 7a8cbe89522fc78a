//! File-relative to absolute block translation

use crate::error::{Ext2Error, Result};
use crate::inode::Inode;
use crate::types::DIRECT_BLOCKS;
use crate::volume::superblock::le32;
use crate::volume::Volume;
use gpt_disk_io::BlockIo;

#[derive(Clone, Copy)]
enum CacheLevel {
    First,
    Second,
}

/// Resolve a file-relative block index to an absolute block number.
///
/// Returns 0 for holes: a zero pointer at any level means the data block
/// is not stored and reads back as zeroes.
///
/// Indirect table blocks go through the volume's two single-block caches,
/// so sequential reads do not refetch the same table for every block.
/// Triple indirection is not supported and is reported as corruption.
pub fn file_block<B: BlockIo>(
    block_io: &mut B,
    volume: &mut Volume,
    inode: &Inode,
    index: u32,
) -> Result<u32> {
    let ptrs_per_block = volume.superblock().block_size() / 4;
    let direct = DIRECT_BLOCKS as u32;

    if index < direct {
        return Ok(inode.blocks[index as usize]);
    }

    if index < direct + ptrs_per_block {
        let table = inode.blocks[DIRECT_BLOCKS];
        if table == 0 {
            return Ok(0);
        }
        let slot = index - direct;
        return table_entry(block_io, volume, CacheLevel::First, table, slot);
    }

    if index < direct + ptrs_per_block * (ptrs_per_block + 1) {
        let top = inode.blocks[DIRECT_BLOCKS + 1];
        if top == 0 {
            return Ok(0);
        }
        let rel = index - direct - ptrs_per_block;
        let table = table_entry(block_io, volume, CacheLevel::First, top, rel / ptrs_per_block)?;
        if table == 0 {
            return Ok(0);
        }
        return table_entry(block_io, volume, CacheLevel::Second, table, rel % ptrs_per_block);
    }

    Err(Ext2Error::Corrupt)
}

/// Read one entry of a pointer block, refreshing the cache if the block
/// resident in it is not the one wanted.
fn table_entry<B: BlockIo>(
    block_io: &mut B,
    volume: &mut Volume,
    level: CacheLevel,
    blkno: u32,
    slot: u32,
) -> Result<u32> {
    let resident = match level {
        CacheLevel::First => volume.indir1.blkno(),
        CacheLevel::Second => volume.indir2.blkno(),
    };

    if resident != Some(blkno) {
        // The cache is marked empty while the read is in flight, so a
        // failed read cannot leave a stale block looking resident.
        let mut buf = match level {
            CacheLevel::First => volume.indir1.take_buf(),
            CacheLevel::Second => volume.indir2.take_buf(),
        };
        let res = volume.read_fs_block(block_io, blkno, &mut buf);
        let cache = match level {
            CacheLevel::First => &mut volume.indir1,
            CacheLevel::Second => &mut volume.indir2,
        };
        match res {
            Ok(()) => cache.fill(blkno, buf),
            Err(e) => {
                cache.put_buf(buf);
                return Err(e);
            }
        }
    }

    let cache = match level {
        CacheLevel::First => &volume.indir1,
        CacheLevel::Second => &volume.indir2,
    };
    Ok(le32(cache.data(), (slot * 4) as usize))
}
