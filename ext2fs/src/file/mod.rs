//! Block-mapped file reads

pub mod block_map;

use crate::error::Result;
use crate::inode::Node;
use crate::volume::Volume;
use gpt_disk_io::BlockIo;

/// Read file data starting at byte `pos`.
///
/// The read is clamped to the inode-declared size; the number of bytes
/// actually produced is returned and may be shorter than `buf`. Holes
/// (zero block pointers) are filled with zero bytes instead of being read
/// from the device.
pub fn read_at<B: BlockIo>(
    block_io: &mut B,
    volume: &mut Volume,
    node: &mut Node,
    pos: u32,
    buf: &mut [u8],
) -> Result<usize> {
    let inode = node.inode(volume, block_io)?.clone();

    let avail = inode.size.saturating_sub(pos);
    let len = (buf.len() as u64).min(u64::from(avail)) as usize;
    if len == 0 {
        return Ok(0);
    }

    let block_size = volume.superblock().block_size();
    let log_spb = volume.superblock().log_sectors_per_block();

    let first = pos / block_size;
    let last = (pos + len as u32 - 1) / block_size;

    let mut written = 0usize;
    for index in first..=last {
        let begin = if index == first { pos % block_size } else { 0 };
        let end = if index == last {
            (pos + len as u32 - 1) % block_size + 1
        } else {
            block_size
        };
        let chunk = &mut buf[written..written + (end - begin) as usize];

        let blknr = block_map::file_block(block_io, volume, &inode, index)?;
        if blknr == 0 {
            chunk.fill(0);
        } else {
            volume.read_raw(
                block_io,
                u64::from(blknr) << log_spb,
                begin as usize,
                chunk,
            )?;
        }

        written += chunk.len();
    }

    Ok(len)
}
