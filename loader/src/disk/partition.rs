//! Partition table parsing
//!
//! Two on-disk schemes are probed in order: the Macintosh partition map,
//! then the DOS MBR. Each scheme failing with its own "not this scheme"
//! error is what lets the caller chain to the next one.

use super::SECTOR_SIZE;
use crate::error::{Error, Result};
use bitflags::bitflags;
use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;
use log::debug;

/// Magic of the driver descriptor in sector 0 ("ER").
const MAC_DRIVER_MAGIC: u16 = 0x4552;

/// Magic of each Mac partition map entry ("PM").
const MAC_PARTITION_MAGIC: u16 = 0x504D;

/// Processor name a bootable Mac partition must declare.
const ARCH_NAME: &str = "PowerPC";

/// Offset of the four MBR partition records.
const DOS_TABLE_OFFSET: usize = 0x1BE;

/// Size of one MBR partition record.
const DOS_RECORD_SIZE: usize = 16;

bitflags! {
    /// Status bits of a Mac partition map entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MacStatus: u32 {
        /// Partition is valid
        const VALID = 1 << 0;
        /// Partition is allocated
        const ALLOCATED = 1 << 1;
        /// Partition is bootable
        const BOOTABLE = 1 << 3;
    }
}

/// A resolved partition: its byte range on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// Byte offset of the partition start
    pub start: u64,
    /// Byte length of the partition
    pub len: u64,
}

impl Partition {
    /// Partition start in 512-byte sectors.
    pub fn start_lba(&self) -> u64 {
        self.start / SECTOR_SIZE as u64
    }

    /// Partition length in 512-byte sectors.
    pub fn sectors(&self) -> u64 {
        self.len / SECTOR_SIZE as u64
    }
}

/// Locate a partition on a device.
///
/// `index` is 1-based within the scheme's table order; 0 selects the
/// first bootable partition (Mac: bootable status plus a matching
/// processor string; DOS: the active flag).
pub fn resolve<B: BlockIo>(block_io: &mut B, index: u32) -> Result<Partition> {
    match read_mac_partition(block_io, index) {
        Err(Error::PartNotMac) => {}
        other => return other,
    }

    match read_dos_partition(block_io, index) {
        Err(Error::PartNotDos) => Err(Error::PartNotPartitioned),
        other => other,
    }
}

fn read_sector<B: BlockIo>(block_io: &mut B, lba: u64, buf: &mut [u8]) -> Result<()> {
    block_io
        .read_blocks(Lba(lba), buf)
        .map_err(|_| Error::ShortRead)
}

fn be16(raw: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([raw[off], raw[off + 1]])
}

fn be32(raw: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]])
}

fn le32(raw: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]])
}

/// NUL-padded fixed-size string field.
fn fixed_str(raw: &[u8]) -> &str {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    core::str::from_utf8(&raw[..end]).unwrap_or("")
}

/// Walk a Macintosh partition map.
///
/// Sector 0 carries the driver descriptor (magic plus the map's block
/// size); map entries follow, one per block, starting at block 1. The
/// first entry declares how many entries the map has; an entry whose own
/// declared count disagrees aborts the walk.
fn read_mac_partition<B: BlockIo>(block_io: &mut B, index: u32) -> Result<Partition> {
    let mut blk = [0u8; SECTOR_SIZE];
    read_sector(block_io, 0, &mut blk)?;

    if be16(&blk, 0) != MAC_DRIVER_MAGIC {
        return Err(Error::PartNotMac);
    }
    let secsize = u64::from(be16(&blk, 2));

    let mut blocks_in_map = 1u32;
    let mut seen = 0u32;
    let mut i = 1u32;
    while i <= blocks_in_map {
        read_sector(block_io, u64::from(i) * secsize / SECTOR_SIZE as u64, &mut blk)?;

        if be16(&blk, 0) != MAC_PARTITION_MAGIC {
            break;
        }

        let map_count = be32(&blk, 4);
        if i == 1 {
            blocks_in_map = map_count;
        } else if map_count != blocks_in_map {
            // Inconsistent map; give up on the walk, not the boot.
            debug!("mac map entry {} declares {} entries, expected {}", i, map_count, blocks_in_map);
            break;
        }

        seen += 1;

        let status = MacStatus::from_bits_truncate(be32(&blk, 88));
        let processor = fixed_str(&blk[120..136]);
        let wanted = index == seen
            || (index == 0
                && status.contains(MacStatus::BOOTABLE)
                && processor.eq_ignore_ascii_case(ARCH_NAME));

        if wanted {
            return Ok(Partition {
                start: u64::from(be32(&blk, 8)) * secsize,
                len: u64::from(be32(&blk, 12)) * secsize,
            });
        }

        i += 1;
    }

    Err(Error::PartNotFound)
}

/// Read one record of a DOS MBR.
///
/// Indices 1..=3 address the table records directly; 0 scans for the
/// active flag. Nothing past the four on-disk records is ever read.
fn read_dos_partition<B: BlockIo>(block_io: &mut B, index: u32) -> Result<Partition> {
    let mut blk = [0u8; SECTOR_SIZE];
    read_sector(block_io, 0, &mut blk)?;

    if blk[0x1FE] != 0x55 || blk[0x1FF] != 0xAA {
        return Err(Error::PartNotDos);
    }

    if index >= 4 {
        return Err(Error::PartNotFound);
    }

    let record = |slot: usize| {
        let at = DOS_TABLE_OFFSET + slot * DOS_RECORD_SIZE;
        &blk[at..at + DOS_RECORD_SIZE]
    };

    let slot = if index == 0 {
        let mut active = None;
        for i in 0..4 {
            if record(i)[0] == 0x80 {
                active = Some(i);
                break;
            }
        }
        active.ok_or(Error::PartNotFound)?
    } else {
        (index - 1) as usize
    };

    let rec = record(slot);
    Ok(Partition {
        start: u64::from(le32(rec, 8)) * SECTOR_SIZE as u64,
        len: u64::from(le32(rec, 12)) * SECTOR_SIZE as u64,
    })
}
