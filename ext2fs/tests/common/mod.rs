//! Common test utilities and mock block devices

pub mod builder;
pub use builder::Ext2Builder;

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};
use std::io;

pub const SECTOR_SIZE: usize = 512;

/// In-memory block device for testing
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Vec<u8>,
}

impl MemoryBlockDevice {
    /// Create a new memory block device from raw data
    pub fn new(mut data: Vec<u8>) -> Self {
        // Pad to a whole number of sectors
        let rem = data.len() % SECTOR_SIZE;
        if rem != 0 {
            data.resize(data.len() + SECTOR_SIZE - rem, 0);
        }
        Self { data }
    }

    /// Wrap a filesystem image so it starts `offset_sectors` into the
    /// device, the way a partitioned disk would present it.
    pub fn with_offset(image: Vec<u8>, offset_sectors: u64) -> Self {
        let mut data = vec![0u8; offset_sectors as usize * SECTOR_SIZE];
        data.extend_from_slice(&image);
        Self::new(data)
    }

    /// Device size in sectors
    pub fn sectors(&self) -> u64 {
        (self.data.len() / SECTOR_SIZE) as u64
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok((self.data.len() / SECTOR_SIZE) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * SECTOR_SIZE;
        if offset + dst.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * SECTOR_SIZE;
        if offset + src.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write beyond end of device",
            ));
        }
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
