//! Device access
//!
//! Firmware device handles are byte-addressed; the rest of the loader
//! talks [`gpt_disk_io::BlockIo`] in whole 512-byte sectors. [`FwDisk`]
//! bridges the two, borrowing the firmware for the duration of one
//! operation.

pub mod partition;

use crate::error::{Error, Result};
use crate::prom::{DevHandle, Firmware};
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

/// Device sector size used for all block I/O.
pub const SECTOR_SIZE: usize = 512;

/// A firmware device handle viewed as a block device.
pub struct FwDisk<'a, F: Firmware> {
    fw: &'a mut F,
    dev: DevHandle,
}

impl<'a, F: Firmware> FwDisk<'a, F> {
    /// Wrap an open firmware handle.
    pub fn new(fw: &'a mut F, dev: DevHandle) -> Self {
        Self { fw, dev }
    }
}

/// Open a device by name.
pub fn open<F: Firmware>(fw: &mut F, device: &str) -> Result<DevHandle> {
    fw.open(device)
}

/// Close a device handle.
pub fn close<F: Firmware>(fw: &mut F, dev: DevHandle) {
    fw.close(dev);
}

impl<F: Firmware> BlockIo for FwDisk<'_, F> {
    type Error = Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> core::result::Result<u64, Self::Error> {
        // The firmware does not report a size; out-of-range reads fail at
        // the device instead.
        Ok(u64::MAX)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> core::result::Result<(), Self::Error> {
        let offset = start_lba.0 * SECTOR_SIZE as u64;
        let n = self.fw.read(self.dev, offset, dst)?;
        if n != dst.len() {
            return Err(Error::ShortRead);
        }
        Ok(())
    }

    fn write_blocks(&mut self, _start_lba: Lba, _src: &[u8]) -> core::result::Result<(), Self::Error> {
        // The boot medium is never written.
        Err(Error::ShortRead)
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}
