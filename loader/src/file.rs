//! Files on partitioned devices
//!
//! Glue between path specifications and the filesystem reader. One
//! volume is mounted at a time; asking for the same device and partition
//! again is a no-op, asking for a different one tears the old mount down
//! first.

use crate::console::Spinner;
use crate::disk::{partition, FwDisk};
use crate::error::{Error, Result};
use crate::path::PathSpec;
use crate::prom::{DevHandle, Firmware};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use ext2fs::{DirEntry, FileKind, Volume};
use log::debug;

/// Spinner cadence during long loads.
const CHUNK: usize = 64 * 1024;

struct Mounted {
    device: String,
    part_index: u32,
    dev: DevHandle,
    volume: Volume,
}

/// The loader's view of "the mounted filesystem".
pub struct FileSystem {
    state: Option<Mounted>,
}

impl FileSystem {
    /// Nothing mounted yet.
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Make sure `device`/`part_index` is the mounted volume.
    ///
    /// Same pair: nothing happens. Different pair: the previous mount is
    /// closed, the partition resolved (Mac map first, then DOS), and the
    /// filesystem mounted.
    pub fn open<F: Firmware>(&mut self, fw: &mut F, device: &str, part_index: u32) -> Result<()> {
        if let Some(m) = &self.state {
            if m.device == device && m.part_index == part_index {
                return Ok(());
            }
        }
        self.close(fw);

        let dev = fw.open(device)?;
        let mounted = (|| -> Result<Mounted> {
            let part = partition::resolve(&mut FwDisk::new(fw, dev), part_index)?;
            debug!(
                "partition {} on {} at 0x{:x}+0x{:x}",
                part_index, device, part.start, part.len
            );
            let volume = ext2fs::mount(&mut FwDisk::new(fw, dev), part.start_lba(), part.sectors())?;
            Ok(Mounted {
                device: device.to_string(),
                part_index,
                dev,
                volume,
            })
        })();

        match mounted {
            Ok(m) => {
                self.state = Some(m);
                Ok(())
            }
            Err(e) => {
                fw.close(dev);
                Err(e)
            }
        }
    }

    /// Unmount and close the device, if anything is open.
    pub fn close<F: Firmware>(&mut self, fw: &mut F) {
        if let Some(m) = self.state.take() {
            fw.close(m.dev);
        }
    }

    /// Size of the file a spec points at.
    pub fn len<F: Firmware>(&mut self, fw: &mut F, spec: &PathSpec) -> Result<u32> {
        self.open(fw, &spec.device, spec.part)?;
        let m = self.state.as_mut().ok_or(Error::FsNotFound)?;
        let mut disk = FwDisk::new(fw, m.dev);
        let mut node = ext2fs::lookup(&mut disk, &mut m.volume, &spec.path, FileKind::Regular)?;
        Ok(node.size(&m.volume, &mut disk)?)
    }

    /// Load a whole file into `buf`, which must be at least as large as
    /// the file. Ticks a progress spinner between chunks.
    pub fn load<F: Firmware>(&mut self, fw: &mut F, spec: &PathSpec, buf: &mut [u8]) -> Result<u32> {
        self.open(fw, &spec.device, spec.part)?;
        let m = self.state.as_mut().ok_or(Error::FsNotFound)?;

        let (mut node, size) = {
            let mut disk = FwDisk::new(fw, m.dev);
            let mut node =
                ext2fs::lookup(&mut disk, &mut m.volume, &spec.path, FileKind::Regular)?;
            let size = node.size(&m.volume, &mut disk)?;
            (node, size)
        };
        if buf.len() < size as usize {
            return Err(Error::FsTooBig);
        }

        let mut spinner = Spinner::new();
        let mut pos = 0usize;
        while pos < size as usize {
            let end = (pos + CHUNK).min(size as usize);
            {
                let mut disk = FwDisk::new(fw, m.dev);
                ext2fs::read_at(
                    &mut disk,
                    &mut m.volume,
                    &mut node,
                    pos as u32,
                    &mut buf[pos..end],
                )?;
            }
            spinner.tick(fw);
            pos = end;
        }
        spinner.finish(fw);

        Ok(size)
    }

    /// List the directory a spec points at.
    pub fn list<F: Firmware>(&mut self, fw: &mut F, spec: &PathSpec) -> Result<Vec<DirEntry>> {
        self.open(fw, &spec.device, spec.part)?;
        let m = self.state.as_mut().ok_or(Error::FsNotFound)?;
        let mut disk = FwDisk::new(fw, m.dev);
        Ok(ext2fs::read_dir(&mut disk, &mut m.volume, &spec.path)?)
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}
