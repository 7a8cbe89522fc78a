//! Second-stage Open Firmware bootstrap
//!
//! Given control from the firmware, this crate finds a kernel (and
//! optional initrd) on a raw disk, pulls it out of an ext2 volume,
//! parses the ELF container, relocates it and jumps, publishing the
//! assembled argument string on the way out.
//!
//! The crate is a library: the bare-metal image build supplies the link
//! layout and an assembly stub that binds the firmware entry point,
//! initializes the heap from a claimed range, and calls [`boot_main`].
//! Everything the loader wants from the platform goes through the
//! [`prom::Firmware`] trait, which is also how the test suite drives it.

#![no_std]

extern crate alloc;

pub mod cmdline;
pub mod commands;
pub mod config;
pub mod console;
pub mod disk;
pub mod elf;
pub mod engine;
pub mod env;
pub mod error;
pub mod file;
pub mod heap;
pub mod logger;
pub mod path;
pub mod prom;
pub mod util;

pub use env::{BootContext, BootFlags};
pub use error::{Error, Result};
pub use path::PathSpec;
pub use prom::Firmware;

use crate::console::cprintln;

/// Entry point, called by the firmware glue once the heap is live.
///
/// `with_preboot` records that a preboot script ran before the loader,
/// which changes where the boot device spec is looked for. Never
/// returns: control either transfers to a kernel or falls back to the
/// firmware.
pub fn boot_main<F: Firmware>(fw: &mut F, with_preboot: bool) -> ! {
    logger::init();

    let mut ctx = BootContext::new(with_preboot);
    cprintln!(fw, "OFBoot {}", env!("CARGO_PKG_VERSION"));

    let err = engine::run(fw, &mut ctx);
    cprintln!(fw, "{}", err);
    fw.exit()
}
