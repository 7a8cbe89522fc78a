//! ELF image handling
//!
//! The target profile is fixed: 32-bit, big-endian. Parsing normalizes
//! the image into a [`LoadState`]; relocation either moves the bytes to
//! their linked origin (legacy kernels) or re-anchors the entry to
//! wherever the image already sits; hand-off resolves the entry through
//! the firmware loader's procedure-descriptor convention and jumps.

use crate::console::cprintln;
use crate::error::{Error, Result};
use crate::prom::{Firmware, Region};
use log::debug;

/// Legacy addressing convention: the top nibble of linked addresses is
/// cleared before use.
const ADDR_MASK: u32 = 0x0FFF_FFFF;

/// "New boot strategy" sentinel: a ppc `nop` at the entry word.
const NEW_BOOT_SENTINEL: u32 = 0x6000_0000;

const PT_LOAD: u32 = 1;

/// A parsed, loaded kernel image.
pub struct LoadState {
    /// The claimed range holding the image (after legacy relocation, the
    /// copy at the fixed origin)
    pub region: Region,
    /// Offset of the loadable segment within the original buffer
    pub text_offset: u32,
    /// Length of the loadable segment
    pub text_len: u32,
    /// Address the segment was linked at (top nibble cleared)
    pub linked_base: u32,
    /// Entry point (top nibble cleared)
    pub entry: u32,
}

fn be16(raw: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([raw[off], raw[off + 1]])
}

fn be32(raw: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]])
}

/// Parse an in-memory ELF image.
///
/// `len` is how many bytes were actually read into the region; the
/// computed segment length is clamped so it never claims more than that.
/// Distinct errors separate "not ELF at all" from "ELF for some other
/// machine".
pub fn parse(region: Region, len: u32) -> Result<LoadState> {
    let buf = &region.mem[..];
    if buf.len() < 52 || len < 52 {
        return Err(Error::ElfNot);
    }

    if buf[0..4] != [0x7F, b'E', b'L', b'F'] {
        return Err(Error::ElfNot);
    }

    // EI_CLASS must be ELFCLASS32, EI_DATA must be big-endian
    if buf[4] != 1 || buf[5] != 2 {
        return Err(Error::ElfWrong);
    }

    let e_entry = be32(buf, 24);
    let e_phoff = be32(buf, 28) as usize;
    let e_phnum = be16(buf, 44) as usize;
    const PHDR_SIZE: usize = 32;

    let mut text_offset = 0u32;
    let mut text_len = 0u32;
    let mut linked_base = 0u32;

    for i in 0..e_phnum {
        let at = e_phoff + i * PHDR_SIZE;
        if at + PHDR_SIZE > buf.len() {
            break;
        }
        let ph = &buf[at..at + PHDR_SIZE];

        let p_type = be32(ph, 0);
        let p_offset = be32(ph, 4);
        let p_vaddr = be32(ph, 8);
        let p_filesz = be32(ph, 16);

        if p_type != PT_LOAD || p_offset == 0 {
            continue;
        }

        if text_len == 0 {
            // First loadable entry fixes the segment start
            text_offset = p_offset;
            text_len = p_filesz;
            linked_base = p_vaddr & ADDR_MASK;
        } else {
            // Later entries extend it
            text_len = p_offset.saturating_add(p_filesz).saturating_sub(text_offset);
        }
    }

    if text_len == 0 {
        return Err(Error::ElfNotLoadable);
    }

    // Never claim more bytes than were read
    if text_offset >= len {
        return Err(Error::ElfNotLoadable);
    }
    if text_len > len - text_offset {
        text_len = len - text_offset;
    }

    let entry = e_entry & ADDR_MASK;
    debug!(
        "elf: text 0x{:x}+0x{:x} linked 0x{:x} entry 0x{:x}",
        text_offset, text_len, linked_base, entry
    );

    Ok(LoadState {
        region,
        text_offset,
        text_len,
        linked_base,
        entry,
    })
}

/// Fix the image up for its kernel generation.
///
/// Legacy kernels must execute from their linked physical origin, so the
/// segment bytes are moved there and the caches flushed. Newer kernels
/// run wherever they were loaded: the entry is recomputed as an offset
/// from the old linked base and the base re-anchored to the actual
/// segment position.
pub fn relocate<F: Firmware>(fw: &mut F, legacy: bool, image: &mut LoadState) -> Result<()> {
    if legacy {
        let mut dest = fw.claim(image.linked_base, image.text_len)?;
        let from = image.text_offset as usize;
        dest.mem
            .copy_from_slice(&image.region.mem[from..from + image.text_len as usize]);
        image.region = dest;
    } else {
        image.entry = image.entry.wrapping_sub(image.linked_base);
        image.linked_base = image.region.base + image.text_offset;
        image.entry = image.entry.wrapping_add(image.linked_base);
    }

    fw.flush_cache(image.linked_base, image.text_len);
    Ok(())
}

/// Hand control to the kernel.
///
/// The entry address may really be a procedure descriptor left over from
/// the firmware's own loader: a sentinel word means the new boot
/// strategy (enter at the linked base); a word pointing inside the
/// segment with a zero third descriptor word is the descriptor's code
/// address; anything else is treated as a direct entry and offset by the
/// entry address. Inherited platform behavior, kept branch for branch.
///
/// Returning from here at all is the terminal failure.
pub fn boot<F: Firmware>(
    fw: &mut F,
    image: &LoadState,
    initrd_base: u32,
    initrd_len: u32,
    shim: bool,
    params: &str,
) -> Error {
    let Some(mut start) = image.region.word_at(image.entry) else {
        return Error::ElfNotLoadable;
    };

    if start == NEW_BOOT_SENTINEL {
        start = image.linked_base;
    } else {
        let third = image.region.word_at(image.entry + 8);
        let in_segment =
            start >= image.linked_base && start < image.linked_base + image.text_len;
        if !in_segment || third != Some(0) {
            // Not a descriptor: direct code address, offset by entry
            start = start.wrapping_add(image.entry);
        }
    }

    cprintln!(fw, "Starting at 0x{:x}", start);
    fw.set_bootargs(params);
    fw.transfer(start, initrd_base, initrd_len, shim);

    Error::KernelReturned
}
