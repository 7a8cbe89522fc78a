//! The platform firmware seam
//!
//! Everything the loader wants from the world goes through the
//! [`Firmware`] trait: device access, memory claims, the console, named
//! properties, the Forth interpreter and the final jump into the kernel.
//! [`OpenFirmware`] is the real client-interface implementation; tests
//! drive the loader with a scripted mock instead.

use crate::error::{Error, Result};

/// Opaque firmware device handle (an ihandle on real firmware).
pub type DevHandle = u32;

/// A firmware-claimed physical memory range.
///
/// `base` is the physical address the range was claimed at; `mem` is the
/// loader's view of it. The two coincide on real hardware, where memory
/// is identity-mapped for us; mocks back `mem` with ordinary allocations
/// and the loader never assumes otherwise.
pub struct Region {
    /// Claimed physical base address
    pub base: u32,
    /// The bytes of the range
    pub mem: &'static mut [u8],
}

impl Region {
    /// Length of the range.
    pub fn len(&self) -> u32 {
        self.mem.len() as u32
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    /// Does `addr` fall inside this range?
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.base + self.len()
    }

    /// Big-endian word at physical address `addr`, if in range.
    pub fn word_at(&self, addr: u32) -> Option<u32> {
        if !self.contains(addr) || !self.contains(addr + 3) {
            return None;
        }
        let off = (addr - self.base) as usize;
        Some(u32::from_be_bytes([
            self.mem[off],
            self.mem[off + 1],
            self.mem[off + 2],
            self.mem[off + 3],
        ]))
    }
}

/// Services supplied by the platform firmware.
///
/// Any of these can fail on real machines; the loader propagates typed
/// errors instead of trusting the firmware.
pub trait Firmware {
    /// Open a device by firmware path or alias.
    fn open(&mut self, device: &str) -> Result<DevHandle>;

    /// Close a device handle.
    fn close(&mut self, dev: DevHandle);

    /// Read bytes from a device at a byte offset. Returns the count
    /// actually read, which callers treat as a short read when it is not
    /// what they asked for.
    fn read(&mut self, dev: DevHandle, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Claim physical memory at an exact address.
    fn claim(&mut self, base: u32, len: u32) -> Result<Region>;

    /// Claim physical memory at or above a preferred address, wherever
    /// the firmware finds room.
    fn claim_chunk(&mut self, preferred: u32, len: u32) -> Result<Region>;

    /// Release a claimed range.
    fn release(&mut self, base: u32, len: u32);

    /// Milliseconds since some firmware-defined start.
    fn milliseconds(&mut self) -> u32;

    /// Write text to the console.
    fn console_write(&mut self, s: &str);

    /// Non-blocking console read; `None` when no key is pending.
    fn try_getchar(&mut self) -> Option<u8>;

    /// Blocking console read.
    fn getchar(&mut self) -> u8 {
        loop {
            if let Some(c) = self.try_getchar() {
                return c;
            }
        }
    }

    /// Read a property of /chosen into `buf`, returning its length.
    fn get_chosen(&mut self, name: &str, buf: &mut [u8]) -> usize;

    /// Read a firmware option (NVRAM) into `buf`, returning its length.
    fn get_option(&mut self, name: &str, buf: &mut [u8]) -> usize;

    /// Publish the kernel argument string.
    fn set_bootargs(&mut self, args: &str);

    /// Feed a command string to the firmware interpreter.
    fn interpret(&mut self, source: &str);

    /// Print a message and drop into the firmware prompt until resumed.
    fn pause(&mut self, message: Option<&str>);

    /// Flush instruction and data caches over a range.
    fn flush_cache(&mut self, base: u32, len: u32);

    /// Jump to the kernel. Returning from this call at all means the
    /// kernel handed control back, which is the terminal failure.
    fn transfer(&mut self, entry: u32, initrd_base: u32, initrd_len: u32, shim: bool);

    /// Leave to the firmware permanently.
    fn exit(&mut self) -> !;
}

/// Argument block of one client-interface call.
#[repr(C)]
struct PromArgs {
    service: *const u8,
    nargs: i32,
    nret: i32,
    args: [u32; 10],
}

type PromEntry = unsafe extern "C" fn(*mut PromArgs) -> i32;

/// The real Open Firmware client interface.
pub struct OpenFirmware {
    entry: PromEntry,
    entry_addr: u32,
    shim_addr: u32,
    chosen: u32,
    options: u32,
    stdin: u32,
    stdout: u32,
}

const PROM_ERROR: u32 = u32::MAX;

impl OpenFirmware {
    /// Bind to the firmware entry point handed to the loader, looking up
    /// the nodes and handles everything else needs. Missing /chosen or
    /// /options is fatal: nothing works without them.
    ///
    /// # Safety
    ///
    /// `entry` must be the client-interface entry point this program was
    /// started with, and `shim_addr` (when nonzero) a trampoline with the
    /// same calling convention.
    pub unsafe fn init(entry: PromEntry, entry_addr: u32, shim_addr: u32) -> Result<Self> {
        let mut fw = Self {
            entry,
            entry_addr,
            shim_addr,
            chosen: 0,
            options: 0,
            stdin: 0,
            stdout: 0,
        };

        fw.chosen = fw.call1("finddevice\0", c_arg(b"/chosen\0"));
        fw.options = fw.call1("finddevice\0", c_arg(b"/options\0"));
        if fw.chosen == PROM_ERROR || fw.options == PROM_ERROR {
            return Err(Error::PromInit);
        }

        let mut handle = [0u8; 4];
        if fw.getprop(fw.chosen, b"stdout\0", &mut handle) != 4 {
            return Err(Error::PromInit);
        }
        fw.stdout = u32::from_be_bytes(handle);
        if fw.getprop(fw.chosen, b"stdin\0", &mut handle) != 4 {
            return Err(Error::PromInit);
        }
        fw.stdin = u32::from_be_bytes(handle);

        Ok(fw)
    }

    /// One client-interface call. `args` are the input cells; the first
    /// `nret` cells after them come back as results.
    fn call(&mut self, service: &str, args: &[u32], nret: usize) -> [u32; 4] {
        debug_assert!(service.ends_with('\0'));
        debug_assert!(args.len() + nret <= 10);

        let mut pa = PromArgs {
            service: service.as_ptr(),
            nargs: args.len() as i32,
            nret: nret as i32,
            args: [0; 10],
        };
        pa.args[..args.len()].copy_from_slice(args);

        let rc = unsafe { (self.entry)(&mut pa) };

        let mut ret = [PROM_ERROR; 4];
        if rc >= 0 {
            for (i, slot) in ret.iter_mut().enumerate().take(nret.min(4)) {
                *slot = pa.args[args.len() + i];
            }
        }
        ret
    }

    fn call1(&mut self, service: &str, arg: u32) -> u32 {
        self.call(service, &[arg], 1)[0]
    }

    fn getprop(&mut self, node: u32, name: &[u8], buf: &mut [u8]) -> usize {
        debug_assert!(name.ends_with(b"\0"));
        let len = self.call(
            "getprop\0",
            &[node, c_arg(name), buf.as_ptr() as u32, buf.len() as u32],
            1,
        )[0];
        if len == PROM_ERROR {
            0
        } else {
            (len as usize).min(buf.len())
        }
    }
}

fn c_arg(bytes: &[u8]) -> u32 {
    bytes.as_ptr() as u32
}

impl Firmware for OpenFirmware {
    fn open(&mut self, device: &str) -> Result<DevHandle> {
        let mut name = [0u8; 256];
        let n = device.len().min(255);
        name[..n].copy_from_slice(&device.as_bytes()[..n]);

        let ih = self.call("open\0", &[name.as_ptr() as u32], 1)[0];
        if ih == 0 || ih == PROM_ERROR {
            return Err(Error::DeviceOpen);
        }
        Ok(ih)
    }

    fn close(&mut self, dev: DevHandle) {
        // No return cells, or the close silently does not happen.
        self.call("close\0", &[dev], 0);
    }

    fn read(&mut self, dev: DevHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.call(
            "seek\0",
            &[dev, (offset >> 32) as u32, (offset & 0xFFFF_FFFF) as u32],
            1,
        );

        let n = self.call(
            "read\0",
            &[dev, buf.as_mut_ptr() as u32, buf.len() as u32],
            1,
        )[0];
        if n == PROM_ERROR {
            return Err(Error::ShortRead);
        }
        Ok(n as usize)
    }

    fn claim(&mut self, base: u32, len: u32) -> Result<Region> {
        let got = self.call("claim\0", &[base, len, 0], 1)[0];
        if got == PROM_ERROR {
            return Err(Error::NoMem);
        }
        let mem = unsafe { core::slice::from_raw_parts_mut(got as *mut u8, len as usize) };
        Ok(Region { base: got, mem })
    }

    fn claim_chunk(&mut self, preferred: u32, len: u32) -> Result<Region> {
        // Walk upward in 1 MiB steps until the firmware accepts a range.
        const STEP: u32 = 0x10_0000;
        let mut base = preferred;
        loop {
            if let Ok(region) = self.claim(base, len) {
                return Ok(region);
            }
            base = match base.checked_add(STEP) {
                Some(b) => b,
                None => return Err(Error::NoMem),
            };
        }
    }

    fn release(&mut self, base: u32, len: u32) {
        self.call("release\0", &[base, len], 0);
    }

    fn milliseconds(&mut self) -> u32 {
        self.call("milliseconds\0", &[], 1)[0]
    }

    fn console_write(&mut self, s: &str) {
        // The firmware console wants \r\n line ends.
        for chunk in s.split_inclusive('\n') {
            let (body, nl) = match chunk.strip_suffix('\n') {
                Some(body) => (body, true),
                None => (chunk, false),
            };
            if !body.is_empty() {
                self.call(
                    "write\0",
                    &[self.stdout, body.as_ptr() as u32, body.len() as u32],
                    1,
                );
            }
            if nl {
                self.call(
                    "write\0",
                    &[self.stdout, b"\r\n".as_ptr() as u32, 2],
                    1,
                );
            }
        }
    }

    fn try_getchar(&mut self) -> Option<u8> {
        let mut ch = 0u8;
        let n = self.call(
            "read\0",
            &[self.stdin, (&mut ch as *mut u8) as u32, 1],
            1,
        )[0];
        if n == 1 {
            Some(ch)
        } else {
            None
        }
    }

    fn get_chosen(&mut self, name: &str, buf: &mut [u8]) -> usize {
        let mut prop = [0u8; 32];
        let n = name.len().min(31);
        prop[..n].copy_from_slice(&name.as_bytes()[..n]);
        let chosen = self.chosen;
        self.getprop(chosen, &prop[..n + 1], buf)
    }

    fn get_option(&mut self, name: &str, buf: &mut [u8]) -> usize {
        let mut prop = [0u8; 32];
        let n = name.len().min(31);
        prop[..n].copy_from_slice(&name.as_bytes()[..n]);
        let options = self.options;
        self.getprop(options, &prop[..n + 1], buf)
    }

    fn set_bootargs(&mut self, args: &str) {
        // The stored property value must include its NUL terminator.
        let mut buf = [0u8; 512];
        let n = args.len().min(511);
        buf[..n].copy_from_slice(&args.as_bytes()[..n]);

        let chosen = self.chosen;
        self.call(
            "setprop\0",
            &[
                chosen,
                c_arg(b"bootargs\0"),
                buf.as_ptr() as u32,
                n as u32 + 1,
            ],
            1,
        );
    }

    fn interpret(&mut self, source: &str) {
        let mut buf = [0u8; 512];
        let n = source.len().min(511);
        buf[..n].copy_from_slice(&source.as_bytes()[..n]);
        self.call("interpret\0", &[buf.as_ptr() as u32], 1);
    }

    fn pause(&mut self, message: Option<&str>) {
        self.console_write(message.unwrap_or("Type go<return> to continue.\n"));
        self.call("enter\0", &[], 0);
        self.console_write("\n");
    }

    fn flush_cache(&mut self, base: u32, len: u32) {
        #[cfg(target_arch = "powerpc")]
        unsafe {
            let mut addr = base & !31;
            let end = base.wrapping_add(len);
            while addr < end {
                core::arch::asm!(
                    "dcbst 0, {0}",
                    "sync",
                    "icbi 0, {0}",
                    in(reg) addr,
                );
                addr = addr.wrapping_add(32);
            }
            core::arch::asm!("sync", "isync");
        }
        #[cfg(not(target_arch = "powerpc"))]
        {
            let _ = (base, len);
        }
    }

    fn transfer(&mut self, entry: u32, initrd_base: u32, initrd_len: u32, shim: bool) {
        let prom = if shim && self.shim_addr != 0 {
            self.shim_addr
        } else {
            self.entry_addr
        };

        let kernel: extern "C" fn(u32, u32, u32, u32, u32) =
            unsafe { core::mem::transmute(entry as usize) };
        kernel(initrd_base, initrd_len, prom, 0, 0);
    }

    fn exit(&mut self) -> ! {
        self.call("exit\0", &[], 0);
        // The firmware should not give exit back to us.
        loop {
            core::hint::spin_loop();
        }
    }
}
