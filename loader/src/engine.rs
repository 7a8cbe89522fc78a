//! The boot decision loop
//!
//! Orchestrates everything between entry and hand-off: environment
//! bootstrap, configuration discovery, the timed prompt, bang-command
//! dispatch, parameter assembly, and the load-parse-relocate-jump
//! sequence. Any load failure loops back to the prompt; the loop only
//! ends by transferring control away.

use crate::cmdline;
use crate::commands;
use crate::config::Config;
use crate::console::{cprint, cprintln};
use crate::elf::{self, LoadState};
use crate::env::{self, BootContext, BootFlags};
use crate::error::{Error, Result};
use crate::file::FileSystem;
use crate::logger;
use crate::path::{self, PathSpec};
use crate::prom::{Firmware, Region};
use crate::util::{parse_int, word_split};
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

/// The interactive prompt.
pub const PROMPT: &str = "boot: ";

/// Where kernel images are claimed, comfortably above the loader itself.
const LOAD_BASE: u32 = 0x0080_0000;

/// Well-known configuration file locations, tried after the path named
/// in the boot device spec.
const CONFIG_ATTEMPTS: &[&str] = &["/boot/ofboot.conf", "/boot/quik.conf", "/quik.conf"];

/// Everything the prompt round decided on.
struct Chosen {
    kernel: String,
    initrd: Option<String>,
    params: String,
    device: String,
    part: u32,
}

/// Run the whole boot sequence.
///
/// Returns only on a failure there is no recovery from; everything
/// recoverable loops back to the prompt inside.
pub fn run<F: Firmware>(fw: &mut F, ctx: &mut BootContext) -> Error {
    let mut fs = FileSystem::new();

    // A bad environment is not fatal: the prompt can still name a full
    // device:partition/path spec by hand.
    if let Err(e) = env::init(fw, ctx) {
        cprintln!(fw, "Environment: {}", e);
    }
    load_config(fw, ctx, &mut fs);

    let (mut image, params) = loop {
        // Failures were already reported where they happened.
        if let Ok(loaded) = try_load(fw, ctx, &mut fs) {
            break loaded;
        }
    };

    let legacy = ctx.flags.contains(BootFlags::OLD_KERNEL);
    if let Err(e) = elf::relocate(fw, legacy, &mut image) {
        cprintln!(fw, "Error relocating kernel: {}", e);
        return e;
    }

    if legacy && ctx.flags.contains(BootFlags::SHIM_OF) {
        cprintln!(fw, "Firmware shimming is unsupported for old kernels");
        ctx.flags.remove(BootFlags::SHIM_OF);
    }

    if ctx.flags.contains(BootFlags::DEBUG_BEFORE_BOOT) {
        if legacy {
            cprintln!(fw, "Booting an old kernel");
        }
        cprintln!(fw, "Kernel: 0x{:x} @ 0x{:x}", image.text_len, image.linked_base);
        cprintln!(fw, "Initrd: 0x{:x} @ 0x{:x}", ctx.initrd_len, ctx.initrd_base);
        cprintln!(fw, "Kernel parameters: {}", params);
        cprintln!(fw, "Kernel entry: 0x{:x}", image.entry);
        for line in logger::snapshot() {
            cprintln!(fw, "{}", line);
        }
        fw.pause(None);
    } else if ctx.flags.contains(BootFlags::PAUSE_BEFORE_BOOT) {
        fw.pause(ctx.pause_message.as_deref());
    }

    let shim = ctx.flags.contains(BootFlags::SHIM_OF);
    elf::boot(fw, &image, ctx.initrd_base, ctx.initrd_len, shim, &params)
}

/// Find, load and apply the configuration file.
///
/// A missing candidate falls through to the next; only a read or parse
/// error of a file that was actually found gets reported. No usable
/// default device means no configuration, which is not an error either.
fn load_config<F: Firmware>(fw: &mut F, ctx: &mut BootContext, fs: &mut FileSystem) {
    if ctx.default_dev.validate().is_err() {
        cprintln!(fw, "Skipping configuration file: no usable device and partition");
        return;
    }
    let device = ctx.default_dev.device().unwrap_or_default().to_string();
    let part = ctx.default_dev.part;

    let mut candidates: Vec<String> = vec![ctx.config_file.clone()];
    for c in CONFIG_ATTEMPTS {
        if *c != ctx.config_file {
            candidates.push((*c).to_string());
        }
    }

    let mut found = None;
    for candidate in &candidates {
        let spec = PathSpec {
            device: device.clone(),
            part,
            path: candidate.clone(),
        };
        cprintln!(fw, "Trying configuration file @ '{}'", spec);
        if let Ok(len) = fs.len(fw, &spec) {
            found = Some((spec, len));
            break;
        }
    }
    let Some((spec, len)) = found else {
        return;
    };

    let mut buf = vec![0u8; len as usize];
    if let Err(e) = fs.load(fw, &spec, &mut buf) {
        cprintln!(fw, "Couldn't load '{}': {}", spec, e);
        return;
    }

    let text = String::from_utf8_lossy(&buf).into_owned();
    match Config::parse(&text) {
        Ok(config) => ctx.config = config,
        Err(_) => {
            cprintln!(fw, "Syntax error in '{}'", spec);
            return;
        }
    }
    ctx.flags.insert(BootFlags::CONFIG_VALID);

    if let Some(code) = ctx.config.get_str(None, "init-code").map(str::to_string) {
        fw.interpret(&code);
    }
    if let Some(msg) = ctx.config.get_str(None, "init-message") {
        cprintln!(fw, "{}", msg);
    }

    if let Some(dev) = ctx.config.get_str(None, "device").map(str::to_string) {
        ctx.default_dev.device = Some(dev);
    }
    if let Some(p) = ctx.config.get_str(None, "partition") {
        if let Some((n, rest)) = parse_int(p) {
            if rest.is_empty() {
                ctx.default_dev.part = n;
            }
        }
    }
    if let Some(msg) = ctx.config.get_str(None, "pause-message").map(str::to_string) {
        ctx.pause_message = Some(msg);
    }

    if let Some(banner) = ctx.config.get_str(None, "message").map(str::to_string) {
        commands::show_file(fw, ctx, fs, &banner);
    }
}

/// Poll for a keypress for `tenths` tenths of a second.
fn wait_for_key<F: Firmware>(fw: &mut F, tenths: u32) -> Option<u8> {
    let end = fw.milliseconds().wrapping_add(tenths.saturating_mul(100));
    loop {
        if let Some(key) = fw.try_getchar() {
            return Some(key);
        }
        if fw.milliseconds() > end {
            return None;
        }
    }
}

/// One round of the prompt: decide what to load and with which
/// arguments.
///
/// The first round consumes the firmware-passed arguments: a named
/// kernel boots immediately, otherwise the configured default arms the
/// countdown. Expiry or a bare return accepts the default; any other key
/// drops into the line editor. Bang lines are dispatched as commands and
/// re-prompt.
fn get_params<F: Firmware>(
    fw: &mut F,
    ctx: &mut BootContext,
    fs: &mut FileSystem,
) -> Result<Chosen> {
    let mut device = ctx.default_dev.device().unwrap_or_default().to_string();
    let mut part = ctx.default_dev.part;
    let mut kernel: Option<String> = None;
    let mut initrd: Option<String> = None;
    let mut params = String::new();

    // No timeout means the prompt waits for the user.
    let mut timeout: Option<u32> = None;

    if !ctx.flags.contains(BootFlags::TRIED_AUTO) {
        ctx.flags.insert(BootFlags::TRIED_AUTO);

        let (first, rest) = word_split(&ctx.bootargs);
        match first {
            Some(k) => {
                // The firmware named a kernel; boot it immediately.
                kernel = Some(k.to_string());
                params = rest.to_string();
                timeout = Some(0);
            }
            None => {
                kernel = ctx.config.default_image().map(str::to_string);
                if ctx.flags.contains(BootFlags::CONFIG_VALID) {
                    if let Some(t) = ctx.config.get_str(None, "timeout") {
                        if let Some((tenths, _)) = parse_int(t) {
                            timeout = Some(tenths);
                        }
                    }
                }
            }
        }
    }

    cprint!(fw, "{}", PROMPT);

    let mut key = None;
    let mut accept_default = false;
    if let Some(tenths) = timeout {
        if tenths > 0 {
            key = wait_for_key(fw, tenths);
        }
        if key.is_none() || key == Some(b'\r') {
            key = None;
            accept_default = true;
        }
    }

    if accept_default {
        if let Some(k) = &kernel {
            cprint!(fw, "{}", k);
            if !params.is_empty() {
                cprint!(fw, " {}", params);
            }
        }
        cprintln!(fw);
    } else {
        kernel = None;

        let line = {
            let config = &ctx.config;
            let config_valid = ctx.flags.contains(BootFlags::CONFIG_VALID);
            cmdline::edit(fw, key, |fw, sofar| {
                if config_valid {
                    cprintln!(fw);
                    for name in config.image_names() {
                        cprint!(fw, "{} ", name);
                    }
                    cprintln!(fw);
                    cprint!(fw, "{}{}", PROMPT, sofar);
                }
            })
        };

        if let Some(command) = line.strip_prefix('!') {
            commands::dispatch(fw, ctx, fs, command);
            return Err(Error::NotReady);
        }

        let (first, rest) = word_split(&line);
        kernel = first.map(str::to_string);
        params = rest.to_string();
    }

    let mut label: Option<String> = None;
    if ctx.flags.contains(BootFlags::CONFIG_VALID) {
        initrd = ctx.config.get_str(None, "initrd").map(str::to_string);

        if let Some(typed) = &kernel {
            if let Some(path) = ctx.config.image_path(typed).map(str::to_string) {
                label = Some(typed.clone());
                kernel = Some(path);
                let lbl = label.as_deref();

                if let Some(dev) = ctx.config.get_str(lbl, "device").map(str::to_string) {
                    device = dev;
                }
                if let Some(p) = ctx.config.get_str(lbl, "partition") {
                    if let Some((n, rest)) = parse_int(p) {
                        if rest.is_empty() {
                            part = n;
                        }
                    }
                }
                if let Some(rd) = ctx.config.get_str(lbl, "initrd").map(str::to_string) {
                    initrd = Some(rd);
                }

                if ctx.config.get_flag(lbl, "old-kernel") {
                    ctx.flags.insert(BootFlags::OLD_KERNEL);
                } else {
                    ctx.flags.remove(BootFlags::OLD_KERNEL);
                }

                params = make_params(ctx, label.as_deref().unwrap_or_default(), &params);
            }
        }
    }

    let Some(kernel) = kernel else {
        cprintln!(fw, "<TAB> for list of bootable images, or !help");
        return Err(Error::NotReady);
    };

    // A hand-typed entry may carry the initrd as the first parameter
    // word; "--" separates plain kernel arguments instead.
    if label.is_none() {
        let rest = params.trim_start().to_string();
        if let Some(args) = rest.strip_prefix("-- ") {
            params = args.to_string();
        } else if rest == "--" {
            params = String::new();
        } else {
            let (first, tail) = word_split(&rest);
            initrd = first.map(str::to_string);
            params = tail.to_string();
        }
    }

    Ok(Chosen {
        kernel,
        initrd,
        params,
        device,
        part,
    })
}

/// Assemble the kernel argument string for a configured image.
///
/// `literal` replaces the whole assembly; otherwise `root`, the
/// read-only/read-write flags, `ramdisk` and `append` build up in that
/// order, with anything the user typed appended last. The pause controls
/// are picked up here as a side effect.
fn make_params(ctx: &mut BootContext, label: &str, user: &str) -> String {
    let lbl = Some(label);
    let mut out = String::new();

    if let Some(literal) = ctx.config.get_str(lbl, "literal") {
        out.push_str(literal);
        if !user.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(user);
        }
        return out;
    }

    if let Some(root) = ctx.config.get_str(lbl, "root") {
        out.push_str("root=");
        out.push_str(root);
        out.push(' ');
    }
    if ctx.config.get_flag(lbl, "read-only") {
        out.push_str("ro ");
    }
    if ctx.config.get_flag(lbl, "read-write") {
        out.push_str("rw ");
    }
    if let Some(ramdisk) = ctx.config.get_str(lbl, "ramdisk") {
        out.push_str("ramdisk=");
        out.push_str(ramdisk);
        out.push(' ');
    }
    if let Some(append) = ctx.config.get_str(lbl, "append") {
        out.push_str(append);
        out.push(' ');
    }

    if ctx.config.get_flag(lbl, "pause-after") {
        ctx.flags.insert(BootFlags::PAUSE_BEFORE_BOOT);
    }
    if let Some(msg) = ctx.config.get_str(lbl, "pause-message").map(str::to_string) {
        ctx.pause_message = Some(msg);
    }

    out.push_str(user);
    out.trim_end().to_string()
}

/// Claim memory for an image and read it in whole.
fn load_image<F: Firmware>(
    fw: &mut F,
    fs: &mut FileSystem,
    path: &PathSpec,
    preferred: u32,
) -> Result<(Region, u32)> {
    cprintln!(fw, "Loading '{}'", path);

    let len = match fs.len(fw, path) {
        Ok(len) => len,
        Err(e) => {
            cprintln!(fw, "Error fetching size for '{}': {}", path, e);
            return Err(e);
        }
    };

    let mut region = match fw.claim_chunk(preferred, len) {
        Ok(region) => region,
        Err(e) => {
            cprintln!(fw, "Couldn't claim 0x{:x} bytes to load '{}'", len, path);
            return Err(e);
        }
    };

    let (base, claimed) = (region.base, region.len());
    match fs.load(fw, path, &mut region.mem[..]) {
        Ok(len) => Ok((region, len)),
        Err(e) => {
            cprintln!(fw, "Error loading '{}': {}", path, e);
            fw.release(base, claimed);
            Err(e)
        }
    }
}

/// One full attempt: prompt, resolve, load kernel and initrd, parse.
fn try_load<F: Firmware>(
    fw: &mut F,
    ctx: &mut BootContext,
    fs: &mut FileSystem,
) -> Result<(LoadState, String)> {
    let chosen = get_params(fw, ctx, fs)?;

    let kernel_path = match path::parse(&chosen.kernel, Some(&chosen.device), chosen.part) {
        Ok(p) => p,
        Err(e) => {
            cprintln!(fw, "Error parsing kernel path '{}': {}", chosen.kernel, e);
            return Err(e);
        }
    };
    let initrd_path = match &chosen.initrd {
        None => None,
        Some(spec) => match path::parse(spec, Some(&chosen.device), chosen.part) {
            Ok(p) => Some(p),
            Err(e) => {
                cprintln!(fw, "Error parsing initrd path '{}': {}", spec, e);
                return Err(e);
            }
        },
    };

    let (kernel_region, kernel_len) = load_image(fw, fs, &kernel_path, LOAD_BASE)?;
    let kernel_base = kernel_region.base;

    let image = match elf::parse(kernel_region, kernel_len) {
        Ok(image) => image,
        Err(e) => {
            cprintln!(fw, "Error ELF-parsing '{}': {}", kernel_path, e);
            fw.release(kernel_base, kernel_len);
            return Err(e);
        }
    };

    match initrd_path {
        None => {
            ctx.initrd_base = 0;
            ctx.initrd_len = 0;
        }
        Some(p) => {
            let (region, len) = match load_image(fw, fs, &p, kernel_base + kernel_len) {
                Ok(loaded) => loaded,
                Err(e) => {
                    fw.release(kernel_base, kernel_len);
                    return Err(e);
                }
            };
            ctx.initrd_base = region.base;
            ctx.initrd_len = len;
        }
    }

    Ok((image, chosen.params))
}
