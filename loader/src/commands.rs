//! Bang commands
//!
//! Interactive input starting with `!` is a command, not a boot target.
//! The set is a closed enum dispatched by name; an unknown name or a bad
//! parameter prints the table or the usage line and returns to the
//! prompt, never aborts the session.

use crate::console::{cprint, cprintln};
use crate::env::{BootContext, BootFlags};
use crate::error::{Error, Result};
use crate::file::FileSystem;
use crate::path;
use crate::prom::Firmware;
use crate::util::{parse_int, word_split};
use alloc::string::String;
use alloc::vec;
use bitflags::bitflags;
use ext2fs::FileKind;

bitflags! {
    /// Platform-quirk workaround bits, shown and set via `!prom-flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PromFlags: u32 {
        /// Firmware needs the claim workaround
        const CLAIM_WORK_AROUND = 1 << 0;
        /// Firmware setprop does not copy its input
        const SHALLOW_SETPROP = 1 << 1;
        /// Firmware needs the shim trampoline
        const NEED_SHIM = 1 << 2;
    }
}

/// Memtest ranges are rounded up to this.
const SIZE_1M: u32 = 0x10_0000;

/// The command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Help,
    Ls,
    Cat,
    Dev,
    Part,
    Of,
    Debug,
    OldKernel,
    Shim,
    Halt,
    Memtest,
    PromFlags,
}

impl Command {
    const ALL: [Command; 12] = [
        Command::Help,
        Command::Ls,
        Command::Cat,
        Command::Dev,
        Command::Part,
        Command::Of,
        Command::Debug,
        Command::OldKernel,
        Command::Shim,
        Command::Halt,
        Command::Memtest,
        Command::PromFlags,
    ];

    fn name(self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Ls => "ls",
            Command::Cat => "cat",
            Command::Dev => "dev",
            Command::Part => "part",
            Command::Of => "of",
            Command::Debug => "debug",
            Command::OldKernel => "old-kernel",
            Command::Shim => "shim",
            Command::Halt => "halt",
            Command::Memtest => "memtest",
            Command::PromFlags => "prom-flags",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Command::Help => "show help, given an optional command name",
            Command::Ls => "list a directory",
            Command::Cat => "show the contents of a file",
            Command::Dev => "show or change the default device",
            Command::Part => "change the default partition",
            Command::Of => "interpret a firmware command",
            Command::Debug => "toggle the pre-boot debug stop",
            Command::OldKernel => "toggle booting at the fixed kernel origin",
            Command::Shim => "toggle the firmware shim",
            Command::Halt => "drop into the firmware prompt",
            Command::Memtest => "test a physical memory range",
            Command::PromFlags => "show or set the firmware quirk flags",
        }
    }

    fn lookup(name: &str) -> Option<Command> {
        let name = name.strip_prefix('!').unwrap_or(name);
        Command::ALL.iter().copied().find(|c| c.name() == name)
    }
}

/// Dispatch one bang line (without its leading `!`).
pub fn dispatch<F: Firmware>(fw: &mut F, ctx: &mut BootContext, fs: &mut FileSystem, line: &str) {
    let (name, args) = word_split(line);
    let Some(command) = name.and_then(Command::lookup) else {
        cprintln!(fw, "{}", Error::CmdUnknown);
        show_commands(fw);
        return;
    };

    match exec(fw, ctx, fs, command, args) {
        Ok(()) => {}
        Err(Error::CmdBadParam) => show_command(fw, command),
        Err(e) => cprintln!(fw, "'{}': {}", command.name(), e),
    }
}

fn show_command<F: Firmware>(fw: &mut F, command: Command) {
    cprintln!(fw, "  !{} - {}", command.name(), command.describe());
}

fn show_commands<F: Firmware>(fw: &mut F) {
    cprintln!(fw, "Available commands:");
    for command in Command::ALL {
        cprint!(fw, "  !{}", command.name());
    }
    cprintln!(fw);
}

fn exec<F: Firmware>(
    fw: &mut F,
    ctx: &mut BootContext,
    fs: &mut FileSystem,
    command: Command,
    args: &str,
) -> Result<()> {
    match command {
        Command::Help => {
            let (wanted, _) = word_split(args);
            match wanted {
                None => {
                    for command in Command::ALL {
                        show_command(fw, command);
                    }
                }
                Some(name) => match Command::lookup(name) {
                    Some(command) => show_command(fw, command),
                    None => show_commands(fw),
                },
            }
        }

        Command::Ls => {
            let args = args.trim();
            let target = if args.is_empty() { "/" } else { args };
            command_ls(fw, ctx, fs, target);
        }

        Command::Cat => {
            let args = args.trim();
            if args.is_empty() {
                return Err(Error::CmdBadParam);
            }
            show_file(fw, ctx, fs, args);
        }

        Command::Dev => {
            let args = args.trim();
            if args.is_empty() {
                match ctx.default_dev.device() {
                    Some(dev) => {
                        cprintln!(fw, "default device {}:{}", dev, ctx.default_dev.part)
                    }
                    None => cprintln!(fw, "no default device"),
                }
            } else {
                ctx.default_dev.device = Some(String::from(args));
            }
        }

        Command::Part => {
            let (n, rest) = parse_int(args).ok_or(Error::CmdBadParam)?;
            if !rest.trim().is_empty() {
                return Err(Error::CmdBadParam);
            }
            ctx.default_dev.part = n;
        }

        Command::Of => {
            let args = args.trim();
            if args.is_empty() {
                return Err(Error::CmdBadParam);
            }
            fw.interpret(args);
            cprintln!(fw);
        }

        Command::Debug => {
            ctx.flags.toggle(BootFlags::DEBUG_BEFORE_BOOT);
            cprintln!(
                fw,
                "debug stop {}",
                on_off(ctx.flags.contains(BootFlags::DEBUG_BEFORE_BOOT))
            );
        }

        Command::OldKernel => {
            ctx.flags.toggle(BootFlags::OLD_KERNEL);
            cprintln!(
                fw,
                "old kernel handling {}",
                on_off(ctx.flags.contains(BootFlags::OLD_KERNEL))
            );
        }

        Command::Shim => {
            ctx.flags.toggle(BootFlags::SHIM_OF);
            cprintln!(
                fw,
                "firmware shim {}",
                on_off(ctx.flags.contains(BootFlags::SHIM_OF))
            );
        }

        Command::Halt => fw.pause(None),

        Command::Memtest => {
            let (base, rest) = parse_int(args).ok_or(Error::CmdBadParam)?;
            let (size, _) = parse_int(rest).ok_or(Error::CmdBadParam)?;
            memtest(fw, base, size)?;
        }

        Command::PromFlags => {
            let args = args.trim();
            if args.is_empty() {
                cprintln!(
                    fw,
                    "prom-flags = 0x{:x}, shim = {}",
                    ctx.prom_flags,
                    yes_no(ctx.flags.contains(BootFlags::SHIM_OF))
                );
            } else {
                let (value, rest) = parse_int(args).ok_or(Error::CmdBadParam)?;
                if !rest.trim().is_empty() {
                    return Err(Error::CmdBadParam);
                }
                ctx.prom_flags = value;
                apply_prom_flags(ctx);
                cprintln!(
                    fw,
                    "new prom-flags = 0x{:x}, shim = {}",
                    ctx.prom_flags,
                    yes_no(ctx.flags.contains(BootFlags::SHIM_OF))
                );
            }
        }
    }

    Ok(())
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "yes"
    } else {
        "no"
    }
}

/// Fold the quirk bits into the session flags.
pub fn apply_prom_flags(ctx: &mut BootContext) {
    let mut quirks = PromFlags::from_bits_truncate(ctx.prom_flags);
    if quirks.contains(PromFlags::SHALLOW_SETPROP) {
        quirks.insert(PromFlags::NEED_SHIM);
    }
    ctx.prom_flags = quirks.bits();

    if quirks.contains(PromFlags::NEED_SHIM) {
        ctx.flags.insert(BootFlags::SHIM_OF);
    }
}

fn command_ls<F: Firmware>(fw: &mut F, ctx: &BootContext, fs: &mut FileSystem, target: &str) {
    let spec = match path::parse(target, ctx.default_dev.device(), ctx.default_dev.part) {
        Ok(spec) => spec,
        Err(e) => {
            cprintln!(fw, "Error listing '{}': {}", target, e);
            return;
        }
    };

    cprintln!(fw, "Listing '{}'", spec);
    match fs.list(fw, &spec) {
        Ok(entries) => {
            for entry in entries {
                let marker = if entry.kind == FileKind::Directory { "/" } else { "" };
                cprintln!(fw, "{:>10}  {}{}", entry.size, entry.name, marker);
            }
        }
        Err(e) => cprintln!(fw, "Error listing '{}': {}", spec, e),
    }
}

/// Print a file to the console. Shared by `!cat` and the configured
/// greeting message.
pub(crate) fn show_file<F: Firmware>(
    fw: &mut F,
    ctx: &BootContext,
    fs: &mut FileSystem,
    target: &str,
) {
    let spec = match path::parse(target, ctx.default_dev.device(), ctx.default_dev.part) {
        Ok(spec) => spec,
        Err(e) => {
            cprintln!(fw, "Error opening '{}': {}", target, e);
            return;
        }
    };

    let len = match fs.len(fw, &spec) {
        Ok(len) => len,
        Err(e) => {
            cprintln!(fw, "Error opening '{}': {}", spec, e);
            return;
        }
    };

    let mut buf = vec![0u8; len as usize];
    match fs.load(fw, &spec, &mut buf) {
        Ok(_) => cprint!(fw, "{}", String::from_utf8_lossy(&buf)),
        Err(e) => cprintln!(fw, "Error reading '{}': {}", spec, e),
    }
}

/// Walk a claimed range writing each word's own address, read it back,
/// then repeat with the complement. The first mismatch of each pass is
/// reported.
fn memtest<F: Firmware>(fw: &mut F, base: u32, size: u32) -> Result<()> {
    let base = align_up(base, SIZE_1M);
    let size = align_up(size, SIZE_1M);
    cprintln!(fw, "mem test range 0x{:x}-0x{:x}", base, base + size);

    let mut region = fw.claim(base, size)?;

    for pass in [false, true] {
        let label = if pass { "complement" } else { "address" };
        cprintln!(fw, "{} pattern...", label);

        for off in (0..size).step_by(4) {
            if off % SIZE_1M == 0 {
                cprintln!(fw, "Writing 0x{:x}...", base + off);
            }
            let value = pattern(base + off, pass);
            region.mem[off as usize..off as usize + 4].copy_from_slice(&value.to_be_bytes());
        }

        for off in (0..size).step_by(4) {
            if off % SIZE_1M == 0 {
                cprintln!(fw, "Reading 0x{:x}...", base + off);
            }
            let raw = &region.mem[off as usize..off as usize + 4];
            let got = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
            let want = pattern(base + off, pass);
            if got != want {
                cprintln!(fw, "bad address 0x{:x}, got 0x{:x}", base + off, got);
                break;
            }
        }
    }

    fw.release(base, size);
    Ok(())
}

fn pattern(addr: u32, complement: bool) -> u32 {
    if complement {
        !addr
    } else {
        addr
    }
}

fn align_up(v: u32, to: u32) -> u32 {
    v.checked_add(to - 1).map_or(u32::MAX & !(to - 1), |n| n & !(to - 1))
}
