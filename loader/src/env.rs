//! Boot session state
//!
//! One [`BootContext`] spans the whole run. It is created at entry,
//! threaded explicitly through every call that needs it, and only dies
//! with the program; exactly one boot attempt is ever in flight.

use crate::config::Config;
use crate::console::cprintln;
use crate::error::{Error, Result};
use crate::prom::Firmware;
use crate::util::{parse_int, word_split};
use alloc::string::{String, ToString};
use bitflags::bitflags;

/// Config file path used when the boot device spec does not name one.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/ofboot.conf";

/// Size of the firmware property staging buffers.
const ENV_SIZE: usize = 512;

bitflags! {
    /// Session flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BootFlags: u32 {
        /// A configuration file was loaded and parsed
        const CONFIG_VALID = 1 << 1;
        /// Stop at the firmware pause before hand-off
        const PAUSE_BEFORE_BOOT = 1 << 2;
        /// Print image geometry and wait before hand-off
        const DEBUG_BEFORE_BOOT = 1 << 3;
        /// The automatic first attempt has been consumed
        const TRIED_AUTO = 1 << 4;
        /// Kernel needs the fixed physical load origin
        const OLD_KERNEL = 1 << 5;
        /// Interpose the firmware shim at hand-off
        const SHIM_OF = 1 << 6;
        /// A preboot script ran before us
        const WITH_PREBOOT = 1 << 7;
    }
}

/// A device/partition pair used as the session default.
#[derive(Debug, Clone, Default)]
pub struct EnvDev {
    /// Firmware device path or alias
    pub device: Option<String>,
    /// Partition index; 0 means not chosen yet
    pub part: u32,
}

impl EnvDev {
    /// Usable for loading?
    pub fn validate(&self) -> Result<()> {
        match &self.device {
            Some(d) if !d.is_empty() && self.part != 0 => Ok(()),
            _ => Err(Error::EnvCurrentBad),
        }
    }

    /// The device name, when set.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

/// Mutable state of one boot session.
#[derive(Debug)]
pub struct BootContext {
    /// Session flags
    pub flags: BootFlags,
    /// Default device/partition for specs that omit them
    pub default_dev: EnvDev,
    /// Arguments passed by the firmware, minus the device word
    pub bootargs: String,
    /// Config file path to try first
    pub config_file: String,
    /// Message to show at the pre-boot pause
    pub pause_message: Option<String>,
    /// Parsed configuration (empty until loaded)
    pub config: Config,
    /// Platform-quirk workaround flags, shown and set interactively
    pub prom_flags: u32,
    /// Resolved initrd location once loaded
    pub initrd_base: u32,
    /// Resolved initrd length once loaded
    pub initrd_len: u32,
}

impl BootContext {
    /// Fresh session state. `with_preboot` records that a preboot script
    /// ran before the loader, which changes where the boot device is
    /// looked for.
    pub fn new(with_preboot: bool) -> Self {
        let mut flags = BootFlags::empty();
        if with_preboot {
            flags.insert(BootFlags::WITH_PREBOOT);
        }
        Self {
            flags,
            default_dev: EnvDev::default(),
            bootargs: String::new(),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            pause_message: None,
            config: Config::default(),
            prom_flags: 0,
            initrd_base: 0,
            initrd_len: 0,
        }
    }
}

fn read_prop<F: Firmware>(fw: &mut F, from_chosen: bool, name: &str) -> String {
    let mut buf = [0u8; ENV_SIZE];
    let n = if from_chosen {
        fw.get_chosen(name, &mut buf)
    } else {
        fw.get_option(name, &mut buf)
    };
    let end = buf[..n].iter().position(|&b| b == 0).unwrap_or(n);
    String::from_utf8_lossy(&buf[..end]).trim().to_string()
}

/// Bootstrap the session defaults from firmware properties.
///
/// The first word of `bootargs` names the boot device spec, the rest
/// become kernel arguments. `--` (or nothing) falls back to the
/// `boot-file` option. After a preboot script the roles flip: the script
/// owns `boot-file` and the passed arguments are ignored.
pub fn init<F: Firmware>(fw: &mut F, ctx: &mut BootContext) -> Result<()> {
    let bootargs = read_prop(fw, true, "bootargs");
    let bootfile = read_prop(fw, false, "boot-file");

    cprintln!(fw, "/chosen/bootargs = '{}'", bootargs);
    cprintln!(fw, "       boot-file = '{}'", bootfile);

    let source = if ctx.flags.contains(BootFlags::WITH_PREBOOT) {
        bootfile.clone()
    } else {
        bootargs
    };

    let (first, rest) = word_split(&source);
    ctx.bootargs = rest.to_string();

    let spec = match first {
        None => {
            if ctx.flags.contains(BootFlags::WITH_PREBOOT) {
                // The script was supposed to set boot-file
                return Err(Error::EnvPrebootBad);
            }
            bootfile
        }
        Some(word) if word.starts_with("--") => {
            if ctx.flags.contains(BootFlags::WITH_PREBOOT) {
                return Err(Error::EnvPrebootBad);
            }
            bootfile
        }
        Some(word) => word.to_string(),
    };

    if spec.is_empty() {
        cprintln!(fw, "No boot device named in bootargs or boot-file");
        return Ok(());
    }

    // device[:partition[/config-path]]
    match spec.find(':') {
        None => {
            ctx.default_dev.device = Some(spec);
        }
        Some(at) => {
            let (device, tail) = spec.split_at(at);
            let tail = &tail[1..];

            ctx.default_dev.device = Some(device.to_string());
            if let Some((part, tail)) = parse_int(tail) {
                ctx.default_dev.part = part;
                if let Some(slash) = tail.find('/') {
                    ctx.config_file = tail[slash..].to_string();
                }
            }
        }
    }

    if ctx.default_dev.part == 0 {
        cprintln!(fw, "Boot device did not name a partition");
    }

    Ok(())
}
