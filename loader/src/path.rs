//! Path specifications
//!
//! A boot target is written `[device:][partition][/path]`. Omitted
//! pieces come from the caller's defaults, which must themselves be
//! valid before they can be leaned on.

use crate::error::{Error, Result};
use crate::util::parse_int;
use alloc::string::{String, ToString};
use core::fmt;

/// A fully resolved `[device:][partition][/path]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    /// Firmware device path or alias
    pub device: String,
    /// Partition index; 0 selects the first bootable partition
    pub part: u32,
    /// Absolute path within the filesystem
    pub path: String,
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.device, self.part, self.path)
    }
}

/// Parse a path specification against defaults.
///
/// Without a colon the whole string is a filesystem path and both
/// defaults must be usable (missing defaults are an environment error,
/// not a parse error). With one, the text before it names the device and
/// the remainder is an optional partition number followed by the path.
/// Paths must be absolute; an empty path means `/`.
pub fn parse(spec: &str, default_device: Option<&str>, default_part: u32) -> Result<PathSpec> {
    let spec = spec.trim();

    let (device, part, path) = match spec.find(':') {
        None => {
            let device = default_device.filter(|d| !d.is_empty()).ok_or(Error::EnvDefaultBad)?;
            if default_part == 0 {
                return Err(Error::EnvDefaultBad);
            }
            (device.to_string(), default_part, spec)
        }
        Some(at) => {
            let device = &spec[..at];
            if device.is_empty() {
                return Err(Error::BadPath);
            }

            let rest = &spec[at + 1..];
            match parse_int(rest) {
                Some((part, tail)) => (device.to_string(), part, tail),
                None => (device.to_string(), default_part, rest),
            }
        }
    };

    let path = match path {
        "" => "/".to_string(),
        p if p.starts_with('/') => p.to_string(),
        _ => return Err(Error::BadPath),
    };

    Ok(PathSpec { device, part, path })
}
