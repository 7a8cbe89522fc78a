//! The closed error taxonomy of the loader
//!
//! Every failure the loader can hit is one of these values; there is no
//! other error channel. Low-level errors with a fallback (the partition
//! scheme probes, the config file candidates) are consumed where the
//! fallback lives; everything else bubbles up to the boot loop, which
//! reports it and re-prompts.

use core::fmt;
use ext2fs::Ext2Error;

/// Result type used throughout the loader
pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can go wrong between entry and hand-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Device open failed
    DeviceOpen,
    /// Device read failed or came back short
    ShortRead,
    /// First sector does not carry the Mac partition map magic
    PartNotMac,
    /// First sector does not carry the DOS boot signature
    PartNotDos,
    /// Neither partition scheme matched
    PartNotPartitioned,
    /// Scheme matched but no entry satisfied the selection
    PartNotFound,
    /// Access beyond the partition size
    PartBounds,
    /// Volume is not ext2
    FsNotExt2,
    /// Filesystem metadata is corrupt
    FsCorrupt,
    /// File not found
    FsNotFound,
    /// Symlink loop detected
    FsLoop,
    /// File is too large for its destination
    FsTooBig,
    /// Malformed path specification
    BadPath,
    /// Not an ELF image
    ElfNot,
    /// ELF image for the wrong architecture profile
    ElfWrong,
    /// ELF image has no loadable segment
    ElfNotLoadable,
    /// Allocation failed
    NoMem,
    /// The booted kernel returned control
    KernelReturned,
    /// Selected device/partition is unusable
    EnvCurrentBad,
    /// Environment defaults are missing or invalid
    EnvDefaultBad,
    /// Preboot script did not set up the environment it promised
    EnvPrebootBad,
    /// Configuration file could not be parsed
    ConfigInvalid,
    /// Unrecognized command
    CmdUnknown,
    /// Command given bad parameters
    CmdBadParam,
    /// Firmware services missing at initialization
    PromInit,
    /// No image chosen this round; prompt again
    NotReady,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::DeviceOpen => "cannot open device",
            Self::ShortRead => "short read on device",
            Self::PartNotMac => "partitioning not macintosh",
            Self::PartNotDos => "partitioning not dos",
            Self::PartNotPartitioned => "invalid disk partitioning",
            Self::PartNotFound => "partition not found",
            Self::PartBounds => "access beyond partition size",
            Self::FsNotExt2 => "filesystem is not ext2",
            Self::FsCorrupt => "filesystem is corrupted",
            Self::FsNotFound => "file not found",
            Self::FsLoop => "symlink loop detected",
            Self::FsTooBig => "file is too large to be loaded",
            Self::BadPath => "malformed path",
            Self::ElfNot => "invalid kernel image",
            Self::ElfWrong => "invalid kernel architecture",
            Self::ElfNotLoadable => "not a loadable image",
            Self::NoMem => "allocation failed",
            Self::KernelReturned => "kernel returned",
            Self::EnvCurrentBad => "selected device/partition is invalid",
            Self::EnvDefaultBad => "default device/partition is invalid",
            Self::EnvPrebootBad => "preboot environment is invalid",
            Self::ConfigInvalid => "syntax error in configuration file",
            Self::CmdUnknown => "unknown command",
            Self::CmdBadParam => "bad command parameter",
            Self::PromInit => "firmware initialization failed",
            Self::NotReady => "no image chosen",
        };
        f.write_str(msg)
    }
}

impl From<Ext2Error> for Error {
    fn from(e: Ext2Error) -> Self {
        match e {
            Ext2Error::IoError => Self::ShortRead,
            Ext2Error::OutOfBounds => Self::PartBounds,
            Ext2Error::NotExt2 => Self::FsNotExt2,
            Ext2Error::Corrupt => Self::FsCorrupt,
            Ext2Error::NotFound | Ext2Error::NotMounted => Self::FsNotFound,
            Ext2Error::SymlinkLoop => Self::FsLoop,
        }
    }
}
