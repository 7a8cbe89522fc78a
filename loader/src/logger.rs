//! Bounded in-memory log sink
//!
//! Diagnostics go through the `log` facade into a fixed ring of recent
//! lines, kept off the console so they never mix with the prompt. The
//! ring is dumped on demand (the pre-boot debug stop).

use alloc::string::String;
use alloc::vec::Vec;
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

const MAX_ENTRIES: usize = 64;

struct Ring {
    entries: Vec<String>,
    next: usize,
}

/// `log::Log` implementation backed by a bounded ring buffer.
pub struct RingLogger {
    ring: Mutex<Ring>,
}

static LOGGER: RingLogger = RingLogger {
    ring: Mutex::new(Ring {
        entries: Vec::new(),
        next: 0,
    }),
};

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = alloc::format!("{}: {}", record.level(), record.args());
        let mut ring = self.ring.lock();
        if ring.entries.len() < MAX_ENTRIES {
            ring.entries.push(line);
        } else {
            let at = ring.next;
            ring.entries[at] = line;
        }
        ring.next = (ring.next + 1) % MAX_ENTRIES;
    }

    fn flush(&self) {}
}

/// Install the ring logger. Harmless to call more than once; only the
/// first installation wins.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

/// Snapshot the buffered lines, oldest first.
pub fn snapshot() -> Vec<String> {
    let ring = LOGGER.ring.lock();
    let mut out = Vec::with_capacity(ring.entries.len());
    if ring.entries.len() == MAX_ENTRIES {
        out.extend_from_slice(&ring.entries[ring.next..]);
        out.extend_from_slice(&ring.entries[..ring.next]);
    } else {
        out.extend_from_slice(&ring.entries);
    }
    out
}
