//! Single-line prompt editor
//!
//! Minimal line discipline over the firmware console: printable
//! characters echo, backspace rubs out, tab hands the partial line to a
//! completion callback, return finishes. The buffer is a fixed 512
//! bytes; extra input is dropped.

use crate::prom::Firmware;
use alloc::string::{String, ToString};
use arrayvec::ArrayString;

/// Line buffer capacity.
pub const MAX_LINE: usize = 512;

/// Edit one line.
///
/// `first` is a key that was already consumed while deciding to go
/// interactive (the keypress that broke the countdown); `None` blocks
/// for fresh input. The completion callback sees the line so far.
pub fn edit<F, T>(fw: &mut F, first: Option<u8>, mut tab: T) -> String
where
    F: Firmware,
    T: FnMut(&mut F, &str),
{
    let mut line = ArrayString::<MAX_LINE>::new();
    let mut key = match first {
        Some(k) => k,
        None => fw.getchar(),
    };

    loop {
        match key {
            b'\n' | b'\r' => break,
            b'\t' => tab(fw, line.as_str()),
            0x08 | 0x7F => {
                if line.pop().is_some() {
                    fw.console_write("\u{8} \u{8}");
                }
            }
            k if (b' '..0x7F).contains(&k) => {
                if line.try_push(k as char).is_ok() {
                    let echo = [k];
                    if let Ok(s) = core::str::from_utf8(&echo) {
                        fw.console_write(s);
                    }
                }
            }
            _ => {}
        }
        key = fw.getchar();
    }

    fw.console_write("\n");
    line.as_str().to_string()
}
