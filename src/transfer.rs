/// # transfer
///
/// Moving all of memory over the serial line as text.
///
/// Out: every byte as `0` and three octal digits, then a comma, with a line
/// break every 16 bytes. e.g. `0000,0000,0000,0004,0103,...`
///
/// In: octal digits by default; an `x` switches the value being built to hex
/// (upper case digits). Any other character ends the value being built and
/// stores it at the next address; `e` or `s` ends the transfer. The receiver
/// echoes `[0`, a hex digit of progress every 16 bytes, and finally
/// `] len=0x.. chk=0x..` with the byte count and 8-bit additive checksum.
use crate::memory::{Memory, MEMORY_SIZE};
use crate::serial::Serial;
use log::info;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub len: usize,
    pub checksum: u8,
    /// cut short by the Stop button
    pub aborted: bool,
}

/// the panel's part in a transfer
pub trait Progress {
    /// polled between bytes; true aborts the transfer
    fn stop_requested(&mut self) -> bool;

    /// a byte went over the line
    fn byte_done(&mut self, _addr: usize) {}
}

/// no panel: never stops, shows nothing
pub struct NoProgress;

impl Progress for NoProgress {
    fn stop_requested(&mut self) -> bool {
        false
    }
}

/// how long to wait for a byte before polling again
const IDLE_POLL: Duration = Duration::from_millis(1);

/// write all of memory out
pub fn dump(memory: &Memory, serial: &mut dyn Serial, progress: &mut dyn Progress) -> TransferSummary {
    let mut summary = TransferSummary::default();
    for addr in 0..MEMORY_SIZE {
        if progress.stop_requested() {
            serial.write_str(" STOP\r\n");
            summary.aborted = true;
            break;
        }
        let b = memory.read(addr as u8);
        serial.write_str(&format!("0{:03o},", b));
        if addr % 16 == 15 {
            serial.write_str("\r\n");
        }
        summary.len += 1;
        summary.checksum = summary.checksum.wrapping_add(b);
        progress.byte_done(addr);
    }
    info!("dumped {} bytes, checksum {:#04x}", summary.len, summary.checksum);
    summary
}

fn digit_value(ch: u8) -> Option<u32> {
    match ch {
        b'0'..=b'9' => Some((ch - b'0') as u32),
        b'A'..=b'F' => Some((ch - b'A' + 10) as u32),
        _ => None,
    }
}

/// read memory in from address 0
pub fn load(memory: &mut Memory, serial: &mut dyn Serial, progress: &mut dyn Progress) -> TransferSummary {
    let mut summary = TransferSummary::default();
    let mut bits_per_digit = 3;
    let mut value: Option<u32> = None;

    serial.write_str("[0");
    while summary.len < MEMORY_SIZE {
        if progress.stop_requested() {
            serial.write_str(" STOP\r\n");
            summary.aborted = true;
            break;
        }

        let ch = match serial.read_byte() {
            Some(ch) => ch,
            None if serial.input_closed() => break,
            None => {
                spin_sleep::sleep(IDLE_POLL);
                continue;
            }
        };

        match ch {
            b'x' => bits_per_digit = 4,
            b'e' | b's' => break,
            _ => match digit_value(ch).filter(|d| *d < (1 << bits_per_digit)) {
                Some(digit) => match value {
                    Some(v) => value = Some((v << bits_per_digit) | digit),
                    None => {
                        value = Some(digit);
                        // every value starts out octal
                        bits_per_digit = 3;
                    }
                },
                None => {
                    if let Some(v) = value.take() {
                        store(memory, &mut summary, v as u8);
                        progress.byte_done(summary.len - 1);
                        if summary.len % 16 == 0 && summary.len < MEMORY_SIZE {
                            serial.write_str(&format!("{:X}", summary.len / 16));
                        }
                    }
                }
            },
        }
    }

    // ended on a number with no delimiter
    if let Some(v) = value {
        if summary.len < MEMORY_SIZE {
            store(memory, &mut summary, v as u8);
        }
    }

    serial.write_str(&format!(
        "] len=0x{:X} chk=0x{:X}\r\n",
        summary.len, summary.checksum
    ));
    info!("loaded {} bytes, checksum {:#04x}", summary.len, summary.checksum);
    summary
}

fn store(memory: &mut Memory, summary: &mut TransferSummary, b: u8) {
    memory.write(summary.len as u8, b);
    summary.len += 1;
    summary.checksum = summary.checksum.wrapping_add(b);
}
