/// # clock
///
/// A DS1307-style real-time clock: eight BCD time registers followed by
/// battery-backed user SRAM, which holds the persisted panel settings.
///
///   0 seconds (bit 7 = clock halt)    4 date
///   1 minutes                         5 month
///   2 hours (bit 6 = 12-hour mode,    6 year (00-99)
///     bit 5 = PM in 12-hour mode)     7 control
///   3 day of week (1-7)               8.. user SRAM
use crate::error::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CLOCK_SECONDS: u8 = 0;
pub const CLOCK_MINUTES: u8 = 1;
pub const CLOCK_HOURS: u8 = 2;
pub const CLOCK_DAY: u8 = 3;
pub const CLOCK_DATE: u8 = 4;
pub const CLOCK_MONTH: u8 = 5;
pub const CLOCK_YEAR: u8 = 6;
pub const CLOCK_CONTROL: u8 = 7;

/// first byte of user SRAM, and how much there is
pub const SRAM_OFFSET: u8 = 8;
pub const SRAM_SIZE: usize = 56;

pub const HOURS_12H: u8 = 0x40;
pub const HOURS_PM: u8 = 0x20;

/// byte-wide access to the clock's registers and SRAM
pub trait Clock {
    fn read_byte(&mut self, index: u8) -> u8;
    fn write_byte(&mut self, index: u8, value: u8);

    /// false if settings can't be kept in the clock and need room elsewhere
    fn has_sram(&self) -> bool {
        true
    }
}

pub fn bcd_to_dec(bcd: u8) -> u8 {
    (bcd / 16 * 10) + (bcd & 0x0f)
}

pub fn dec_to_bcd(dec: u8) -> u8 {
    (dec / 10 * 16) + (dec % 10)
}

/// SRAM as it comes from the factory here: toggle-bits on, default slot map
pub fn default_sram() -> [u8; SRAM_SIZE] {
    let mut sram = [0u8; SRAM_SIZE];
    sram[0] = 0x01;
    sram[1] = 0x0a;
    sram
}

/// a clock that doesn't tick; registers are just bytes. for tests
pub struct MemClock {
    regs: [u8; SRAM_OFFSET as usize + SRAM_SIZE],
}

impl MemClock {
    pub fn new() -> Self {
        let mut regs = [0u8; SRAM_OFFSET as usize + SRAM_SIZE];
        regs[SRAM_OFFSET as usize..].copy_from_slice(&default_sram());
        MemClock { regs }
    }
}

impl Default for MemClock {
    fn default() -> Self {
        MemClock::new()
    }
}

impl Clock for MemClock {
    fn read_byte(&mut self, index: u8) -> u8 {
        self.regs.get(index as usize).copied().unwrap_or(0)
    }

    fn write_byte(&mut self, index: u8, value: u8) {
        if let Some(r) = self.regs.get_mut(index as usize) {
            *r = value;
        }
    }
}

/// broken-down UTC time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Civil {
    year: i64,
    month: u8,
    date: u8,
    hours: u8,
    minutes: u8,
    seconds: u8,
}

// days/civil conversions after Howard Hinnant's date algorithms
fn days_from_civil(year: i64, month: u8, date: u8) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + date as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let date = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, date)
}

impl Civil {
    fn from_epoch(secs: i64) -> Self {
        let (year, month, date) = civil_from_days(secs.div_euclid(86400));
        let rem = secs.rem_euclid(86400);
        Civil {
            year,
            month,
            date,
            hours: (rem / 3600) as u8,
            minutes: (rem / 60 % 60) as u8,
            seconds: (rem % 60) as u8,
        }
    }

    fn to_epoch(self) -> i64 {
        days_from_civil(self.year, self.month, self.date) * 86400
            + self.hours as i64 * 3600
            + self.minutes as i64 * 60
            + self.seconds as i64
    }

    /// 1 = Sunday
    fn day_of_week(self) -> u8 {
        // 1970-01-01 was a Thursday
        ((days_from_civil(self.year, self.month, self.date) + 4).rem_euclid(7) + 1) as u8
    }
}

/// everything about the clock worth keeping between runs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    /// seconds to add to host UTC
    pub offset: i64,
    pub hour12: bool,
    pub control: u8,
    pub sram: Vec<u8>,
}

impl Default for ClockState {
    fn default() -> Self {
        ClockState {
            offset: 0,
            hour12: false,
            control: 0,
            sram: default_sram().to_vec(),
        }
    }
}

/// the host's clock, adjustable by writing the time registers
pub struct SystemClock {
    state: ClockState,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock::with_state(ClockState::default())
    }

    pub fn with_state(mut state: ClockState) -> Self {
        state.sram.resize(SRAM_SIZE, 0);
        SystemClock { state }
    }

    /// load saved state, or start fresh if there's no file yet
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no clock state at {}, starting fresh", path.display());
            return Ok(SystemClock::new());
        }
        let text = fs::read_to_string(path)?;
        Ok(SystemClock::with_state(toml::from_str(&text)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string(&self.state)?)?;
        Ok(())
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    fn host_now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn now(&self) -> Civil {
        Civil::from_epoch(Self::host_now() + self.state.offset)
    }

    fn set(&mut self, civil: Civil) {
        self.state.offset = civil.to_epoch() - Self::host_now();
    }

    fn hours_register(&self, hours: u8) -> u8 {
        if !self.state.hour12 {
            return dec_to_bcd(hours);
        }
        let pm = hours >= 12;
        let h = match hours % 12 {
            0 => 12,
            h => h,
        };
        dec_to_bcd(h) | HOURS_12H | if pm { HOURS_PM } else { 0 }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn read_byte(&mut self, index: u8) -> u8 {
        let now = self.now();
        match index {
            CLOCK_SECONDS => dec_to_bcd(now.seconds),
            CLOCK_MINUTES => dec_to_bcd(now.minutes),
            CLOCK_HOURS => self.hours_register(now.hours),
            CLOCK_DAY => now.day_of_week(),
            CLOCK_DATE => dec_to_bcd(now.date),
            CLOCK_MONTH => dec_to_bcd(now.month),
            CLOCK_YEAR => dec_to_bcd(now.year.rem_euclid(100) as u8),
            CLOCK_CONTROL => self.state.control,
            _ => self
                .state
                .sram
                .get((index - SRAM_OFFSET) as usize)
                .copied()
                .unwrap_or(0),
        }
    }

    fn write_byte(&mut self, index: u8, value: u8) {
        let mut now = self.now();
        match index {
            CLOCK_SECONDS => now.seconds = bcd_to_dec(value & 0x7f).min(59),
            CLOCK_MINUTES => now.minutes = bcd_to_dec(value).min(59),
            CLOCK_HOURS => {
                self.state.hour12 = value & HOURS_12H != 0;
                now.hours = if self.state.hour12 {
                    let h = bcd_to_dec(value & 0x1f) % 12;
                    if value & HOURS_PM != 0 {
                        h + 12
                    } else {
                        h
                    }
                } else {
                    bcd_to_dec(value & 0x3f).min(23)
                };
            }
            // derived from the date
            CLOCK_DAY => return,
            CLOCK_DATE => now.date = bcd_to_dec(value).clamp(1, 31),
            CLOCK_MONTH => now.month = bcd_to_dec(value).clamp(1, 12),
            CLOCK_YEAR => now.year = 2000 + bcd_to_dec(value) as i64,
            CLOCK_CONTROL => {
                self.state.control = value;
                return;
            }
            _ => {
                if let Some(b) = self.state.sram.get_mut((index - SRAM_OFFSET) as usize) {
                    *b = value;
                }
                return;
            }
        }
        self.set(now);
    }
}
