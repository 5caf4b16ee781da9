use crate::buttons::{is_pressed, Button};
use crate::error::KenbakError;

/// auto-run selector is 0b00XX0NNN: XX picks the source, NNN the program
pub const AUTO_RUN_BUILTIN: u8 = 0b0001_0000;
pub const AUTO_RUN_EEPROM: u8 = 0b0010_0000;

/// bits in the Flags item
pub const TOGGLE_BITS_FLAG: u8 = 0x01;
pub const PRESERVE_REGISTERS_FLAG: u8 = 0x02;

/// 256, 256, 128, 128, 64, 64, 64, 64
pub const DEFAULT_SLOT_MAP: u8 = 0x0a;

/// the system-call items, by index. clock registers and SRAM come first, so
/// items 0-15 are also clock register numbers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Item {
    ClockSeconds,
    ClockMinutes,
    ClockHours24,
    ClockDay,
    ClockDate,
    ClockMonth,
    ClockYear,
    ClockControl,

    Flags,
    EepromMap,
    User1,
    User2,
    User3,
    User4,
    User5,
    AutoRun,

    Leds,
    Random,
    DelayMillis,
    Serial,
}

impl TryFrom<u8> for Item {
    type Error = KenbakError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        use Item::*;
        const ITEMS: [Item; 20] = [
            ClockSeconds,
            ClockMinutes,
            ClockHours24,
            ClockDay,
            ClockDate,
            ClockMonth,
            ClockYear,
            ClockControl,
            Flags,
            EepromMap,
            User1,
            User2,
            User3,
            User4,
            User5,
            AutoRun,
            Leds,
            Random,
            DelayMillis,
            Serial,
        ];
        ITEMS
            .get(index as usize)
            .copied()
            .ok_or(KenbakError::UnknownItem(index))
    }
}

impl Item {
    pub fn is_clock(self) -> bool {
        (self as u8) <= Item::ClockControl as u8
    }

    /// kept in clock SRAM
    pub fn is_persisted(self) -> bool {
        (Item::Flags as u8..=Item::AutoRun as u8).contains(&(self as u8))
    }
}

/// live panel settings, loaded from the persisted items at power-up
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// data buttons toggle their bit rather than only setting it
    pub toggle_bits: bool,
    /// restoring a slot leaves the register addresses alone
    pub preserve_registers: bool,
    /// pause after each instruction while running
    pub cycle_delay_ms: u8,
    pub slot_map: u8,
    pub auto_run: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            toggle_bits: true,
            preserve_registers: false,
            cycle_delay_ms: 0,
            slot_map: DEFAULT_SLOT_MAP,
            auto_run: 0,
        }
    }
}

impl Settings {
    pub fn update_flags(&mut self, flags: u8) {
        self.toggle_bits = flags & TOGGLE_BITS_FLAG != 0;
        self.preserve_registers = flags & PRESERVE_REGISTERS_FLAG != 0;
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.toggle_bits {
            flags |= TOGGLE_BITS_FLAG;
        }
        if self.preserve_registers {
            flags |= PRESERVE_REGISTERS_FLAG;
        }
        flags
    }

    /// 2^n ms per instruction: 1ms..128ms
    pub fn set_cpu_speed(&mut self, n: u8) {
        self.cycle_delay_ms = 1 << (n & 0x07);
    }
}

/// Buttons held at power-on configure auto-run:
///
/// * Stop & BitN  = run built-in program N
/// * Read & BitN  = run EEPROM slot N
/// * Stop         = auto-run off
/// * Stop & Clear = auto-run off, and flags and slot map back to defaults
///
/// returns the item writes to make
pub fn startup_writes(state: u16) -> Vec<(Item, u8)> {
    let stop = is_pressed(state, Button::RunStop);
    if !stop && !is_pressed(state, Button::MemoryRead) {
        return Vec::new();
    }
    let source = if stop {
        AUTO_RUN_BUILTIN
    } else {
        AUTO_RUN_EEPROM
    };
    // only the first bit counts
    if let Some(n) = (0..8).find(|n| is_pressed(state, Button::digit(*n))) {
        return vec![(Item::AutoRun, source + n)];
    }
    if !stop {
        return Vec::new();
    }
    let mut writes = vec![(Item::AutoRun, 0)];
    if is_pressed(state, Button::InputClear) {
        writes.push((Item::Flags, TOGGLE_BITS_FLAG));
        writes.push((Item::EepromMap, DEFAULT_SLOT_MAP));
    }
    writes
}
