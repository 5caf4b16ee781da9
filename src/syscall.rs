/// # syscall
///
/// Opcode 0o360 is the system call. On entry A holds the item index in its low
/// seven bits, with bit 7 set for a write; B holds the value to write. A read
/// returns the item's value in B. Writing item 0x7f is a probe: A comes back as
/// 0 when system calls are available (a plain machine leaves it alone).
///
/// Items are the clock registers, the persisted settings in clock SRAM, and a
/// few devices (see `config::Item`). A write the bus refuses halts the cpu; the
/// only refusal is a delay cut short by the Stop button.
use crate::buttons::{is_pressed, Button, Input};
use crate::clock::{
    bcd_to_dec, dec_to_bcd, Clock, CLOCK_HOURS, CLOCK_MINUTES, CLOCK_SECONDS, HOURS_12H, HOURS_PM,
    SRAM_OFFSET,
};
use crate::config::{Item, Settings};
use crate::cpu::Extension;
use crate::instruction::Instruction;
use crate::memory::{Memory, REG_A, REG_B};
use crate::programs::SYSX;
use crate::serial::Serial;
use crate::storage::{Eeprom, Slots, SETTINGS_RESERVE};
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// the capability probe
pub const PROBE: u8 = 0x7f;

/// delays longer than this are broken up to watch for Stop
const DELAY_SLICE: u8 = 50;

/// everything outside the cpu the panel talks to, bar the LEDs
pub struct Devices<'a> {
    pub input: &'a mut dyn Input,
    pub clock: &'a mut dyn Clock,
    pub serial: &'a mut dyn Serial,
    pub eeprom: &'a mut dyn Eeprom,
}

/// the configuration store: the devices plus the live settings derived from
/// them. also the cpu's extension for the system call opcode
pub struct SystemBus<'a> {
    input: &'a mut dyn Input,
    clock: &'a mut dyn Clock,
    serial: &'a mut dyn Serial,
    eeprom: &'a mut dyn Eeprom,
    settings: Settings,
    slots: Slots,
    /// control LEDs written by a program, waiting for the panel to show them
    leds: Option<u8>,
    rng: StdRng,
}

impl<'a> SystemBus<'a> {
    pub fn new(devices: Devices<'a>) -> Self {
        let settings = Settings::default();
        let capacity = Slots::capacity_of(devices.eeprom.len(), devices.clock.has_sram());
        SystemBus {
            input: devices.input,
            clock: devices.clock,
            serial: devices.serial,
            eeprom: devices.eeprom,
            slots: Slots::new(settings.slot_map, capacity),
            settings,
            leds: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// pick up the persisted settings
    pub fn load_settings(&mut self) {
        let flags = self.read(Item::Flags as u8);
        self.settings.update_flags(flags);
        let map = self.read(Item::EepromMap as u8);
        // erased, or nowhere to keep it
        if map != 0xff {
            self.settings.slot_map = map;
        }
        self.slots.rebuild(self.settings.slot_map);
        self.settings.auto_run = self.read(Item::AutoRun as u8);
        debug!("settings {:?}", self.settings);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    /// control LEDs a program has asked for since last time
    pub fn take_leds(&mut self) -> Option<u8> {
        self.leds.take()
    }

    pub fn input(&mut self) -> &mut (dyn Input + 'a) {
        &mut *self.input
    }

    /// the buttons and the serial line together, for transfers
    pub fn input_and_serial(&mut self) -> (&mut (dyn Input + 'a), &mut (dyn Serial + 'a)) {
        (&mut *self.input, &mut *self.serial)
    }

    /// copy EEPROM slot `slot` into memory
    pub fn restore_slot(&mut self, slot: u8, memory: &mut Memory) -> bool {
        let done = self
            .slots
            .restore(slot, &*self.eeprom, memory, self.settings.preserve_registers);
        info!("restore slot {}: {}", slot, done);
        done
    }

    /// copy memory into EEPROM slot `slot`
    pub fn save_slot(&mut self, slot: u8, memory: &Memory) -> bool {
        let done = self.slots.save(slot, &mut *self.eeprom, memory);
        info!("save slot {}: {}", slot, done);
        done
    }

    /// read an item; anything unknown or write-only reads 0
    pub fn read(&mut self, index: u8) -> u8 {
        let item = match Item::try_from(index) {
            Ok(item) => item,
            Err(e) => {
                debug!("{}", e);
                return 0;
            }
        };
        match item {
            // clock halt bit
            Item::ClockSeconds => self.clock.read_byte(CLOCK_SECONDS) & 0x7f,
            Item::ClockHours24 => hours_to_24(self.clock.read_byte(CLOCK_HOURS)),
            Item::Random => self.rng.gen(),
            Item::Serial => self.serial.read_byte().unwrap_or(0),
            Item::Leds | Item::DelayMillis => 0,
            _ => self.fetch(item),
        }
    }

    /// write an item; false means halt
    pub fn write(&mut self, index: u8, value: u8) -> bool {
        let item = match Item::try_from(index) {
            Ok(item) => item,
            Err(e) => {
                debug!("{}", e);
                return true;
            }
        };
        match item {
            Item::ClockHours24 => {
                let hours = self.clock.read_byte(CLOCK_HOURS);
                self.clock.write_byte(CLOCK_HOURS, hours_from_24(value, hours));
            }
            Item::Flags => {
                self.settings.update_flags(value);
                self.store(item, value);
            }
            Item::EepromMap => {
                self.settings.slot_map = value;
                self.slots.rebuild(value);
                self.store(item, value);
            }
            Item::AutoRun => {
                self.settings.auto_run = value;
                self.store(item, value);
            }
            Item::Leds => self.leds = Some(value),
            Item::Random => self.reseed(value),
            Item::DelayMillis => return self.delay(value),
            Item::Serial => self.serial.write_byte(value),
            _ => self.store(item, value),
        }
        true
    }

    /// run a system call. A and B are updated in place; false means halt
    pub fn system_call(&mut self, a: &mut u8, b: &mut u8) -> bool {
        let index = *a & 0x7f;
        if *a & 0x80 == 0 {
            *b = self.read(index);
            trace!("sys read {:#04x} -> {:#04x}", index, *b);
            return true;
        }
        trace!("sys write {:#04x} <- {:#04x}", index, *b);
        if index == PROBE {
            *a = 0;
            return true;
        }
        self.write(index, *b)
    }

    /// where a persisted item lives in EEPROM when the clock has no SRAM
    fn settings_addr(&self, item: Item) -> usize {
        self.eeprom.len().saturating_sub(SETTINGS_RESERVE) + (item as u8 - SRAM_OFFSET) as usize
    }

    fn fetch(&mut self, item: Item) -> u8 {
        if item.is_persisted() && !self.clock.has_sram() {
            return self.eeprom.read(self.settings_addr(item));
        }
        self.clock.read_byte(item as u8)
    }

    fn store(&mut self, item: Item, value: u8) {
        if item.is_persisted() && !self.clock.has_sram() {
            let addr = self.settings_addr(item);
            self.eeprom.write(addr, value);
        } else {
            self.clock.write_byte(item as u8, value);
        }
    }

    /// a zero seed means seed from the time
    fn reseed(&mut self, value: u8) {
        let seed = if value != 0 {
            value as u64
        } else {
            let secs = self.clock.read_byte(CLOCK_SECONDS) as u64;
            let mins = self.clock.read_byte(CLOCK_MINUTES) as u64;
            (secs << 8) | mins
        };
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// sleep, in slices, giving up if Stop goes down
    fn delay(&mut self, mut ms: u8) -> bool {
        while ms > DELAY_SLICE {
            if let Some((state, _)) = self.input.sample(false) {
                if is_pressed(state, Button::RunStop) {
                    info!("delay cut short by Stop");
                    return false;
                }
            }
            spin_sleep::sleep(Duration::from_millis(DELAY_SLICE as u64));
            ms -= DELAY_SLICE;
        }
        spin_sleep::sleep(Duration::from_millis(ms as u64));
        true
    }
}

impl Extension for SystemBus<'_> {
    fn on_extension(&mut self, op: Instruction, memory: &mut Memory) -> bool {
        if op.0 != SYSX {
            return true;
        }
        let mut a = memory.read(REG_A);
        let mut b = memory.read(REG_B);
        if !self.system_call(&mut a, &mut b) {
            return false;
        }
        memory.write(REG_A, a);
        memory.write(REG_B, b);
        self.settings.set_cpu_speed(0);
        true
    }
}

/// hours register as 24-hour BCD, whatever mode the clock is in
fn hours_to_24(hours: u8) -> u8 {
    if hours & HOURS_12H == 0 {
        return hours;
    }
    let mut h = bcd_to_dec(hours & 0x1f) % 12;
    if hours & HOURS_PM != 0 {
        h += 12;
    }
    dec_to_bcd(h)
}

/// 24-hour BCD as the clock wants it, given its current hours register
fn hours_from_24(value: u8, current: u8) -> u8 {
    if current & HOURS_12H == 0 {
        return value;
    }
    let h = bcd_to_dec(value);
    let pm = if h >= 12 { HOURS_PM } else { 0 };
    let h = match h % 12 {
        0 => 12,
        h => h,
    };
    dec_to_bcd(h) | HOURS_12H | pm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::{Buttons, ScriptedButtons};
    use crate::clock::MemClock;
    use crate::config::{DEFAULT_SLOT_MAP, TOGGLE_BITS_FLAG};
    use crate::cpu::{Cpu, CpuConfig};
    use crate::programs::{LDA_C, LDB_C};
    use crate::serial::BufferSerial;
    use crate::storage::{MemEeprom, EEPROM_SIZE};

    struct Rig {
        script: ScriptedButtons,
        input: Buttons<ScriptedButtons>,
        clock: MemClock,
        serial: BufferSerial,
        eeprom: MemEeprom,
    }

    impl Rig {
        fn new() -> Self {
            let script = ScriptedButtons::new();
            Rig {
                input: Buttons::new(script.clone()).with_settle(Duration::ZERO),
                script,
                clock: MemClock::new(),
                serial: BufferSerial::new(),
                eeprom: MemEeprom::new(EEPROM_SIZE),
            }
        }

        fn bus(&mut self) -> SystemBus<'_> {
            SystemBus::new(Devices {
                input: &mut self.input,
                clock: &mut self.clock,
                serial: &mut self.serial,
                eeprom: &mut self.eeprom,
            })
        }
    }

    /// a clock with no SRAM, so settings go to EEPROM
    struct BareClock(MemClock);

    impl Clock for BareClock {
        fn read_byte(&mut self, index: u8) -> u8 {
            self.0.read_byte(index)
        }

        fn write_byte(&mut self, index: u8, value: u8) {
            self.0.write_byte(index, value)
        }

        fn has_sram(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_probe() {
        let mut rig = Rig::new();
        let mut bus = rig.bus();
        let (mut a, mut b) = (0xff, 0x12);
        assert!(bus.system_call(&mut a, &mut b));
        assert_eq!((a, b), (0, 0x12));
        let (mut a, mut b) = (0x7f, 0x12);
        assert!(bus.system_call(&mut a, &mut b));
        assert_eq!((a, b), (0x7f, 0));
    }

    #[test]
    fn test_unknown_items() {
        let mut rig = Rig::new();
        let mut bus = rig.bus();
        assert_eq!(bus.read(0x40), 0);
        assert!(bus.write(0x40, 1));
    }

    #[test]
    fn test_settings_in_sram() {
        let mut rig = Rig::new();
        {
            let mut bus = rig.bus();
            bus.load_settings();
            assert!(bus.settings().toggle_bits);
            assert_eq!(bus.settings().slot_map, DEFAULT_SLOT_MAP);
            assert!(bus.write(Item::Flags as u8, 0x02));
            assert!(!bus.settings().toggle_bits);
            assert!(bus.settings().preserve_registers);
            assert!(bus.write(Item::EepromMap as u8, 0x00));
            assert_eq!(bus.slots().size(4), 0);
            assert!(bus.write(Item::User3 as u8, 0x99));
            assert_eq!(bus.read(Item::User3 as u8), 0x99);
        }
        assert_eq!(rig.clock.read_byte(8), 0x02);
        assert_eq!(rig.clock.read_byte(9), 0x00);
        assert_eq!(rig.clock.read_byte(12), 0x99);
    }

    #[test]
    fn test_settings_in_eeprom_without_sram() {
        let mut rig = Rig::new();
        let mut clock = BareClock(MemClock::new());
        {
            let mut bus = SystemBus::new(Devices {
                input: &mut rig.input,
                clock: &mut clock,
                serial: &mut rig.serial,
                eeprom: &mut rig.eeprom,
            });
            // the top of EEPROM is kept back
            assert_eq!(bus.slots().size(7), 56);
            assert!(bus.write(Item::AutoRun as u8, 0x13));
            assert_eq!(bus.read(Item::AutoRun as u8), 0x13);
            // erased map is ignored
            bus.load_settings();
            assert_eq!(bus.settings().slot_map, DEFAULT_SLOT_MAP);
            assert_eq!(bus.settings().auto_run, 0x13);
        }
        assert_eq!(rig.eeprom.read(EEPROM_SIZE - 1), 0x13);
        assert_eq!(clock.read_byte(15), 0);
    }

    #[test]
    fn test_seconds_mask_clock_halt() {
        let mut rig = Rig::new();
        rig.clock.write_byte(CLOCK_SECONDS, 0x80 | 0x42);
        assert_eq!(rig.bus().read(Item::ClockSeconds as u8), 0x42);
    }

    #[test]
    fn test_hours_in_12_hour_mode() {
        let mut rig = Rig::new();
        // 3pm
        rig.clock.write_byte(CLOCK_HOURS, HOURS_12H | HOURS_PM | 0x03);
        {
            let mut bus = rig.bus();
            assert_eq!(bus.read(Item::ClockHours24 as u8), 0x15);
            assert!(bus.write(Item::ClockHours24 as u8, 0x09));
        }
        assert_eq!(rig.clock.read_byte(CLOCK_HOURS), HOURS_12H | 0x09);
        {
            let mut bus = rig.bus();
            assert!(bus.write(Item::ClockHours24 as u8, 0x00));
            assert_eq!(bus.read(Item::ClockHours24 as u8), 0x00);
            assert!(bus.write(Item::ClockHours24 as u8, 0x12));
            assert_eq!(bus.read(Item::ClockHours24 as u8), 0x12);
        }
        assert_eq!(rig.clock.read_byte(CLOCK_HOURS), HOURS_12H | HOURS_PM | 0x12);

        // 24-hour clocks pass straight through
        rig.clock.write_byte(CLOCK_HOURS, 0x21);
        let mut bus = rig.bus();
        assert_eq!(bus.read(Item::ClockHours24 as u8), 0x21);
        assert!(bus.write(Item::ClockHours24 as u8, 0x07));
        assert_eq!(bus.read(Item::ClockHours24 as u8), 0x07);
    }

    #[test]
    fn test_random_reseeds() {
        let mut rig = Rig::new();
        let mut bus = rig.bus();
        assert!(bus.write(Item::Random as u8, 5));
        let first: Vec<u8> = (0..8).map(|_| bus.read(Item::Random as u8)).collect();
        assert!(bus.write(Item::Random as u8, 5));
        let again: Vec<u8> = (0..8).map(|_| bus.read(Item::Random as u8)).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_leds_and_serial() {
        let mut rig = Rig::new();
        rig.serial.push_input(b"k");
        {
            let mut bus = rig.bus();
            assert_eq!(bus.take_leds(), None);
            assert!(bus.write(Item::Leds as u8, 0x05));
            assert_eq!(bus.take_leds(), Some(0x05));
            assert_eq!(bus.take_leds(), None);
            assert_eq!(bus.read(Item::Serial as u8), b'k');
            assert_eq!(bus.read(Item::Serial as u8), 0);
            assert!(bus.write(Item::Serial as u8, b'!'));
        }
        assert_eq!(rig.serial.output(), b"!");
    }

    #[test]
    fn test_delay_stops_on_stop() {
        let mut rig = Rig::new();
        // power-up sample
        rig.script.release_all();
        rig.input.sample(false);
        {
            let mut bus = rig.bus();
            assert!(bus.write(Item::DelayMillis as u8, 60));
        }
        rig.script.press(&[Button::RunStop]);
        let mut bus = rig.bus();
        assert!(!bus.write(Item::DelayMillis as u8, 200));
    }

    #[test]
    fn test_opcode_updates_registers() {
        let mut rig = Rig::new();
        let mut bus = rig.bus();
        let mut cpu = Cpu::new(CpuConfig::default());
        cpu.memory_mut()
            .load(0, &[0, 0, 0, 4, LDA_C, 0xff, SYSX, LDA_C, Item::User1 as u8, SYSX, 0]);
        assert!(bus.write(Item::User1 as u8, 0x66));
        assert!(cpu.step_with(&mut bus));
        assert!(cpu.step_with(&mut bus));
        assert_eq!(cpu.read(REG_A), 0);
        assert_eq!(bus.settings().cycle_delay_ms, 1);
        assert!(cpu.step_with(&mut bus));
        assert!(cpu.step_with(&mut bus));
        assert_eq!(cpu.read(REG_B), 0x66);
        assert!(!cpu.step_with(&mut bus));
    }

    #[test]
    fn test_refused_write_halts() {
        let mut rig = Rig::new();
        rig.script.release_all();
        rig.input.sample(false);
        rig.script.press(&[Button::RunStop]);
        let mut bus = rig.bus();
        let mut cpu = Cpu::new(CpuConfig::default());
        cpu.memory_mut().load(
            0,
            &[0, 0, 0, 4, LDA_C, 0x80 | Item::DelayMillis as u8, LDB_C, 100, SYSX],
        );
        assert!(cpu.step_with(&mut bus));
        assert!(cpu.step_with(&mut bus));
        assert!(!cpu.step_with(&mut bus));
        // no speed change
        assert_eq!(bus.settings().cycle_delay_ms, 0);
    }

    #[test]
    fn test_flags_default() {
        let mut rig = Rig::new();
        assert_eq!(rig.bus().read(Item::Flags as u8), TOGGLE_BITS_FLAG);
    }
}
