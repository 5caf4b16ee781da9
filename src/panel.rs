/// # panel
///
/// The front panel controller. While halted, each new button press is
/// dispatched along with whichever other button is being held (the chord).
/// Holding the first button and pressing the second gives the extended
/// commands:
///
///   Stop + BitN     load built-in program N
///   Stop + Clear    blank the display
///   Clear + Store   clear memory
///   BitN + Read     restore memory from EEPROM slot N
///   BitN + Store    save memory to EEPROM slot N
///   Stop + Read     system call read of item (address)
///   Stop + Store    system call write of item (address) from the input latch
///   Stop + Start    single step
///   BitN + Stop     1 instruction per 2^N ms
///   BitN + Disp     dump memory to serial
///   BitN + Set      load memory from serial
///
/// While running only the data buttons, Clear and Stop do anything.
use crate::buttons::{first_pressed, is_pressed, Button, Input};
use crate::config::{startup_writes, Settings, AUTO_RUN_BUILTIN, AUTO_RUN_EEPROM};
use crate::cpu::{Cpu, CpuConfig};
use crate::leds::{Display, Leds, LED_ADDRESS, LED_INPUT, LED_MEMORY, LED_RUN};
use crate::memory::{Memory, REG_INPUT, REG_OUTPUT, REG_P};
use crate::programs;
use crate::syscall::{Devices, SystemBus};
use crate::transfer::{self, Progress};
use log::{debug, info};
use std::io;
use std::time::Duration;

const BLINK: Duration = Duration::from_millis(50);

/// what the data LEDs are showing, lit on the control LEDs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Input,
    Address,
    Memory,
    Run,
    None,
}

impl Mode {
    pub fn leds(self) -> u8 {
        match self {
            Mode::Input => LED_INPUT,
            Mode::Address => LED_ADDRESS,
            Mode::Memory => LED_MEMORY,
            Mode::Run => LED_RUN,
            Mode::None => 0,
        }
    }
}

pub struct FrontPanel<'a> {
    cpu: Cpu,
    bus: SystemBus<'a>,
    leds: Leds<'a>,
    running: bool,
    data: u8,
    control: u8,
    address: u8,
}

fn chord_digit(chord: Option<Button>) -> Option<u8> {
    chord.and_then(Button::digit_value)
}

impl<'a> FrontPanel<'a> {
    pub fn new(display: &'a mut dyn Display, devices: Devices<'a>, config: CpuConfig) -> Self {
        FrontPanel {
            cpu: Cpu::new(config),
            bus: SystemBus::new(devices),
            leds: Leds::new(display),
            running: false,
            data: 0,
            control: 0,
            address: 0,
        }
    }

    /// power-up: apply any buttons held down, read the settings, then start
    /// the auto-run program if there is one
    pub fn init(&mut self, splash: bool) -> io::Result<()> {
        if let Some((state, _)) = self.bus.input().sample(false) {
            for (item, value) in startup_writes(state) {
                info!("startup buttons: {:?} = {:#04x}", item, value);
                self.bus.write(item as u8, value);
            }
        }
        self.bus.load_settings();

        self.running = false;
        if splash {
            self.splash()?;
        }
        self.data = 0;
        self.address = 0;
        self.set_mode(Mode::Input);
        self.show()?;

        let auto_run = self.bus.settings().auto_run;
        self.auto_run(auto_run)
    }

    /// a little light show
    pub fn splash(&mut self) -> io::Result<()> {
        self.leds.show(0xff, 0x0f)?;
        spin_sleep::sleep(Duration::from_millis(250));
        for bit in (0..8).rev() {
            self.leds.show(1 << bit, 0)?;
            spin_sleep::sleep(Duration::from_millis(100));
        }
        for mode in [Mode::Input, Mode::Address, Mode::Memory, Mode::Run] {
            self.leds.show(0, mode.leds())?;
            spin_sleep::sleep(Duration::from_millis(100));
        }
        Ok(())
    }

    /// selector is 0b00XX0NNN: XX 01 runs built-in program NNN, 10 runs
    /// EEPROM slot NNN, anything else does nothing
    pub fn auto_run(&mut self, selector: u8) -> io::Result<()> {
        let program = selector & 0x07;
        match selector & 0xf8 {
            AUTO_RUN_EEPROM => self.on_memory_read(Some(Button::digit(program)))?,
            AUTO_RUN_BUILTIN => self.on_input_button(program, Some(Button::RunStop)),
            _ => return Ok(()),
        }
        info!("auto-run {:#04x}", selector);
        self.on_run_start(None)
    }

    /// one trip round the main loop: step the cpu if it's running, look at
    /// the buttons, update the LEDs
    pub fn cycle(&mut self) -> io::Result<()> {
        if self.running {
            if let Some((_, pressed)) = self.bus.input().sample(false) {
                self.handle_running(pressed)?;
            }
            if self.running {
                self.running = self.cpu.step_with(&mut self.bus);
                self.pick_up_leds();
                self.data = self.cpu.read(REG_OUTPUT);
                if !self.running {
                    info!("halted, P = {:#05o}", self.cpu.read(REG_P));
                }
                let delay = self.bus.settings().cycle_delay_ms;
                if delay != 0 {
                    spin_sleep::sleep(Duration::from_millis(delay as u64));
                }
            }
        } else if let Some((state, pressed)) = self.bus.input().sample(true) {
            self.handle_halted(state, pressed)?;
        }
        self.show()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn data(&self) -> u8 {
        self.data
    }

    pub fn control(&self) -> u8 {
        self.control
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn memory(&self) -> &Memory {
        self.cpu.memory()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn settings(&self) -> &Settings {
        self.bus.settings()
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        self.bus.settings_mut()
    }

    fn show(&mut self) -> io::Result<()> {
        self.leds.show(self.data, self.control)
    }

    fn set_mode(&mut self, mode: Mode) {
        self.control = mode.leds();
    }

    /// take up control LEDs set by a system call
    fn pick_up_leds(&mut self) {
        if let Some(leds) = self.bus.take_leds() {
            self.control = leds;
        }
    }

    /// flash one control LED
    fn blink(&mut self, led: u8) -> io::Result<()> {
        self.leds.show(self.data, self.control ^ led)?;
        spin_sleep::sleep(BLINK);
        self.show()
    }

    fn handle_halted(&mut self, state: u16, pressed: u16) -> io::Result<()> {
        let button = match first_pressed(pressed) {
            Some(button) => button,
            None => return Ok(()),
        };
        let chord = Button::ALL[..Button::Unused as usize]
            .iter()
            .copied()
            .find(|b| *b != button && is_pressed(state, *b));
        debug!("{:?} pressed, chord {:?}", button, chord);

        if let Some(n) = button.digit_value() {
            self.on_input_button(n, chord);
            return Ok(());
        }
        match button {
            Button::InputClear => self.on_input_clear(chord),
            Button::AddressDisplay => self.on_address_display(chord)?,
            Button::AddressSet => self.on_address_set(chord)?,
            Button::MemoryRead => self.on_memory_read(chord)?,
            Button::MemoryStore => self.on_memory_store(chord)?,
            Button::RunStart => self.on_run_start(chord)?,
            Button::RunStop => self.on_run_stop(chord)?,
            _ => {}
        }
        Ok(())
    }

    /// no chords while running
    fn handle_running(&mut self, pressed: u16) -> io::Result<()> {
        let button = match first_pressed(pressed) {
            Some(button) => button,
            None => return Ok(()),
        };
        if let Some(n) = button.digit_value() {
            self.on_input_button(n, None);
            return Ok(());
        }
        match button {
            Button::InputClear => self.on_input_clear(None),
            Button::RunStop => self.on_run_stop(None)?,
            _ => {}
        }
        Ok(())
    }

    fn on_input_button(&mut self, n: u8, chord: Option<Button>) {
        let mut data = self.cpu.read(REG_INPUT);
        if chord == Some(Button::RunStop) {
            if programs::load(n, self.cpu.memory_mut()) {
                info!("loaded built-in program {}", n);
                data = 1 << n;
            }
        } else if self.bus.settings().toggle_bits {
            data ^= 1 << n;
        } else {
            data |= 1 << n;
        }
        if !self.running {
            self.data = data;
            self.set_mode(Mode::Input);
        }
        self.cpu.write(REG_INPUT, data);
    }

    fn on_input_clear(&mut self, chord: Option<Button>) {
        self.cpu.write(REG_INPUT, 0);
        if !self.running {
            self.data = 0;
            self.set_mode(Mode::Input);
        }
        if chord == Some(Button::RunStop) {
            self.set_mode(Mode::None);
        }
    }

    fn on_address_display(&mut self, chord: Option<Button>) -> io::Result<()> {
        if chord_digit(chord).is_some() {
            return self.serialize(false);
        }
        self.data = self.address;
        self.set_mode(Mode::Address);
        Ok(())
    }

    fn on_address_set(&mut self, chord: Option<Button>) -> io::Result<()> {
        if chord_digit(chord).is_some() {
            return self.serialize(true);
        }
        self.address = self.cpu.read(REG_INPUT);
        self.blink(LED_ADDRESS)
    }

    fn on_memory_read(&mut self, chord: Option<Button>) -> io::Result<()> {
        if let Some(slot) = chord_digit(chord) {
            let done = self.bus.restore_slot(slot, self.cpu.memory_mut());
            self.data = if done { 1 << slot } else { 0 };
            self.set_mode(Mode::None);
        } else if chord == Some(Button::RunStop) {
            self.system_call(self.address & 0x7f, 0);
        } else {
            self.data = self.cpu.read(self.address);
            self.address = self.address.wrapping_add(1);
            self.set_mode(Mode::Memory);
            self.blink(LED_RUN)?;
        }
        Ok(())
    }

    fn on_memory_store(&mut self, chord: Option<Button>) -> io::Result<()> {
        if let Some(slot) = chord_digit(chord) {
            let done = self.bus.save_slot(slot, self.cpu.memory());
            self.data = if done { 1 << slot } else { 0 };
            self.set_mode(Mode::None);
        } else if chord == Some(Button::RunStop) {
            let value = self.cpu.read(REG_INPUT);
            self.system_call(self.address | 0x80, value);
        } else if chord == Some(Button::InputClear) {
            self.cpu.clear_all_memory();
            self.address = REG_P + 1;
            self.bus.settings_mut().cycle_delay_ms = 0;
            self.cpu.write(REG_P, self.address);
            self.set_mode(Mode::None);
            info!("memory cleared");
        } else {
            let value = self.cpu.read(REG_INPUT);
            self.cpu.write(self.address, value);
            self.address = self.address.wrapping_add(1);
            self.blink(LED_RUN)?;
        }
        Ok(())
    }

    fn on_run_start(&mut self, chord: Option<Button>) -> io::Result<()> {
        self.set_mode(Mode::Run);
        if chord == Some(Button::RunStop) {
            self.cpu.step_with(&mut self.bus);
            self.pick_up_leds();
            self.data = self.cpu.read(REG_OUTPUT);
            return self.blink(LED_RUN);
        }
        info!("run from {:#05o}", self.cpu.read(REG_P));
        self.running = true;
        Ok(())
    }

    fn on_run_stop(&mut self, chord: Option<Button>) -> io::Result<()> {
        if let Some(n) = chord_digit(chord) {
            self.bus.settings_mut().set_cpu_speed(n);
            info!("{}ms per instruction", self.bus.settings().cycle_delay_ms);
            self.blink(LED_RUN)?;
        }
        if self.running {
            info!("stopped, P = {:#05o}", self.cpu.read(REG_P));
        }
        self.running = false;
        self.set_mode(Mode::Run);
        Ok(())
    }

    /// a system call from the panel; the result goes to the output latch
    fn system_call(&mut self, mut a: u8, mut b: u8) {
        if self.bus.system_call(&mut a, &mut b) {
            self.cpu.write(REG_OUTPUT, b);
        }
        // the mode change wins over any LEDs it set
        self.bus.take_leds();
        self.data = b;
        self.set_mode(Mode::None);
    }

    /// memory over the serial line, in (load) or out (dump). Stop aborts
    fn serialize(&mut self, input: bool) -> io::Result<()> {
        self.set_mode(Mode::None);
        let (buttons, serial) = self.bus.input_and_serial();
        let mut progress = PanelProgress {
            input: buttons,
            leds: &mut self.leds,
            data: self.data,
            control: self.control,
            error: None,
        };
        let summary = if input {
            transfer::load(self.cpu.memory_mut(), serial, &mut progress)
        } else {
            transfer::dump(self.cpu.memory(), serial, &mut progress)
        };
        debug!("transfer {:?}", summary);
        if let Some(e) = progress.error.take() {
            return Err(e);
        }
        self.set_mode(if input { Mode::Run } else { Mode::Input });
        Ok(())
    }
}

/// watches Stop and flashes Run during a transfer
struct PanelProgress<'p, 'a> {
    input: &'p mut (dyn Input + 'a),
    leds: &'p mut Leds<'a>,
    data: u8,
    control: u8,
    error: Option<io::Error>,
}

impl Progress for PanelProgress<'_, '_> {
    fn stop_requested(&mut self) -> bool {
        matches!(self.input.sample(false), Some((_, pressed)) if is_pressed(pressed, Button::RunStop))
    }

    fn byte_done(&mut self, _addr: usize) {
        self.control ^= LED_RUN;
        if let Err(e) = self.leds.show(self.data, self.control) {
            self.error.get_or_insert(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_leds() {
        assert_eq!(Mode::Input.leds(), 0x01);
        assert_eq!(Mode::Address.leds(), 0x02);
        assert_eq!(Mode::Memory.leds(), 0x04);
        assert_eq!(Mode::Run.leds(), 0x08);
        assert_eq!(Mode::None.leds(), 0);
    }

    #[test]
    fn test_chord_digit() {
        assert_eq!(chord_digit(Some(Button::Bit6)), Some(6));
        assert_eq!(chord_digit(Some(Button::RunStop)), None);
        assert_eq!(chord_digit(None), None);
    }
}
