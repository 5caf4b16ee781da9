/// # KENBAK-1
///
/// An emulation of the KENBAK-1 and its front panel, as rebuilt around a
/// microcontroller: buttons and LEDs, a real-time clock with battery-backed
/// SRAM, and EEPROM for saving programs.
///
/// ## Design
///
/// * every byte decodes to something; nothing the program does is an error
/// * the machine state is just its 256 bytes of memory, registers included
/// * halts are a bool threaded back from `step`, never an error
/// * abstract buttons, LEDs, clock, EEPROM and serial behind traits so the
///   panel runs against a terminal or against test doubles
/// * one reserved opcode (0o360) calls out of the emulation to read and write
///   the clock, settings and devices
///
/// Model
///
/// main
///  |-- display, buttons, clock, eeprom, serial
///  |-- panel(display, devices, cpu config)
///  |    |-- cpu
///  |    |    |-- memory
///  |    |    `-- instruction decode
///  |    |-- system bus(buttons, clock, eeprom, serial)
///  |    |    |-- settings, EEPROM slots
///  |    |    `-- extension for the system call opcode
///  |    `-- leds(display)
///  `-- main loop
///       |-- panel.cycle()
///       |     running: step the cpu with the bus as its extension, then
///       |     sleep the cycle delay; watch for Stop
///       |     halted: debounce, then dispatch the new button press and
///       |     whatever it's chorded with
///       `-- until Esc; then save the clock SRAM and EEPROM
pub mod buttons;
pub mod clock;
pub mod config;
pub mod cpu;
pub mod error;
pub mod instruction;
pub mod leds;
pub mod memory;
pub mod panel;
pub mod programs;
pub mod serial;
pub mod storage;
pub mod syscall;
pub mod transfer;
