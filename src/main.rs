use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::info;

use kenbak::buttons::{Buttons, TermButtons};
use kenbak::clock::SystemClock;
use kenbak::cpu::CpuConfig;
use kenbak::leds::TermDisplay;
use kenbak::panel::FrontPanel;
use kenbak::serial::FileSerial;
use kenbak::storage::{MemEeprom, EEPROM_SIZE};
use kenbak::syscall::Devices;

/// KENBAK-1 front panel emulator. Keys: 0-7 data bits, c clear, d display
/// address, a set address, r read, w store, g start, h stop, Esc quits. Hold
/// one key and tap another to chord.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Program image to load at address 0 (at most 256 bytes)
    program: Option<PathBuf>,

    /// EEPROM image, created on exit if missing
    #[arg(long, default_value = "kenbak.eeprom")]
    eeprom: PathBuf,

    /// Clock and settings (battery-backed SRAM), kept as TOML
    #[arg(long, default_value = "kenbak.toml")]
    settings: PathBuf,

    /// File fed to the serial line
    #[arg(long)]
    serial_in: Option<PathBuf>,

    /// File the serial line writes to
    #[arg(long)]
    serial_out: Option<PathBuf>,

    /// Run at 2^N ms per instruction (0-7); flat out if not given
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..8))]
    speed: Option<u8>,

    /// Auto-run selector overriding the saved one: 0x10|N built-in, 0x20|N slot
    #[arg(long, value_parser = parse_byte)]
    auto_run: Option<u8>,

    /// Zero-filling right shifts and single-carry rotates, as older versions
    #[arg(long)]
    legacy_shift: bool,

    /// Advance P as each byte is fetched, as older versions
    #[arg(long)]
    legacy_pc: bool,

    /// Skip the light show at power-up
    #[arg(long)]
    no_splash: bool,

    /// How long a key counts as held down, in ms
    #[arg(long, default_value_t = 300)]
    hold_ms: u64,
}

/// decimal, 0x hex or 0o octal
fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else if let Some(oct) = s.strip_prefix("0o") {
        u8::from_str_radix(oct, 8)
    } else {
        s.parse()
    };
    parsed.map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    // log to stderr, so 2>kenbak.log keeps it off the panel
    env_logger::init();

    let quit = Arc::new(AtomicBool::new(false));
    let mut clock = SystemClock::open(&args.settings)?;
    let mut eeprom = MemEeprom::open(&args.eeprom, EEPROM_SIZE)?;
    let mut serial = FileSerial::open(args.serial_in.as_deref(), args.serial_out.as_deref())?;
    let mut input = Buttons::new(TermButtons::new(
        Duration::from_millis(args.hold_ms),
        quit.clone(),
    )?);
    let mut display = TermDisplay::new()?;

    let config = CpuConfig {
        legacy_shift_rotate: args.legacy_shift,
        legacy_program_counter: args.legacy_pc,
    };
    {
        let devices = Devices {
            input: &mut input,
            clock: &mut clock,
            serial: &mut serial,
            eeprom: &mut eeprom,
        };
        let mut panel = FrontPanel::new(&mut display, devices, config);

        if let Some(path) = &args.program {
            let n = panel.cpu_mut().memory_mut().load_from(&mut File::open(path)?)?;
            info!("loaded {} bytes from {}", n, path.display());
        }
        panel.init(!args.no_splash)?;
        if let Some(n) = args.speed {
            panel.settings_mut().set_cpu_speed(n);
        }
        if let Some(selector) = args.auto_run {
            panel.auto_run(selector)?;
        }

        while !quit.load(Ordering::Relaxed) {
            panel.cycle()?;
            if !panel.is_running() {
                // nothing to do but watch the buttons
                spin_sleep::sleep(Duration::from_millis(1));
            }
        }
    }

    clock.save(&args.settings)?;
    eeprom.save(&args.eeprom)?;
    serial.flush()?;
    info!("saved {} and {}", args.settings.display(), args.eeprom.display());

    // shove some junk on stdout to stop the cli messing up the last frame
    for _ in 0..12 {
        println!();
    }
    Ok(())
}
