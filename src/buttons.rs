use crossterm::event::{poll, read, Event, KeyCode};
use crossterm::terminal;
use log::warn;
use std::cell::Cell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// the 15 front panel buttons, in logical bit order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Button {
    Bit0,
    Bit1,
    Bit2,
    Bit3,
    Bit4,
    Bit5,
    Bit6,
    Bit7,
    InputClear,
    AddressDisplay,
    AddressSet,
    MemoryRead,
    MemoryStore,
    RunStart,
    RunStop,
    Unused,
}

impl Button {
    pub const ALL: [Button; 16] = [
        Button::Bit0,
        Button::Bit1,
        Button::Bit2,
        Button::Bit3,
        Button::Bit4,
        Button::Bit5,
        Button::Bit6,
        Button::Bit7,
        Button::InputClear,
        Button::AddressDisplay,
        Button::AddressSet,
        Button::MemoryRead,
        Button::MemoryStore,
        Button::RunStart,
        Button::RunStop,
        Button::Unused,
    ];

    /// data button for bit n (0..=7)
    pub fn digit(n: u8) -> Button {
        Button::ALL[(n & 0x07) as usize]
    }

    /// Some(n) for the data buttons
    pub fn digit_value(self) -> Option<u8> {
        let n = self as u8;
        (n <= Button::Bit7 as u8).then_some(n)
    }

    pub fn mask(self) -> u16 {
        1 << (self as u16)
    }
}

/// is the button down in a logical state bitmap
pub fn is_pressed(state: u16, button: Button) -> bool {
    state & button.mask() != 0
}

/// the lowest-numbered button down in a logical state bitmap
pub fn first_pressed(state: u16) -> Option<Button> {
    Button::ALL.iter().copied().find(|b| is_pressed(state, *b))
}

/// reads the front panel
pub trait Input {
    /// get the logical button state and the buttons newly pressed since the
    /// last sample. nothing if the state hasn't changed, or if a debounced
    /// read disagrees with itself
    fn sample(&mut self, debounce: bool) -> Option<(u16, u16)>;
}

/// raw 16-bit switch bitmap, in whatever order the switches are wired
pub trait ButtonSource {
    fn read_raw(&mut self) -> u16;
}

/// physical bit for each logical button, e.g. logical Bit2 is wired to bit 6
pub const PANEL_WIRING: [u8; 16] = [0, 1, 6, 7, 4, 5, 2, 3, 11, 12, 13, 14, 15, 9, 8, 10];

/// straight-through wiring
pub const IDENTITY_WIRING: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

const DEBOUNCE_SETTLE: Duration = Duration::from_millis(20);

/// edge detection and debounce over a raw switch source
pub struct Buttons<S> {
    source: S,
    wiring: [u8; 16],
    previous: u16,
    settle: Duration,
}

impl<S: ButtonSource> Buttons<S> {
    pub fn new(source: S) -> Self {
        Buttons::with_wiring(source, PANEL_WIRING)
    }

    pub fn with_wiring(source: S, wiring: [u8; 16]) -> Self {
        Buttons {
            source,
            wiring,
            // nothing counts as newly pressed at power-up
            previous: 0xffff,
            settle: DEBOUNCE_SETTLE,
        }
    }

    /// how long to wait between the two reads of a debounced sample
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn read_logical(&mut self) -> u16 {
        let raw = self.source.read_raw();
        self.wiring
            .iter()
            .enumerate()
            .filter(|(_, physical)| raw & (1 << **physical) != 0)
            .fold(0, |state, (logical, _)| state | (1 << logical))
    }
}

impl<S: ButtonSource> Input for Buttons<S> {
    fn sample(&mut self, debounce: bool) -> Option<(u16, u16)> {
        let state = self.read_logical();
        if debounce {
            spin_sleep::sleep(self.settle);
            if self.read_logical() != state {
                return None;
            }
        }
        if state == self.previous {
            return None;
        }
        let pressed = state & !self.previous;
        self.previous = state;
        Some((state, pressed))
    }
}

/// keyboard layout: data bits on the number row, controls on letters
const PANEL_KEYMAP: [(char, Button); 15] = [
    ('0', Button::Bit0),
    ('1', Button::Bit1),
    ('2', Button::Bit2),
    ('3', Button::Bit3),
    ('4', Button::Bit4),
    ('5', Button::Bit5),
    ('6', Button::Bit6),
    ('7', Button::Bit7),
    ('c', Button::InputClear),
    ('d', Button::AddressDisplay),
    ('a', Button::AddressSet),
    ('r', Button::MemoryRead),
    ('w', Button::MemoryStore),
    ('g', Button::RunStart),
    ('h', Button::RunStop),
];

/// front panel buttons on the terminal keyboard.
///
/// terminals report key presses (and auto-repeats) but not releases, so a key
/// counts as held until `hold` has passed since its last event. hold one key
/// (auto-repeat keeps it down) and tap another to make a chord.
pub struct TermButtons {
    keymap: HashMap<char, u8>,
    held: HashMap<u8, Instant>,
    hold: Duration,
    quit: Arc<AtomicBool>,
}

impl TermButtons {
    pub fn new(hold: Duration, quit: Arc<AtomicBool>) -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        // keys produce the bits the physical panel would, so the wiring
        // table still applies
        let keymap = PANEL_KEYMAP
            .iter()
            .map(|(key, button)| (*key, PANEL_WIRING[*button as usize]))
            .collect();
        Ok(TermButtons {
            keymap,
            held: HashMap::new(),
            hold,
            quit,
        })
    }

    fn read_keys(&mut self) -> Result<(), io::Error> {
        while poll(Duration::from_millis(0))? {
            match read()? {
                Event::Key(evt) => match evt.code {
                    KeyCode::Char(key) => match self.keymap.get(&key.to_ascii_lowercase()) {
                        Some(bit) => {
                            self.held.insert(*bit, Instant::now());
                        }
                        None => warn!("can't map {:?} to a panel button", key),
                    },
                    KeyCode::Esc => self.quit.store(true, Ordering::Relaxed),
                    _ => warn!("unknown key event received"),
                },
                _ => {}
            }
        }
        Ok(())
    }
}

impl Drop for TermButtons {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl ButtonSource for TermButtons {
    fn read_raw(&mut self) -> u16 {
        if let Err(e) = self.read_keys() {
            warn!("keyboard read failed: {}", e);
        }
        let hold = self.hold;
        self.held.retain(|_, since| since.elapsed() < hold);
        self.held.keys().fold(0, |raw, bit| raw | (1 << bit))
    }
}

/// buttons held down by a test script; clones share the same switches
#[derive(Clone, Default)]
pub struct ScriptedButtons {
    raw: Rc<Cell<u16>>,
}

impl ScriptedButtons {
    pub fn new() -> Self {
        ScriptedButtons::default()
    }

    /// hold exactly these buttons down, wired as on the real panel
    pub fn press(&self, buttons: &[Button]) {
        let raw = buttons
            .iter()
            .fold(0, |raw, b| raw | (1 << PANEL_WIRING[*b as usize]));
        self.raw.set(raw);
    }

    pub fn release_all(&self) {
        self.raw.set(0);
    }
}

impl ButtonSource for ScriptedButtons {
    fn read_raw(&mut self) -> u16 {
        self.raw.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// hands out raw states in order, then repeats the last
    struct Sequence(Vec<u16>);

    impl ButtonSource for Sequence {
        fn read_raw(&mut self) -> u16 {
            if self.0.len() > 1 {
                self.0.remove(0)
            } else {
                self.0[0]
            }
        }
    }

    #[test]
    fn test_digit_buttons() {
        assert_eq!(Button::digit(5), Button::Bit5);
        assert_eq!(Button::Bit7.digit_value(), Some(7));
        assert_eq!(Button::InputClear.digit_value(), None);
        assert_eq!(Button::RunStop.mask(), 0x4000);
    }

    #[test]
    fn test_first_pressed() {
        assert_eq!(first_pressed(0), None);
        assert_eq!(
            first_pressed(Button::RunStop.mask() | Button::Bit3.mask()),
            Some(Button::Bit3)
        );
    }

    #[test]
    fn test_wiring_permutes() {
        // physical bit 6 is logical Bit2, physical 8 is RunStop
        let mut b = Buttons::new(Sequence(vec![(1 << 6) | (1 << 8)]));
        let (state, _) = b.sample(false).unwrap();
        assert!(is_pressed(state, Button::Bit2));
        assert!(is_pressed(state, Button::RunStop));
        assert_eq!(state.count_ones(), 2);
    }

    #[test]
    fn test_scripted_round_trips_wiring() {
        let script = ScriptedButtons::new();
        let mut b = Buttons::new(script.clone());
        for button in &Button::ALL[..15] {
            script.press(&[*button]);
            let (state, _) = b.sample(false).unwrap();
            assert_eq!(state, button.mask());
        }
    }

    #[test]
    fn test_edges() {
        let mut b = Buttons::with_wiring(Sequence(vec![0, 0, 0b01, 0b11, 0b10]), IDENTITY_WIRING);
        // power-up: state changed from "all down", nothing new
        assert_eq!(b.sample(false), Some((0, 0)));
        assert_eq!(b.sample(false), None);
        assert_eq!(b.sample(false), Some((0b01, 0b01)));
        assert_eq!(b.sample(false), Some((0b11, 0b10)));
        assert_eq!(b.sample(false), Some((0b10, 0)));
    }

    #[test]
    fn test_debounce_discards_disagreement() {
        let mut b = Buttons::with_wiring(Sequence(vec![0, 0, 0b1, 0b0, 0b1, 0b1]), IDENTITY_WIRING)
            .with_settle(Duration::ZERO);
        assert_eq!(b.sample(true), Some((0, 0)));
        assert_eq!(b.sample(true), None);
        assert_eq!(b.sample(true), Some((0b1, 0b1)));
    }
}
