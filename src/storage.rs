use crate::error::Result;
use crate::memory::{Memory, MEMORY_SIZE};
use log::{debug, warn};
use std::fs;
use std::path::Path;

/// ATmega328 EEPROM
pub const EEPROM_SIZE: usize = 1024;

/// bytes kept back at the top of EEPROM for settings when the clock has no SRAM
pub const SETTINGS_RESERVE: usize = 8;

pub const SLOT_COUNT: usize = 8;

/// byte-addressable non-volatile storage
pub trait Eeprom {
    fn len(&self) -> usize;
    fn read(&self, addr: usize) -> u8;
    fn write(&mut self, addr: usize, value: u8);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// EEPROM held in RAM, optionally loaded from and saved to an image file
pub struct MemEeprom {
    bytes: Vec<u8>,
}

impl MemEeprom {
    /// erased EEPROM reads as 0xff
    pub fn new(size: usize) -> Self {
        MemEeprom {
            bytes: vec![0xff; size],
        }
    }

    /// load an image; a missing file is a freshly erased part
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        let mut eeprom = MemEeprom::new(size);
        if path.exists() {
            let image = fs::read(path)?;
            if image.len() != size {
                warn!(
                    "{} is {} bytes, expected {}",
                    path.display(),
                    image.len(),
                    size
                );
            }
            let n = image.len().min(size);
            eeprom.bytes[..n].copy_from_slice(&image[..n]);
        }
        Ok(eeprom)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.bytes)?;
        Ok(())
    }
}

impl Eeprom for MemEeprom {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, addr: usize) -> u8 {
        self.bytes.get(addr).copied().unwrap_or(0xff)
    }

    fn write(&mut self, addr: usize, value: u8) {
        if let Some(b) = self.bytes.get_mut(addr) {
            *b = value;
        }
    }
}

/// Partitions the EEPROM into up to 8 program slots, starting with slot 0 of
/// 256 bytes. Bit n of the map halves the size of slot n+1 relative to slot n.
/// So the default map 0x0a gives 256, 256, 128, 128, 64, 64, 64, 64 in 1K, and
/// 0x00 gives four full-size slots (the rest don't fit and are empty).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slots {
    capacity: usize,
    start: [usize; SLOT_COUNT],
    size: [usize; SLOT_COUNT],
}

impl Slots {
    pub fn new(map: u8, capacity: usize) -> Self {
        let mut slots = Slots {
            capacity,
            start: [0; SLOT_COUNT],
            size: [0; SLOT_COUNT],
        };
        slots.rebuild(map);
        slots
    }

    /// usable bytes of an EEPROM this long
    pub fn capacity_of(eeprom_len: usize, clock_has_sram: bool) -> usize {
        if clock_has_sram {
            eeprom_len
        } else {
            eeprom_len.saturating_sub(SETTINGS_RESERVE)
        }
    }

    pub fn rebuild(&mut self, map: u8) {
        let mut addr = 0;
        let mut size = MEMORY_SIZE;
        for slot in 0..SLOT_COUNT {
            if addr < self.capacity && size != 0 {
                self.start[slot] = addr;
                self.size[slot] = size.min(self.capacity - addr);
            } else {
                // run out
                self.start[slot] = 0;
                self.size[slot] = 0;
            }
            addr += size;
            if map & (1 << slot) != 0 {
                size /= 2;
            }
        }
        debug!("slots for map {:#04x}: {:?}", map, self.size);
    }

    pub fn start(&self, slot: u8) -> usize {
        self.start[slot as usize % SLOT_COUNT]
    }

    pub fn size(&self, slot: u8) -> usize {
        self.size[slot as usize % SLOT_COUNT]
    }

    fn usable(&self, slot: u8) -> bool {
        (slot as usize) < SLOT_COUNT && self.size[slot as usize] != 0
    }

    /// copy a slot into memory from 0. with preserve set the register
    /// addresses keep their current values
    pub fn restore(&self, slot: u8, eeprom: &dyn Eeprom, memory: &mut Memory, preserve: bool) -> bool {
        if !self.usable(slot) {
            return false;
        }
        let base = self.start(slot);
        for offset in 0..self.size(slot) {
            let addr = offset as u8;
            if preserve && Memory::is_register(addr) {
                continue;
            }
            memory.write(addr, eeprom.read(base + offset));
        }
        true
    }

    /// copy memory from 0 into a slot, as much as fits
    pub fn save(&self, slot: u8, eeprom: &mut dyn Eeprom, memory: &Memory) -> bool {
        if !self.usable(slot) {
            return false;
        }
        let base = self.start(slot);
        for offset in 0..self.size(slot) {
            eeprom.write(base + offset, memory.read(offset as u8));
        }
        true
    }
}
