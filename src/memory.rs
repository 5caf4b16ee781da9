use crate::error::{KenbakError, Result};
use std::io;

// NB. addresses are u8 on the kenbak, so every address is valid and wraps

/// how much RAM we have
pub const MEMORY_SIZE: usize = 256;

/// memory-mapped registers; reading or writing these addresses *is* the
/// register access
pub const REG_A: u8 = 0o000;
pub const REG_B: u8 = 0o001;
pub const REG_X: u8 = 0o002;
pub const REG_P: u8 = 0o003;
pub const REG_OUTPUT: u8 = 0o200;
pub const REG_FLAGS_A: u8 = 0o201;
pub const REG_FLAGS_B: u8 = 0o202;
pub const REG_FLAGS_X: u8 = 0o203;
pub const REG_INPUT: u8 = 0o377;

/// bits in the flags registers
pub const FLAG_OVERFLOW: u8 = 0x01;
pub const FLAG_CARRY: u8 = 0x02;

/// every address that doubles as a register
pub const REGISTERS: [u8; 9] = [
    REG_A,
    REG_B,
    REG_X,
    REG_P,
    REG_OUTPUT,
    REG_FLAGS_A,
    REG_FLAGS_B,
    REG_FLAGS_X,
    REG_INPUT,
];

/// The whole address space: 256 bytes, registers included.
///
///   0o000-0o003  A, B, X, P
///   0o004-0o177  program/data
///   0o200        output latch (the data LEDs while running)
///   0o201-0o203  flags for A, B, X (bit0 overflow, bit1 carry)
///   0o204-0o376  program/data
///   0o377        input latch (the data buttons)
#[derive(Clone)]
pub struct Memory {
    bytes: [u8; MEMORY_SIZE],
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            bytes: [0u8; MEMORY_SIZE],
        }
    }

    pub fn read(&self, addr: u8) -> u8 {
        self.bytes[addr as usize]
    }

    pub fn write(&mut self, addr: u8, value: u8) {
        self.bytes[addr as usize] = value;
    }

    /// zero the lot, registers included
    pub fn clear(&mut self) {
        self.bytes = [0u8; MEMORY_SIZE];
    }

    /// copy a chunk of bytes in from addr, wrapping at the top of memory
    pub fn load(&mut self, addr: u8, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.write(addr.wrapping_add(i as u8), *b);
        }
    }

    /// load a whole program image from 0; the image can't be bigger than memory
    pub fn load_from(&mut self, reader: &mut impl io::Read) -> Result<usize> {
        let mut buf = Vec::new();
        let len = reader.read_to_end(&mut buf)?;
        if len > MEMORY_SIZE {
            return Err(KenbakError::ImageTooLarge(len));
        }
        self.bytes[..len].copy_from_slice(&buf);
        Ok(len)
    }

    pub fn is_register(addr: u8) -> bool {
        REGISTERS.contains(&addr)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_zeroed() {
        let m = Memory::new();
        assert_eq!(m.as_slice(), &[0; 256]);
    }

    #[test]
    fn test_registers_alias_memory() {
        let mut m = Memory::new();
        m.write(0, 0x42);
        assert_eq!(m.read(REG_A), 0x42);
        m.write(REG_INPUT, 7);
        assert_eq!(m.as_slice()[255], 7);
    }

    #[test]
    fn test_load_wraps() {
        let mut m = Memory::new();
        m.load(0xfe, &[1, 2, 3, 4]);
        assert_eq!(m.read(0xfe), 1);
        assert_eq!(m.read(0xff), 2);
        assert_eq!(m.read(0x00), 3);
        assert_eq!(m.read(0x01), 4);
    }

    #[test]
    fn test_load_from_reader() -> Result<()> {
        let mut m = Memory::new();
        let mut src: &[u8] = &[0, 0, 0, 4, 0o103, 1];
        assert_eq!(m.load_from(&mut src)?, 6);
        assert_eq!(m.read(REG_P), 4);
        assert_eq!(m.read(4), 0o103);
        Ok(())
    }

    #[test]
    fn test_load_from_rejects_big_image() {
        let mut m = Memory::new();
        let mut src: &[u8] = &[0; 257];
        assert!(matches!(
            m.load_from(&mut src),
            Err(KenbakError::ImageTooLarge(257))
        ));
    }

    #[test]
    fn test_clear() {
        let mut m = Memory::new();
        m.load(0, &[9; 256]);
        m.clear();
        assert_eq!(m.as_slice(), &[0; 256]);
    }

    #[test]
    fn test_is_register() {
        assert!(Memory::is_register(REG_P));
        assert!(Memory::is_register(REG_FLAGS_X));
        assert!(!Memory::is_register(4));
        assert!(!Memory::is_register(0o204));
    }
}
