/// # cpu
///
/// The KENBAK-1 has no register file: A, B, X and P live at memory addresses
/// 0-3, with the output latch, the three flag bytes and the input latch also
/// mapped into memory (see `memory`). So the whole machine state is 256 bytes
/// plus a little configuration.
///
/// The program counter is advanced once, at the end of each instruction, by
/// however many bytes the instruction consumed. Taken jumps overwrite P and
/// cancel that advance; a taken bit-test skip adds two more bytes to it.
/// `CpuConfig::legacy_program_counter` restores the older behaviour of bumping
/// P as each byte is fetched.
///
/// Opcodes that the hardware treats as no-ops, but that this machine reserves
/// for extensions, are handed to an `Extension`. Its answer decides whether the
/// cpu keeps running.
use crate::instruction::{AddressMode, Class, Condition, Instruction};
use crate::memory::{
    Memory, FLAG_CARRY, FLAG_OVERFLOW, REG_A, REG_B, REG_FLAGS_A, REG_P, REG_X,
};

/// custom instructions, hung off the reserved no-op encodings
pub trait Extension {
    /// called with the raw opcode and the whole of memory; return false to HALT
    fn on_extension(&mut self, _op: Instruction, _memory: &mut Memory) -> bool {
        true
    }
}

/// the plain machine: reserved opcodes are no-ops
pub struct NoExtension;

impl Extension for NoExtension {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuConfig {
    /// zero-fill right shifts and single-carry multi-bit rotates, as the
    /// first versions of this emulator did
    pub legacy_shift_rotate: bool,
    /// advance P during fetch instead of at the end of the instruction
    pub legacy_program_counter: bool,
}

pub struct Cpu {
    memory: Memory,
    config: CpuConfig,
    /// bytes this instruction has consumed, added to P when it completes
    consumed: u8,
}

impl Cpu {
    pub fn new(config: CpuConfig) -> Self {
        Cpu {
            memory: Memory::new(),
            config,
            consumed: 0,
        }
    }

    pub fn read(&self, addr: u8) -> u8 {
        self.memory.read(addr)
    }

    pub fn write(&mut self, addr: u8, value: u8) {
        self.memory.write(addr, value)
    }

    pub fn clear_all_memory(&mut self) {
        self.memory.clear()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn config(&self) -> CpuConfig {
        self.config
    }

    pub fn set_config(&mut self, config: CpuConfig) {
        self.config = config;
    }

    /// run one instruction with no extensions; false means HALT
    pub fn step(&mut self) -> bool {
        self.step_with(&mut NoExtension)
    }

    /// run one instruction, routing reserved opcodes to ext; false means HALT
    pub fn step_with<E: Extension + ?Sized>(&mut self, ext: &mut E) -> bool {
        self.consumed = 0;
        let at = self.next_byte();
        let op = Instruction(self.memory.read(at));
        let go = self.execute(op, ext);
        let p = self.memory.read(REG_P).wrapping_add(self.consumed);
        self.memory.write(REG_P, p);
        go
    }

    /// address of the next instruction byte
    fn next_byte(&mut self) -> u8 {
        let p = self.memory.read(REG_P);
        if self.config.legacy_program_counter {
            self.memory.write(REG_P, p.wrapping_add(1));
            p
        } else {
            let at = p.wrapping_add(self.consumed);
            self.consumed = self.consumed.wrapping_add(1);
            at
        }
    }

    /// fetch the operand byte and resolve it to an address
    fn operand_addr(&mut self, mode: AddressMode) -> u8 {
        let at = self.next_byte();
        let byte = self.memory.read(at);
        let x = self.memory.read(REG_X);
        match mode {
            AddressMode::Immediate => at,
            AddressMode::Direct => byte,
            AddressMode::Indirect => self.memory.read(byte),
            AddressMode::Indexed => byte.wrapping_add(x),
            AddressMode::IndirectIndexed => self.memory.read(byte).wrapping_add(x),
        }
    }

    fn execute<E: Extension + ?Sized>(&mut self, op: Instruction, ext: &mut E) -> bool {
        match op.class() {
            Class::Halt => return false,
            Class::Nop => {}
            Class::Extension => return ext.on_extension(op, &mut self.memory),
            Class::Shift => self.shift(op),
            Class::BitTest => self.bit_test(op),
            Class::Jump => self.jump(op),
            Class::OrAndNeg => return self.or_and_neg(op, ext),
            Class::Arith => self.arith(op),
        }
        true
    }

    fn shift(&mut self, op: Instruction) {
        let reg = if op.q() & 0x04 != 0 { REG_B } else { REG_A };
        let rotate = op.p() & 0x01 != 0;
        let left = op.p() & 0x02 != 0;
        let places = match op.q() & 0x03 {
            0 => 4,
            n => n,
        };
        let value = self.memory.read(reg);
        let value = if self.config.legacy_shift_rotate {
            legacy_shift_rotate(value, places, left, rotate)
        } else {
            shift_rotate(value, places, left, rotate)
        };
        self.memory.write(reg, value);
    }

    fn bit_test(&mut self, op: Instruction) {
        let mask = 1u8 << op.q();
        let addr = self.operand_addr(AddressMode::Direct);
        let one = op.p() & 0x01 != 0;
        let value = self.memory.read(addr);
        if op.p() & 0x02 != 0 {
            // skip the following two-byte instruction if the bit matches
            if (value & mask != 0) == one {
                if self.config.legacy_program_counter {
                    let p = self.memory.read(REG_P);
                    self.memory.write(REG_P, p.wrapping_add(2));
                } else {
                    self.consumed = self.consumed.wrapping_add(2);
                }
            }
        } else if one {
            self.memory.write(addr, value | mask);
        } else {
            self.memory.write(addr, value & !mask);
        }
    }

    fn jump(&mut self, op: Instruction) {
        let and_mark = op.q() & 0x02 != 0;
        let mode = AddressMode::from_bits((op.q() & 0x01) + 3);
        let test = self.memory.read(op.p());
        let target_at = self.operand_addr(mode);
        let mut target = self.memory.read(target_at);

        let taken = op.p() == 3 || Condition::from_bits(op.r()).holds(test);
        if taken {
            if and_mark {
                let ret = self.memory.read(REG_P).wrapping_add(self.consumed);
                self.memory.write(target, ret);
                target = target.wrapping_add(1);
            }
            self.memory.write(REG_P, target);
            self.consumed = 0;
        }
    }

    fn or_and_neg<E: Extension + ?Sized>(&mut self, op: Instruction, ext: &mut E) -> bool {
        let operand = self.operand_addr(AddressMode::from_bits(op.r()));
        let a = self.memory.read(REG_A);
        let rhs = self.memory.read(operand);
        match op.q() {
            0 => self.memory.write(REG_A, a | rhs),
            1 => return ext.on_extension(op, &mut self.memory),
            2 => self.memory.write(REG_A, a & rhs),
            // flags are untouched
            3 => self.memory.write(REG_A, rhs.wrapping_neg()),
            _ => {}
        }
        true
    }

    fn arith(&mut self, op: Instruction) {
        let lhs = op.p();
        let flags = REG_FLAGS_A + op.p();
        let operand = self.operand_addr(AddressMode::from_bits(op.r()));
        let l = self.memory.read(lhs);
        let r = self.memory.read(operand);
        match op.q() {
            0 => {
                let (result, f) = add(l, r);
                self.memory.write(lhs, result);
                self.memory.write(flags, f);
            }
            1 => {
                let (result, f) = sub(l, r);
                self.memory.write(lhs, result);
                self.memory.write(flags, f);
            }
            2 => self.memory.write(lhs, r),
            3 => self.memory.write(operand, l),
            _ => {}
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new(CpuConfig::default())
    }
}

/// shift or rotate one place at a time; right shifts sign-fill
pub fn shift_rotate(mut value: u8, places: u8, left: bool, rotate: bool) -> u8 {
    for _ in 0..places {
        if left {
            let top = value & 0x80;
            value <<= 1;
            if rotate && top != 0 {
                value |= 0x01;
            }
        } else {
            let bottom = value & 0x01;
            let sign = value & 0x80;
            value >>= 1;
            if rotate && bottom != 0 {
                value |= 0x80;
            }
            if !rotate && sign != 0 {
                value |= 0x80;
            }
        }
    }
    value
}

/// the old behaviour: one shift of all places, carrying only the first bit
/// round on a rotate, and zero-filling right shifts
pub fn legacy_shift_rotate(value: u8, places: u8, left: bool, rotate: bool) -> u8 {
    if left {
        let top = value & 0x80;
        let mut value = value << places;
        if rotate && top != 0 {
            value |= 0x01;
        }
        value
    } else {
        let bottom = value & 0x01;
        let mut value = value >> places;
        if rotate && bottom != 0 {
            value |= 0x80;
        }
        value
    }
}

/// 8-bit add; returns the sum and a fresh flags byte
pub fn add(lhs: u8, rhs: u8) -> (u8, u8) {
    let sum = lhs as u16 + rhs as u16;
    let signed = lhs as i8 as i16 + rhs as i8 as i16;
    (sum as u8, flags(sum, signed))
}

/// 8-bit subtract; carry means borrow
pub fn sub(lhs: u8, rhs: u8) -> (u8, u8) {
    let diff = (lhs as u16).wrapping_sub(rhs as u16);
    let signed = lhs as i8 as i16 - rhs as i8 as i16;
    (diff as u8, flags(diff, signed))
}

fn flags(wide: u16, signed: i16) -> u8 {
    let mut f = 0;
    if wide & 0xff00 != 0 {
        f |= FLAG_CARRY;
    }
    if !(-128..=127).contains(&signed) {
        f |= FLAG_OVERFLOW;
    }
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{REG_FLAGS_B, REG_OUTPUT};

    /// cpu with a program at 4 and P pointing at it
    fn cpu_with(program: &[u8]) -> Cpu {
        let mut cpu = Cpu::default();
        cpu.write(REG_P, 4);
        cpu.memory_mut().load(4, program);
        cpu
    }

    #[test]
    fn test_halt() {
        let mut cpu = cpu_with(&[0o000]);
        assert!(!cpu.step());
        let mut cpu = cpu_with(&[0o100]);
        assert!(!cpu.step());
        assert_eq!(cpu.read(REG_P), 5);
    }

    #[test]
    fn test_nop() {
        let mut cpu = cpu_with(&[0o200, 0o300]);
        assert!(cpu.step());
        assert!(cpu.step());
        assert_eq!(cpu.read(REG_P), 6);
    }

    #[test]
    fn test_every_opcode_and_operand_is_defined() {
        for op in 0..=255u8 {
            for operand in 0..=255u8 {
                let mut cpu = cpu_with(&[op, operand]);
                let go = cpu.step();
                let expect_halt = op & 0o307 == 0o000 || op & 0o307 == 0o100;
                assert_eq!(go, !expect_halt, "opcode {:03o}", op);
            }
        }
    }

    #[test]
    fn test_program_counter_advances_by_length() {
        for op in 0..=255u8 {
            let i = Instruction(op);
            if i.class() == Class::Jump || i.class() == Class::BitTest {
                continue;
            }
            // operand 0o20 keeps stores away from P
            let mut cpu = cpu_with(&[op, 0o20]);
            cpu.step();
            let len = if i.is_two_byte() { 2 } else { 1 };
            assert_eq!(cpu.read(REG_P), 4 + len, "opcode {:03o}", op);
        }
    }

    #[test]
    fn test_rotate_left_group() {
        for v in 0..=255u8 {
            let mut once = v;
            for _ in 0..4 {
                once = shift_rotate(once, 1, true, true);
            }
            assert_eq!(once, shift_rotate(v, 4, true, true));
            assert_eq!(shift_rotate(v, 4, true, true), v.rotate_left(4));
            assert_eq!(shift_rotate(v, 3, false, true), v.rotate_right(3));
        }
    }

    #[test]
    fn test_right_shift_sign_fills() {
        for v in 0..=255u8 {
            for places in 1..=4u8 {
                let shifted = shift_rotate(v, places, false, false);
                assert_eq!(shifted & 0x80, v & 0x80);
                assert_eq!(shifted, ((v as i8) >> places) as u8);
            }
        }
    }

    #[test]
    fn test_left_shift_zero_fills() {
        assert_eq!(shift_rotate(0xff, 2, true, false), 0xfc);
    }

    #[test]
    fn test_legacy_shift_rotate() {
        // right shift zero-fills
        assert_eq!(legacy_shift_rotate(0x80, 1, false, false), 0x40);
        // only the first bit rolls round
        assert_eq!(legacy_shift_rotate(0b1100_0000, 2, true, true), 0b0000_0001);
        assert_eq!(legacy_shift_rotate(0x01, 1, false, true), 0x80);
    }

    #[test]
    fn test_shift_opcodes() {
        // 0o001 right shift A by 4
        let mut cpu = cpu_with(&[0o001]);
        cpu.write(REG_A, 0x80);
        cpu.step();
        assert_eq!(cpu.read(REG_A), 0xf8);

        // 0o351 left rotate B by 1
        let mut cpu = cpu_with(&[0o351]);
        cpu.write(REG_B, 0x81);
        cpu.step();
        assert_eq!(cpu.read(REG_B), 0x03);

        let mut cpu = cpu_with(&[0o001]);
        cpu.set_config(CpuConfig {
            legacy_shift_rotate: true,
            ..CpuConfig::default()
        });
        cpu.write(REG_A, 0x80);
        cpu.step();
        assert_eq!(cpu.read(REG_A), 0x08);
    }

    #[test]
    fn test_add_flags_exhaustive() {
        for l in 0..=255u8 {
            for r in 0..=255u8 {
                let (sum, f) = add(l, r);
                assert_eq!(sum, l.wrapping_add(r));
                assert_eq!(f & FLAG_CARRY != 0, l.checked_add(r).is_none());
                assert_eq!(f & FLAG_OVERFLOW != 0, (l as i8).checked_add(r as i8).is_none());
            }
        }
    }

    #[test]
    fn test_sub_flags_exhaustive() {
        for l in 0..=255u8 {
            for r in 0..=255u8 {
                let (diff, f) = sub(l, r);
                assert_eq!(diff, l.wrapping_sub(r));
                assert_eq!(f & FLAG_CARRY != 0, l.checked_sub(r).is_none());
                assert_eq!(f & FLAG_OVERFLOW != 0, (l as i8).checked_sub(r as i8).is_none());
            }
        }
    }

    #[test]
    fn test_add_overwrites_flags() {
        // ADD B #1, B = 0xff
        let mut cpu = cpu_with(&[0o103, 1, 0o103, 1]);
        cpu.write(REG_B, 0xff);
        cpu.step();
        assert_eq!(cpu.read(REG_B), 0);
        assert_eq!(cpu.read(REG_FLAGS_B), FLAG_CARRY);
        cpu.step();
        assert_eq!(cpu.read(REG_B), 1);
        assert_eq!(cpu.read(REG_FLAGS_B), 0);
    }

    #[test]
    fn test_load_store_modes() {
        // LDA #0o77; STA 0o200; LDX #2; LDA 0o40,X; LDB (0o50); LDA (0o50),X
        let mut cpu = cpu_with(&[
            0o023, 0o77, 0o034, 0o200, 0o223, 2, 0o026, 0o40, 0o125, 0o50, 0o027, 0o50,
        ]);
        cpu.write(0o42, 0o11);
        cpu.write(0o50, 0o60);
        cpu.write(0o60, 0o12);
        cpu.write(0o62, 0o13);
        assert!(cpu.step());
        assert_eq!(cpu.read(REG_A), 0o77);
        assert!(cpu.step());
        assert_eq!(cpu.read(REG_OUTPUT), 0o77);
        assert!(cpu.step());
        assert_eq!(cpu.read(REG_X), 2);
        assert!(cpu.step());
        assert_eq!(cpu.read(REG_A), 0o11);
        assert!(cpu.step());
        assert_eq!(cpu.read(REG_B), 0o12);
        assert!(cpu.step());
        assert_eq!(cpu.read(REG_A), 0o13);
        assert_eq!(cpu.read(REG_P), 16);
    }

    #[test]
    fn test_or_and_neg() {
        // ORA #0x0f; ANDA #0x3c; NEGA #5
        let mut cpu = cpu_with(&[0o303, 0x0f, 0o323, 0x3c, 0o333, 5]);
        cpu.write(REG_A, 0x30);
        cpu.step();
        assert_eq!(cpu.read(REG_A), 0x3f);
        cpu.step();
        assert_eq!(cpu.read(REG_A), 0x3c);
        cpu.write(REG_FLAGS_A, 0x03);
        cpu.step();
        assert_eq!(cpu.read(REG_A), 0xfb);
        assert_eq!(cpu.read(REG_FLAGS_A), 0x03);
    }

    #[test]
    fn test_bit_set_then_skip() {
        for bit in 0..8u8 {
            // SET1 bit; SKIP-if-clear bit; then a two-byte LDA #1
            let mut cpu = cpu_with(&[
                0o002 | (bit << 3) | 0o100,
                0o40,
                0o202 | (bit << 3),
                0o40,
                0o023,
                1,
            ]);
            cpu.step();
            assert_eq!(cpu.read(0o40), 1 << bit);
            cpu.step();
            assert_eq!(cpu.read(REG_P), 8, "bit {} skipped on clear", bit);

            // SET1 bit; SKIP-if-set bit
            let mut cpu = cpu_with(&[
                0o002 | (bit << 3) | 0o100,
                0o40,
                0o302 | (bit << 3),
                0o40,
                0o023,
                1,
            ]);
            cpu.step();
            cpu.step();
            assert_eq!(cpu.read(REG_P), 10, "bit {} not skipped on set", bit);
        }
    }

    #[test]
    fn test_bit_clear() {
        // SET0 bit 3 at 0o40
        let mut cpu = cpu_with(&[0o032, 0o40]);
        cpu.write(0o40, 0xff);
        cpu.step();
        assert_eq!(cpu.read(0o40), 0xf7);
    }

    #[test]
    fn test_conditional_jumps() {
        // JPD A != 0 to 0o20
        let mut cpu = cpu_with(&[0o043, 0o20]);
        cpu.step();
        assert_eq!(cpu.read(REG_P), 6);
        let mut cpu = cpu_with(&[0o043, 0o20]);
        cpu.write(REG_A, 1);
        cpu.step();
        assert_eq!(cpu.read(REG_P), 0o20);
        // JPD B == 0
        let mut cpu = cpu_with(&[0o144, 0o20]);
        cpu.step();
        assert_eq!(cpu.read(REG_P), 0o20);
        // JPI unconditional through 0o30
        let mut cpu = cpu_with(&[0o353, 0o30]);
        cpu.write(0o30, 0o100);
        cpu.step();
        assert_eq!(cpu.read(REG_P), 0o100);
    }

    #[test]
    fn test_jump_and_mark() {
        for p in [4u8, 0o10, 0o177] {
            let mut cpu = Cpu::default();
            cpu.write(REG_P, p);
            cpu.write(p, 0o363);
            cpu.write(p.wrapping_add(1), 0o220);
            assert!(cpu.step());
            assert_eq!(cpu.read(0o220), p + 2);
            assert_eq!(cpu.read(REG_P), 0o221);
        }
    }

    #[test]
    fn test_store_into_program_counter() {
        // STA 3 with A = 0o20: P is bumped after the store
        let mut cpu = cpu_with(&[0o034, REG_P]);
        cpu.write(REG_A, 0o20);
        cpu.step();
        assert_eq!(cpu.read(REG_P), 0o22);

        let mut cpu = cpu_with(&[0o034, REG_P]);
        cpu.set_config(CpuConfig {
            legacy_program_counter: true,
            ..CpuConfig::default()
        });
        cpu.write(REG_A, 0o20);
        cpu.step();
        assert_eq!(cpu.read(REG_P), 0o20);
    }

    #[test]
    fn test_legacy_program_counter_skip_and_jump() {
        let legacy = CpuConfig {
            legacy_program_counter: true,
            ..CpuConfig::default()
        };
        let mut cpu = cpu_with(&[0o302, 0o40, 0o023, 1]);
        cpu.set_config(legacy);
        cpu.write(0o40, 1);
        cpu.step();
        assert_eq!(cpu.read(REG_P), 8);

        let mut cpu = cpu_with(&[0o363, 0o220]);
        cpu.set_config(legacy);
        cpu.step();
        assert_eq!(cpu.read(0o220), 6);
        assert_eq!(cpu.read(REG_P), 0o221);
    }

    struct Recorder {
        seen: Vec<u8>,
        go: bool,
    }

    impl Extension for Recorder {
        fn on_extension(&mut self, op: Instruction, memory: &mut Memory) -> bool {
            self.seen.push(op.0);
            memory.write(REG_B, 0x55);
            self.go
        }
    }

    #[test]
    fn test_extension_hook() {
        let mut ext = Recorder {
            seen: Vec::new(),
            go: true,
        };
        let mut cpu = cpu_with(&[0o360, 0o313, 0, 0o200]);
        assert!(cpu.step_with(&mut ext));
        assert!(cpu.step_with(&mut ext));
        // plain no-op never reaches the hook
        assert!(cpu.step_with(&mut ext));
        assert_eq!(ext.seen, vec![0o360, 0o313]);
        assert_eq!(cpu.read(REG_B), 0x55);
        assert_eq!(cpu.read(REG_P), 8);

        let mut ext = Recorder {
            seen: Vec::new(),
            go: false,
        };
        let mut cpu = cpu_with(&[0o360]);
        assert!(!cpu.step_with(&mut ext));
    }

    #[test]
    fn test_default_extension_is_a_nop() {
        let mut cpu = cpu_with(&[0o360, 0o313, 0]);
        assert!(cpu.step());
        assert!(cpu.step());
        assert_eq!(cpu.read(REG_P), 7);
    }
}
