/// # instruction
///
/// Every opcode byte splits into three octal fields, PQR:
///
///   P (bits 6-7)  register / sub-operation
///   Q (bits 3-5)  operation
///   R (bits 0-2)  class or addressing mode
///
/// The class is picked in a fixed order: R==0 misc, R==1 shift/rotate,
/// R==2 bit test/set, then Q>=4 jumps, then P==3 or/and/negate, and anything
/// left over is add/sub/load/store. Every byte lands in exactly one class.

/// a single opcode byte
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction(pub u8);

/// what an opcode does, before looking at its operand
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    Halt,
    Nop,
    /// one-byte no-op with Q != 0, handed to the extension hook
    Extension,
    Shift,
    BitTest,
    Jump,
    OrAndNeg,
    Arith,
}

/// where a two-byte instruction finds its operand
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressMode {
    /// the operand byte itself
    Immediate,
    Direct,
    Indirect,
    Indexed,
    IndirectIndexed,
}

/// jump predicates over the test register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Never,
    NotEqual,
    Equal,
    Less,
    GreaterEqual,
    Greater,
}

impl Instruction {
    pub fn p(self) -> u8 {
        field(self.0, 6, 2)
    }

    pub fn q(self) -> u8 {
        field(self.0, 3, 3)
    }

    pub fn r(self) -> u8 {
        field(self.0, 0, 3)
    }

    pub fn class(self) -> Class {
        match self.r() {
            0 if self.p() < 2 => Class::Halt,
            0 if self.q() == 0 => Class::Nop,
            0 => Class::Extension,
            1 => Class::Shift,
            2 => Class::BitTest,
            _ if self.q() > 3 => Class::Jump,
            _ if self.p() == 3 => Class::OrAndNeg,
            _ => Class::Arith,
        }
    }

    /// true if the instruction carries an operand byte
    pub fn is_two_byte(self) -> bool {
        !matches!(self.class(), Class::Halt | Class::Nop | Class::Extension | Class::Shift)
    }
}

fn field(byte: u8, bit: u8, width: u8) -> u8 {
    (byte >> bit) & (0xff >> (8 - width))
}

impl AddressMode {
    /// modes 3..=7; anything else behaves as immediate
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            4 => AddressMode::Direct,
            5 => AddressMode::Indirect,
            6 => AddressMode::Indexed,
            7 => AddressMode::IndirectIndexed,
            _ => AddressMode::Immediate,
        }
    }
}

impl Condition {
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            3 => Condition::NotEqual,
            4 => Condition::Equal,
            5 => Condition::Less,
            6 => Condition::GreaterEqual,
            7 => Condition::Greater,
            _ => Condition::Never,
        }
    }

    /// test a register value as a signed byte
    pub fn holds(self, value: u8) -> bool {
        let negative = value & 0x80 != 0;
        match self {
            Condition::Never => false,
            Condition::NotEqual => value != 0,
            Condition::Equal => value == 0,
            Condition::Less => negative,
            Condition::GreaterEqual => !negative || value == 0,
            Condition::Greater => !negative && value != 0,
        }
    }
}
