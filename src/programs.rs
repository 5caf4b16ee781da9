/// # programs
///
/// The built-in programs, loaded with Stop+BitN:
///
///   0 counter       count up on the output LEDs
///   1 cylon         a light bouncing back and forth
///   2 count clock   hours as a bar, then minutes in fives, blinking
///   3 BCD clock     hours then minutes in BCD, scrolling
///   4 binary clock  hours on the control LEDs, minutes on the data LEDs
///   5 blinken       random lights
///   6 sieve         primes to 255, one per Run
///   7 set clock     A = hours, B = minutes (BCD), then Run
///
/// The clocks rely on the system call extension and halt straight away on a
/// plain machine.
///
/// The bigger programs are built with a tiny two-pass assembler: the first
/// pass records where each label lands (label references read as 0), the
/// second emits the real operands.
use crate::config::Item;
use crate::memory::{Memory, REG_A, REG_B, REG_OUTPUT, REG_X};
use log::debug;
use std::collections::HashMap;

pub const HALT: u8 = 0o000;
pub const NOOP: u8 = 0o300;
pub const SYSX: u8 = 0o360;

// constant operand
pub const LDA_C: u8 = 0o023;
pub const LDB_C: u8 = 0o123;
pub const LDX_C: u8 = 0o223;
pub const SUA_C: u8 = 0o013;
pub const SUB_C: u8 = 0o113;
pub const SUX_C: u8 = 0o213;
pub const ADA_C: u8 = 0o003;
pub const ADB_C: u8 = 0o103;
pub const ADX_C: u8 = 0o203;
pub const AND_C: u8 = 0o323;

// direct operand
pub const STA_A: u8 = 0o034;
pub const STB_A: u8 = 0o134;
pub const STX_A: u8 = 0o234;
pub const LDA_A: u8 = 0o024;
pub const LDB_A: u8 = 0o124;
pub const LDX_A: u8 = 0o224;
pub const ADA_A: u8 = 0o004;
pub const ADB_A: u8 = 0o104;
pub const SUA_A: u8 = 0o014;

// indexed
pub const LDA_X: u8 = 0o026;

pub const JMP_U: u8 = 0o343;
pub const JSR_A: u8 = 0o363;
pub const RET_A: u8 = 0o353;

pub const JMP_A_ZERO: u8 = 0o044;
pub const JMP_A_NEG: u8 = 0o045;
pub const JMP_B_GE: u8 = 0o146;
pub const JMP_X_NZ: u8 = 0o243;
/// return (jump indirect) if X is zero
pub const RET_X_ZERO: u8 = 0o254;

pub const SHR_A_1: u8 = 0o011;
pub const SHR_A_4: u8 = 0o001;
pub const ROR_A_1: u8 = 0o111;
pub const SHL_A_1: u8 = 0o211;
pub const ROL_A_1: u8 = 0o311;

/// skip the next instruction if bit n of the operand is clear
pub const fn skip_clear(bit: u8) -> u8 {
    0o202 | (bit << 3)
}

/// skip the next instruction if bit n of the operand is set
pub const fn skip_set(bit: u8) -> u8 {
    0o302 | (bit << 3)
}

/// system call selector for writing an item
pub const fn sys_write(item: Item) -> u8 {
    0x80 | item as u8
}

/// system call selector for reading an item
pub const fn sys_read(item: Item) -> u8 {
    item as u8
}

pub const PROGRAM_COUNT: u8 = 8;

pub struct Assembler<'m> {
    memory: &'m mut Memory,
    at: u8,
    labels: HashMap<&'static str, u8>,
    final_pass: bool,
}

impl<'m> Assembler<'m> {
    pub fn new(memory: &'m mut Memory) -> Self {
        Assembler {
            memory,
            at: 0,
            labels: HashMap::new(),
            final_pass: false,
        }
    }

    /// run the source twice, so forward references resolve
    pub fn assemble(mut self, source: fn(&mut Assembler)) {
        for pass in 0..2 {
            self.final_pass = pass == 1;
            self.at = 0;
            source(&mut self);
        }
    }

    pub fn org(&mut self, addr: u8) {
        self.at = addr;
    }

    pub fn equ(&mut self, byte: u8) {
        self.memory.write(self.at, byte);
        self.at = self.at.wrapping_add(1);
    }

    pub fn op1(&mut self, op: u8) {
        self.equ(op);
    }

    pub fn op2(&mut self, op: u8, operand: u8) {
        self.equ(op);
        self.equ(operand);
    }

    pub fn def(&mut self, label: &'static str) {
        self.labels.insert(label, self.at);
    }

    pub fn lbl(&self, label: &'static str) -> u8 {
        if !self.final_pass {
            return 0;
        }
        match self.labels.get(label) {
            Some(addr) => *addr,
            None => {
                debug!("undefined label {}", label);
                0
            }
        }
    }
}

const COUNTER: [u8; 10] = [0, 0, 0, 4, ADB_C, 1, STB_A, REG_OUTPUT, JMP_U, 4];

/// the way back rotates rather than shifts, so the sign-filling right shift
/// doesn't smear the light
const CYLON: [u8; 24] = [
    0o000, 0o000, 0o000, 0o004, 0o023, 0o001, 0o034, 0o200, 0o211, 0o034, 0o200, 0o372, 0o200,
    0o343, 0o010, 0o111, 0o034, 0o200, 0o202, 0o200, 0o343, 0o010, 0o343, 0o017,
];

/// sieve of Eratosthenes. the list of candidates overlays the output and flag
/// registers, so reads and writes go through helpers that step around them
const SIEVE: [u8; 120] = [
    0o000, 0o000, 0o000, 0o004, 0o034, 0o200, 0o223, 0o200, 0o023, 0o002, 0o363, 0o111, 0o203,
    0o001, 0o023, 0o003, 0o363, 0o111, 0o003, 0o002, 0o203, 0o001, 0o243, 0o020, 0o223, 0o200,
    0o203, 0o001, 0o363, 0o140, 0o044, 0o066, 0o234, 0o171, 0o363, 0o140, 0o034, 0o167, 0o204,
    0o000, 0o212, 0o203, 0o343, 0o064, 0o023, 0o000, 0o363, 0o111, 0o204, 0o167, 0o343, 0o050,
    0o224, 0o171, 0o203, 0o001, 0o243, 0o034, 0o223, 0o200, 0o363, 0o140, 0o044, 0o103, 0o034,
    0o200, 0o000, 0o203, 0o001, 0o243, 0o074, 0o343, 0o072, 0o300, 0o234, 0o170, 0o234, 0o001,
    0o113, 0o204, 0o146, 0o132, 0o213, 0o004, 0o036, 0o000, 0o224, 0o170, 0o353, 0o111, 0o036,
    0o000, 0o224, 0o170, 0o353, 0o111, 0o300, 0o234, 0o170, 0o234, 0o001, 0o113, 0o204, 0o146,
    0o161, 0o213, 0o004, 0o026, 0o000, 0o224, 0o170, 0o353, 0o140, 0o026, 0o000, 0o224, 0o170,
    0o353, 0o140, 0o000,
];

/// load built-in program `index` over the top of memory. false if there's
/// no such program
pub fn load(index: u8, memory: &mut Memory) -> bool {
    let source: fn(&mut Assembler) = match index {
        0 => {
            memory.load(0, &COUNTER);
            return true;
        }
        1 => {
            memory.load(0, &CYLON);
            return true;
        }
        6 => {
            memory.load(0, &SIEVE);
            return true;
        }
        2 => count_clock,
        3 => bcd_clock,
        4 => binary_clock,
        5 => blinken,
        7 => set_clock,
        _ => return false,
    };
    Assembler::new(memory).assemble(source);
    true
}

/// registers, with P pointing just past them
fn preamble(a: &mut Assembler) {
    a.org(0);
    a.equ(0);
    a.equ(0);
    a.equ(0);
    a.equ(4);
}

/// halt unless the system call extension answers the probe
fn require_extensions(a: &mut Assembler) {
    a.op2(LDA_C, 0xff);
    a.op1(SYSX);
    a.op2(skip_clear(7), REG_A);
    a.op1(NOOP);
    a.op1(HALT);
}

fn clear_control_leds(a: &mut Assembler) {
    a.op2(LDA_C, sys_write(Item::Leds));
    a.op2(LDB_C, 0);
    a.op1(SYSX);
}

/// select the delay item, the caller loads B with the milliseconds
fn sys_delay(a: &mut Assembler) {
    a.op2(LDA_C, sys_write(Item::DelayMillis));
}

/// hour from the clock as 0..=11 in "display" and X
fn fetch_hour(a: &mut Assembler) {
    a.op2(LDA_C, sys_read(Item::ClockHours24));
    a.op1(SYSX);
    a.op2(JSR_A, a.lbl("bcd2dec"));
    a.op2(STB_A, a.lbl("display"));
    a.op2(LDA_A, a.lbl("display"));
    a.op2(SUA_C, 12);
    // keep A-12 if that's not negative
    a.op2(skip_clear(7), REG_A);
    a.op2(LDA_A, a.lbl("display"));
    a.op2(STA_A, a.lbl("display"));
    a.op2(LDX_A, a.lbl("display"));
}

/// B = BCD B as decimal
fn bcd2dec(a: &mut Assembler) {
    a.def("bcd2dec");
    a.op1(NOOP);
    a.op2(LDA_A, REG_B);
    a.op2(LDB_C, 0);
    a.op2(JMP_A_NEG, a.lbl("bcd_fix"));
    a.def("bcd_loop");
    a.op2(SUA_C, 0o020);
    a.op2(JMP_A_NEG, a.lbl("bcd_done"));
    a.op2(ADB_C, 10);
    a.op2(JMP_U, a.lbl("bcd_loop"));
    a.def("bcd_fix");
    a.op2(SUA_C, 0o200);
    a.op2(ADB_C, 80);
    a.op2(JMP_U, a.lbl("bcd_loop"));
    a.def("bcd_done");
    a.op2(ADA_C, 0o020);
    a.op2(ADB_A, REG_A);
    a.op2(RET_A, a.lbl("bcd2dec"));
}

/// flash "display" with "blink" added, `count` times, 500ms a phase
fn do_blink(a: &mut Assembler, count: u8) {
    a.def("do_blink");
    a.op1(NOOP);
    a.op2(LDX_C, count);
    a.op2(LDA_A, a.lbl("display"));
    a.def("blink_loop");
    a.op2(STA_A, REG_OUTPUT);
    sys_delay(a);
    a.op2(LDB_C, 250);
    a.op1(SYSX);
    a.op1(SYSX);
    a.op2(LDA_A, REG_OUTPUT);
    a.op2(ADA_A, a.lbl("blink"));
    a.op2(STA_A, REG_OUTPUT);
    sys_delay(a);
    a.op2(LDB_C, 250);
    a.op1(SYSX);
    a.op1(SYSX);
    a.op2(LDA_A, REG_OUTPUT);
    a.op2(SUA_A, a.lbl("blink"));
    a.op2(SUX_C, 1);
    a.op2(RET_X_ZERO, a.lbl("do_blink"));
    a.op2(JMP_U, a.lbl("blink_loop"));
}

fn count_clock(a: &mut Assembler) {
    preamble(a);
    require_extensions(a);
    clear_control_leds(a);

    a.def("show_hr");
    fetch_hour(a);
    a.op2(LDA_X, a.lbl("hr_tab"));
    a.op2(STA_A, a.lbl("display"));
    a.op2(LDA_C, 0);
    a.op2(STA_A, a.lbl("blink"));
    a.op2(JSR_A, a.lbl("do_blink"));

    a.op2(LDA_C, sys_read(Item::ClockMinutes));
    a.op1(SYSX);
    a.op2(JSR_A, a.lbl("bcd2dec"));
    a.op2(STB_A, a.lbl("display"));
    // X counts fives
    a.op2(LDX_C, 255);
    a.def("min_loop");
    a.op2(ADX_C, 1);
    a.op2(SUB_C, 5);
    a.op2(skip_set(7), REG_B);
    a.op2(JMP_U, a.lbl("min_loop"));
    a.op2(skip_set(0), REG_X);
    a.op2(JMP_U, a.lbl("even_x"));
    a.op2(LDA_X, a.lbl("min_tab_5s"));
    a.op2(STA_A, a.lbl("display"));
    a.op2(LDA_X, a.lbl("min_tab_10s"));
    a.op2(ADA_C, 0o200);
    a.op2(JMP_U, a.lbl("save_blink"));
    a.def("even_x");
    a.op2(LDA_X, a.lbl("min_tab_10s"));
    a.op2(STA_A, a.lbl("display"));
    a.op2(LDA_C, 0o200);
    a.def("save_blink");
    a.op2(STA_A, a.lbl("blink"));
    a.op2(JSR_A, a.lbl("do_blink"));
    a.op2(JMP_U, a.lbl("show_hr"));

    do_blink(a, 5);

    // past the output and flag registers
    a.org(0o204);
    bcd2dec(a);

    a.def("display");
    a.equ(0);
    a.def("blink");
    a.equ(0);
    a.def("hr_tab");
    for b in [0o277, 0o001, 0o003, 0o007, 0o017, 0o037, 0o077, 0o201, 0o203, 0o207, 0o217, 0o237] {
        a.equ(b);
    }
    // the fives table starts one entry early: odd X blinks the next LED
    a.def("min_tab_5s");
    a.equ(0);
    a.def("min_tab_10s");
    for b in [0o000, 0o001, 0o001, 0o002, 0o003, 0o004, 0o007, 0o010, 0o017, 0o020, 0o037, 0o040] {
        a.equ(b);
    }
}

fn bcd_clock(a: &mut Assembler) {
    preamble(a);
    require_extensions(a);
    clear_control_leds(a);

    a.def("show_hr");
    fetch_hour(a);
    a.op2(LDA_X, a.lbl("hr_bcd_tab"));
    a.op2(STA_A, a.lbl("display"));
    a.op2(STA_A, a.lbl("hours"));
    a.op2(LDA_C, 0);
    a.op2(STA_A, a.lbl("blink"));
    a.op2(JSR_A, a.lbl("do_blink"));

    a.op2(LDA_C, sys_read(Item::ClockMinutes));
    a.op1(SYSX);
    a.op2(JSR_A, a.lbl("scroll_left"));

    a.op2(LDA_C, 0o200);
    a.op2(STA_A, a.lbl("blink"));
    a.op2(JSR_A, a.lbl("do_blink"));

    // hours scroll back in from the left
    a.op2(LDX_C, 8);
    a.def("right");
    a.op2(LDA_A, a.lbl("display"));
    a.op1(SHR_A_1);
    a.op2(STA_A, a.lbl("display"));
    a.op2(LDA_A, a.lbl("hours"));
    a.op1(ROR_A_1);
    a.op2(STA_A, a.lbl("hours"));
    a.op2(AND_C, 0o100);
    a.op2(ADA_A, a.lbl("display"));
    a.op2(STA_A, a.lbl("display"));
    a.op2(STA_A, REG_OUTPUT);
    sys_delay(a);
    a.op2(LDB_C, 100);
    a.op1(SYSX);
    a.op2(SUX_C, 1);
    a.op2(JMP_X_NZ, a.lbl("right"));
    a.op2(JMP_U, a.lbl("show_hr"));

    do_blink(a, 5);

    a.org(0o204);

    // minutes scroll in from the right
    a.def("scroll_left");
    a.op1(NOOP);
    a.op2(STB_A, a.lbl("mins"));
    a.op2(LDX_C, 8);
    a.def("left");
    a.op2(LDA_A, a.lbl("display"));
    a.op1(SHL_A_1);
    a.op2(STA_A, a.lbl("display"));
    a.op2(LDA_A, a.lbl("mins"));
    a.op1(ROL_A_1);
    a.op2(STA_A, a.lbl("mins"));
    a.op2(AND_C, 0o001);
    a.op2(ADA_A, a.lbl("display"));
    a.op2(STA_A, a.lbl("display"));
    a.op2(STA_A, REG_OUTPUT);
    sys_delay(a);
    a.op2(LDB_C, 100);
    a.op1(SYSX);
    a.op2(SUX_C, 1);
    a.op2(JMP_X_NZ, a.lbl("left"));
    a.op2(RET_X_ZERO, a.lbl("scroll_left"));

    bcd2dec(a);

    a.def("display");
    a.equ(0);
    a.def("mins");
    a.equ(0);
    a.def("hours");
    a.equ(0);
    a.def("blink");
    a.equ(0);
    a.def("hr_bcd_tab");
    for b in [0x12, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x10, 0x11] {
        a.equ(b);
    }
}

fn binary_clock(a: &mut Assembler) {
    preamble(a);
    require_extensions(a);
    clear_control_leds(a);

    a.def("show_hr");
    fetch_hour(a);
    a.op2(LDA_X, a.lbl("hr_bin_tab"));
    a.op2(STA_A, REG_B);
    a.op2(LDA_C, sys_write(Item::Leds));
    a.op1(SYSX);

    a.op2(LDA_C, sys_read(Item::ClockMinutes));
    a.op1(SYSX);
    a.op2(JSR_A, a.lbl("bcd2dec"));
    a.op2(STB_A, a.lbl("display"));

    a.op2(LDA_C, 0o200);
    a.op2(STA_A, a.lbl("blink"));
    a.op2(JSR_A, a.lbl("do_blink"));
    a.op2(JMP_U, a.lbl("show_hr"));

    do_blink(a, 8);

    a.org(0o204);
    bcd2dec(a);

    a.def("display");
    a.equ(0);
    a.def("blink");
    a.equ(0);
    // control LEDs read left to right, so the bits are reversed
    a.def("hr_bin_tab");
    for b in [3, 8, 4, 12, 2, 10, 6, 14, 1, 9, 5, 13] {
        a.equ(b);
    }
}

fn blinken(a: &mut Assembler) {
    const DELAY: u8 = 20;

    preamble(a);
    clear_control_leds(a);
    // seed from the clock
    a.op2(LDA_C, sys_write(Item::Random));
    a.op2(LDB_C, 0);
    a.op1(SYSX);

    a.def("loop");
    a.op2(LDA_C, sys_read(Item::Random));
    a.op1(SYSX);
    a.op2(STB_A, REG_X);
    a.op2(LDA_C, sys_read(Item::Random));
    a.op1(SYSX);

    // low nibble lights the control LEDs, high nibble dims Run
    a.op2(STB_A, a.lbl("temp"));
    a.op2(STB_A, REG_A);
    a.op2(AND_C, 0x0f);
    a.op2(STA_A, REG_B);
    a.op2(LDA_C, sys_write(Item::Leds));
    a.op1(SYSX);
    sys_delay(a);
    a.op2(LDB_C, DELAY);
    a.op1(SYSX);
    a.op2(LDA_A, a.lbl("temp"));
    a.op1(SHR_A_4);
    a.op2(STA_A, REG_B);
    a.op2(LDA_C, sys_write(Item::Leds));
    a.op1(SYSX);

    a.op2(STX_A, REG_OUTPUT);
    sys_delay(a);
    a.op2(LDB_C, DELAY * 2);
    a.op1(SYSX);
    a.op2(JMP_U, a.lbl("loop"));
    a.def("temp");
    a.equ(0);
}

fn set_clock(a: &mut Assembler) {
    // A and B are left as they are, they hold the time to set
    a.org(2);
    a.equ(0);
    a.equ(4);

    a.def("set_time");
    a.op2(STA_A, a.lbl("hr"));
    a.op2(STB_A, a.lbl("min"));
    a.op2(LDA_C, sys_write(Item::ClockHours24));
    a.op2(LDB_A, a.lbl("hr"));
    a.op1(SYSX);
    a.op2(LDA_C, sys_write(Item::ClockMinutes));
    a.op2(LDB_A, a.lbl("min"));
    a.op1(SYSX);
    a.op2(LDA_C, sys_write(Item::ClockSeconds));
    a.op2(LDB_C, 0);
    a.op1(SYSX);
    // done, but ready to run again
    a.op1(HALT);
    a.op2(JMP_U, a.lbl("set_time"));
    a.def("hr");
    a.equ(0);
    a.def("min");
    a.equ(0);
}
