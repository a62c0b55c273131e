use std::fmt;

use crate::output::bin4;

/// Raw encoding of `JMPL r0 r0`, which is what the `EXIT` pseudo-instruction expands to.
pub const EXIT_WORD: u16 = 0xD000;

/// Mask for the full 16-bit register form, `[opcode:4][a:4][b:4][c:4]`.
const A_MASK: u16 = 0x0F00;
const B_MASK: u16 = 0x00F0;
const C_MASK: u16 = 0x000F;
/// Immediate form, `[opcode:4][imm:8][c:4]`.
const IMM_MASK: u16 = 0x0FF0;

/// The sixteen operations of the machine. Discriminant is the 4-bit opcode.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Opcode {
    Add = 0x0,
    Addc = 0x1,
    Sub = 0x2,
    Swb = 0x3,
    Nand = 0x4,
    Rsft = 0x5,
    Imm = 0x6,
    Ld = 0x7,
    Ldim = 0x8,
    St = 0x9,
    Stim = 0xA,
    Beq = 0xB,
    Bgt = 0xC,
    Jmpl = 0xD,
    In = 0xE,
    Out = 0xF,
}

/// How the operands of an instruction are packed into its word.
///
/// Letters name the fields in source order: `CAB` is written `OP c a b`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Format {
    /// Reads `a` and `b`, no destination.
    Ab,
    /// Writes `c` from `a`.
    Ca,
    /// Writes `c` from `a` and `b`.
    Cab,
    /// Writes `c` from an 8-bit immediate.
    CImm,
    /// Reads `c`, carries an 8-bit immediate (stores and branches).
    ImmC,
}

impl Format {
    /// Operands expected after the mnemonic.
    pub fn operand_count(self) -> usize {
        match self {
            Format::Cab => 3,
            Format::Ab | Format::Ca | Format::CImm | Format::ImmC => 2,
        }
    }

    pub fn is_immediate(self) -> bool {
        matches!(self, Format::CImm | Format::ImmC)
    }
}

impl Opcode {
    pub const ALL: [Opcode; 16] = [
        Opcode::Add,
        Opcode::Addc,
        Opcode::Sub,
        Opcode::Swb,
        Opcode::Nand,
        Opcode::Rsft,
        Opcode::Imm,
        Opcode::Ld,
        Opcode::Ldim,
        Opcode::St,
        Opcode::Stim,
        Opcode::Beq,
        Opcode::Bgt,
        Opcode::Jmpl,
        Opcode::In,
        Opcode::Out,
    ];

    /// Decode the top nibble of an instruction word.
    pub fn from_word(word: u16) -> Opcode {
        match word >> 12 {
            0x0 => Opcode::Add,
            0x1 => Opcode::Addc,
            0x2 => Opcode::Sub,
            0x3 => Opcode::Swb,
            0x4 => Opcode::Nand,
            0x5 => Opcode::Rsft,
            0x6 => Opcode::Imm,
            0x7 => Opcode::Ld,
            0x8 => Opcode::Ldim,
            0x9 => Opcode::St,
            0xA => Opcode::Stim,
            0xB => Opcode::Beq,
            0xC => Opcode::Bgt,
            0xD => Opcode::Jmpl,
            0xE => Opcode::In,
            0xF => Opcode::Out,
            // A u16 shifted right by 12 cannot exceed 0xF
            other => unreachable!("decoded opcode {other:#x} outside of the 4-bit table"),
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == mnemonic)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Addc => "ADDC",
            Opcode::Sub => "SUB",
            Opcode::Swb => "SWB",
            Opcode::Nand => "NAND",
            Opcode::Rsft => "RSFT",
            Opcode::Imm => "IMM",
            Opcode::Ld => "LD",
            Opcode::Ldim => "LDIM",
            Opcode::St => "ST",
            Opcode::Stim => "STIM",
            Opcode::Beq => "BEQ",
            Opcode::Bgt => "BGT",
            Opcode::Jmpl => "JMPL",
            Opcode::In => "IN",
            Opcode::Out => "OUT",
        }
    }

    pub fn format(self) -> Format {
        match self {
            Opcode::Add | Opcode::Addc | Opcode::Sub | Opcode::Swb | Opcode::Nand => Format::Cab,
            Opcode::Rsft | Opcode::Ld | Opcode::Jmpl | Opcode::In => Format::Ca,
            Opcode::Imm | Opcode::Ldim => Format::CImm,
            Opcode::St | Opcode::Out => Format::Ab,
            Opcode::Stim | Opcode::Beq | Opcode::Bgt => Format::ImmC,
        }
    }

    /// Whether the instruction touches an I/O port.
    pub fn is_io(self) -> bool {
        matches!(self, Opcode::In | Opcode::Out)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Register-form word, `[opcode:4][a:4][b:4][c:4]`.
pub fn encode(op: Opcode, a: u8, b: u8, c: u8) -> u16 {
    debug_assert!(a < 16 && b < 16 && c < 16);
    ((op as u16) << 12) | ((a as u16) << 8) | ((b as u16) << 4) | c as u16
}

/// Immediate-form word, `[opcode:4][imm:8][c:4]`.
pub fn encode_imm(op: Opcode, imm: u8, c: u8) -> u16 {
    debug_assert!(c < 16);
    ((op as u16) << 12) | ((imm as u16) << 4) | c as u16
}

/// Decoded view of one instruction word. Both layouts are extracted; the opcode's
/// format decides which fields are meaningful.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Instr {
    pub word: u16,
    pub op: Opcode,
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub imm: u8,
}

impl Instr {
    pub fn decode(word: u16) -> Self {
        Instr {
            word,
            op: Opcode::from_word(word),
            a: ((word & A_MASK) >> 8) as u8,
            b: ((word & B_MASK) >> 4) as u8,
            c: (word & C_MASK) as u8,
            imm: ((word & IMM_MASK) >> 4) as u8,
        }
    }

    pub fn is_exit(&self) -> bool {
        self.word == EXIT_WORD
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exit() {
            return f.write_str("EXIT");
        }
        let Instr { op, a, b, c, imm, .. } = *self;
        // Port numbers are not registers
        match op {
            Opcode::In => return write!(f, "{op} r{c} {a}"),
            Opcode::Out => return write!(f, "{op} {a} r{b}"),
            _ => {}
        }
        match op.format() {
            Format::Ab => write!(f, "{op} r{a} r{b}"),
            Format::Ca => write!(f, "{op} r{c} r{a}"),
            Format::Cab => write!(f, "{op} r{c} r{a} r{b}"),
            Format::CImm => write!(f, "{op} r{c} {imm}"),
            Format::ImmC => write!(f, "{op} {imm} r{c}"),
        }
    }
}

/// Render a word as four dash-separated nibbles, eg. `1101-0000-0000-0000`.
pub fn format_word(word: u16) -> String {
    [12, 8, 4, 0]
        .map(|shift| bin4((word >> shift) as u8))
        .join("-")
}
