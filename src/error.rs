use std::fmt::{self, Display};
use std::io;

use miette::{Diagnostic, LabeledSpan, Severity};
use thiserror::Error;

use crate::symbol::Span;

// Assembler errors

/// Assembly failure, tied to the 1-based physical source line it occurred on.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct AsmError {
    pub line: usize,
    pub span: Span,
    pub kind: AsmErrorKind,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsmErrorKind {
    #[error("unknown instruction `{mnemonic}`")]
    UnknownInstruction { mnemonic: String },
    #[error("unknown label `{label}`")]
    UnknownLabel { label: String },
    #[error("failed to parse register `{token}`")]
    InvalidRegister { token: String },
    #[error("register out of range: `{token}`")]
    RegisterOutOfRange { token: String },
    #[error("failed to parse immediate `{token}`")]
    ImmediateParseFailure { token: String },
    #[error("not enough arguments for {mnemonic}, expected {expected}, got {found}")]
    NotEnoughArguments {
        mnemonic: String,
        expected: usize,
        found: usize,
    },
    #[error("label `{label}` is not followed by an instruction")]
    MissingInstruction { label: String },
    #[error("program is too long, max length is {max} instructions")]
    ProgramTooLong { max: usize },
    #[error("source is empty")]
    EmptySource,
}

impl AsmError {
    pub fn new(line: usize, span: Span, kind: AsmErrorKind) -> Self {
        AsmError { line, span, kind }
    }

    fn label_text(&self) -> &'static str {
        use AsmErrorKind::*;
        match self.kind {
            UnknownInstruction { .. } => "unknown instruction",
            UnknownLabel { .. } => "undeclared label",
            InvalidRegister { .. } => "not a register",
            RegisterOutOfRange { .. } => "out-of-range register",
            ImmediateParseFailure { .. } => "incorrect immediate",
            NotEnoughArguments { .. } => "missing operands",
            MissingInstruction { .. } => "label without instruction",
            ProgramTooLong { .. } => "instruction 257",
            EmptySource => "empty source",
        }
    }
}

impl Diagnostic for AsmError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        use AsmErrorKind::*;
        let code = match self.kind {
            UnknownInstruction { .. } => "asm::unknown_instruction",
            UnknownLabel { .. } => "asm::unknown_label",
            InvalidRegister { .. } => "asm::bad_register",
            RegisterOutOfRange { .. } => "asm::register_range",
            ImmediateParseFailure { .. } => "asm::bad_immediate",
            NotEnoughArguments { .. } => "asm::arity",
            MissingInstruction { .. } => "asm::label_only",
            ProgramTooLong { .. } => "asm::too_long",
            EmptySource => "asm::empty",
        };
        Some(Box::new(code))
    }

    fn severity(&self) -> Option<Severity> {
        Some(Severity::Error)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        use AsmErrorKind::*;
        let help = match self.kind {
            UnknownInstruction { .. } => {
                "mnemonics are upper case: ADD ADDC SUB SWB NAND RSFT IMM LD LDIM ST STIM BEQ BGT JMPL IN OUT, or NOP MOV JMP EXIT"
            }
            UnknownLabel { .. } => "labels are referenced with their trailing colon, eg. `JMP loop:`",
            InvalidRegister { .. } | RegisterOutOfRange { .. } => {
                "registers are written r0 to r15, the `r` is optional"
            }
            ImmediateParseFailure { .. } => {
                "immediates are decimal literals from 0 to 255 or label references ending in `:`"
            }
            NotEnoughArguments { .. } => "check the operands for this instruction",
            MissingInstruction { .. } => "put the label on the same line as the instruction it marks",
            ProgramTooLong { .. } => "program memory holds 256 instructions",
            EmptySource => "the file has no content",
        };
        Some(Box::new(help))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let label = LabeledSpan::at(self.span, self.label_text());
        Some(Box::new(std::iter::once(label)))
    }
}

// Engine errors

/// Refused engine operation. The machine state is left untouched.
#[derive(Debug, Error, Diagnostic, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("CPU is busy running a program")]
    #[diagnostic(
        code(engine::busy),
        help("request a stop and wait for the current run to finish")
    )]
    Busy,
    #[error("no program is loaded")]
    #[diagnostic(code(engine::no_program), help("assemble and load a program first"))]
    NoProgramLoaded,
}

// Snapshot errors

#[derive(Debug, Error, Diagnostic)]
pub enum SnapshotError {
    #[error("snapshot is truncated, expected {expected} bytes, found {found}")]
    #[diagnostic(code(snapshot::truncated))]
    Truncated { expected: usize, found: usize },
    #[error("snapshot is too long, expected {expected} bytes, found {found}")]
    #[diagnostic(code(snapshot::trailing))]
    TrailingBytes { expected: usize, found: usize },
    #[error("snapshot field `{field}` is malformed: {reason}")]
    #[diagnostic(code(snapshot::malformed))]
    Malformed {
        field: &'static str,
        reason: Malformation,
    },
    #[error(transparent)]
    #[diagnostic(code(snapshot::io))]
    Io(#[from] io::Error),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformation {
    /// Value does not fit the field's range.
    OutOfRange(u16),
    /// `r0` must always read zero.
    NonZeroRegister(u8),
    /// Flags are stored as a single 0/1 byte.
    NotABool(u8),
}

impl Display for Malformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformation::OutOfRange(v) => write!(f, "value {v} out of range"),
            Malformation::NonZeroRegister(v) => write!(f, "r0 holds {v}"),
            Malformation::NotABool(v) => write!(f, "byte {v:#04x} is not 0 or 1"),
        }
    }
}
