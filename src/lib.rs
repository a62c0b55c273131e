// Assembling
pub mod isa;
pub use isa::{Instr, Opcode, EXIT_WORD};
mod symbol;
pub use symbol::{LabelTable, Register, RegisterError, Span};
mod image;
pub use image::{ProgramImage, PROM_SIZE};
mod parser;
pub use parser::{assemble, AsmParser};

// Running
mod runtime;
pub use runtime::{RunState, PORT_COUNT, RAM_SIZE, REG_COUNT};
mod engine;
pub use engine::{Engine, RunHandle, StopCondition, StopReason};
pub mod snapshot;

mod error;
pub use error::{AsmError, AsmErrorKind, EngineError, Malformation, SnapshotError};

pub mod env;
pub mod output;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
