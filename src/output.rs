use std::cell::RefCell;
use std::path::Path;
use std::str::Chars;

use colored::Colorize;

use crate::image::PROM_SIZE;
use crate::isa::{format_word, Instr};
use crate::runtime::{RunState, PORT_COUNT, REG_COUNT};

/// Colour of the right-aligned verb in a status line.
#[derive(Clone, Copy, Debug)]
pub enum MsgColor {
    Green,
    Cyan,
    Red,
}

/// Print a status line, eg. `  Assembling target foo.rails`.
pub fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    Output::Normal.print_str(&format!("{left:>12} {right}\n"));
}

pub fn file_message(color: MsgColor, left: &str, path: &Path) {
    message(color, left, &format!("target {}", path.display()));
}

/// Where dumps go. `Normal` is stdout, `Diagnostic` is stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    Normal,
    Diagnostic,
}

impl Output {
    thread_local! {
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    /// Print as-is, or with ANSI escapes stripped if `--minimal`.
    pub fn print_str(&self, string: &str) {
        let owned;
        let string = if Self::is_minimal() {
            owned = Decolored::new(string).collect::<String>();
            &owned
        } else {
            string
        };
        match self {
            Self::Normal => print!("{string}"),
            Self::Diagnostic => eprint!("{string}"),
        }
    }

    pub fn print_registers(&self, state: &RunState) {
        if Self::is_minimal() {
            for i in 0..REG_COUNT {
                self.print_str(&format!("R{} {}\n", i, state.reg(i)));
            }
            self.print_str(&format!("PC {}\n", state.pc()));
            self.print_str(&format!("C {}\n", state.carry() as u8));
            return;
        }

        self.print_str("\x1b[2m┌──────────────────────────────┐\x1b[0m\n");
        self.print_str("\x1b[2m│       \x1b[3mhex   int        bin\x1b[0m\x1b[2m │\x1b[0m\n");
        for i in 0..REG_COUNT {
            let value = state.reg(i);
            self.print_str(&format!(
                "\x1b[2m│\x1b[0m \x1b[1m{:<4}\x1b[0m {}  {:>4}  {} \x1b[2m│\x1b[0m\n",
                format!("r{i}"),
                hex8(value),
                value,
                bin8(value),
            ));
        }
        self.print_str(&format!(
            "\x1b[2m│\x1b[0m \x1b[1mPC\x1b[0m   {}  {:>4}        \x1b[1mC\x1b[0m {} \x1b[2m│\x1b[0m\n",
            hex8(state.pc()),
            state.pc(),
            state.carry() as u8,
        ));
        self.print_str("\x1b[2m└──────────────────────────────┘\x1b[0m\n");
    }

    pub fn print_ports(&self, state: &RunState) {
        let join = |ports: &[u8; PORT_COUNT]| {
            ports
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        if Self::is_minimal() {
            self.print_str(&format!("IN {}\n", join(state.in_regs())));
            self.print_str(&format!("OUT {}\n", join(state.out_regs())));
            return;
        }

        self.print_str("\x1b[2m     ");
        for port in 0..PORT_COUNT {
            self.print_str(&format!(" {port:>4}"));
        }
        self.print_str("\x1b[0m\n");
        for (name, ports) in [("in", state.in_regs()), ("out", state.out_regs())] {
            self.print_str(&format!("\x1b[1m{name:<5}\x1b[0m"));
            for &value in ports {
                let cell = hex8(value);
                if value == 0 {
                    self.print_str(&format!(" \x1b[2m{cell}\x1b[0m"));
                } else {
                    self.print_str(&format!(" {cell}"));
                }
            }
            self.print_str("\n");
        }
    }

    /// Hex dump of RAM, 16 bytes per row.
    pub fn print_ram(&self, state: &RunState) {
        for (row, chunk) in state.ram().chunks(16).enumerate() {
            let bytes = chunk
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ");
            self.print_str(&format!("\x1b[2m{}\x1b[0m  {bytes}\n", hex8((row * 16) as u8)));
        }
    }

    /// List `prom[..len]`, marking the word at `pc`.
    pub fn print_program(&self, prom: &[u16; PROM_SIZE], len: usize, pc: Option<u8>) {
        for (index, &word) in prom.iter().enumerate().take(len) {
            let marker = if pc == Some(index as u8) { ">" } else { " " };
            self.print_str(&format!(
                "{marker}\x1b[2m{index:>3}\x1b[0m  {}  {}  \x1b[1m{}\x1b[0m\n",
                format_word(word),
                hex16(word),
                Instr::decode(word),
            ));
        }
    }

    /// One executed instruction, as printed by `rails step`.
    pub fn print_step(&self, count: usize, pc: u8, instr: Instr) {
        self.print_str(&format!(
            "\x1b[2m#{count:<4}\x1b[0m {}  {}  \x1b[1m{instr}\x1b[0m\n",
            hex8(pc),
            bin16(instr.word),
        ));
    }
}

/// Low nibble only.
pub fn bin4(value: u8) -> String {
    format!("{:04b}", value & 0xF)
}

pub fn bin8(value: u8) -> String {
    format!("{value:08b}")
}

pub fn bin16(value: u16) -> String {
    format!("{value:016b}")
}

pub fn hex8(value: u8) -> String {
    format!("0x{value:02x}")
}

pub fn hex16(value: u16) -> String {
    format!("0x{value:04x}")
}

/// Iterator over the characters of a string with ANSI escape sequences removed.
struct Decolored<'a> {
    chars: Chars<'a>,
}

impl<'a> Decolored<'a> {
    fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl Iterator for Decolored<'_> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Drop everything from '\x1b' up to and including the closing 'm'
            if ch == '\x1b' {
                for inner in self.chars.by_ref() {
                    if inner == 'm' {
                        break;
                    }
                }
                continue;
            }
            return Some(ch);
        }
        None
    }
}
