//! Raw machine state snapshots.
//!
//! Layout is fixed and little-endian, with no header:
//!
//! | field            | width       |
//! |------------------|-------------|
//! | `prom`           | 256 x `u16` |
//! | `ram`            | 256 x `u8`  |
//! | `regfile`        | 16 x `u8`   |
//! | `in`             | 16 x `u8`   |
//! | `out`            | 16 x `u8`   |
//! | `pc`             | `u8`        |
//! | `program_length` | `u16`       |
//! | `carry`          | `u8` (0/1)  |
//!
//! The older 819-byte layout stored `program_length` as a single byte, which cannot
//! represent a full 256-instruction program. It is still accepted by [`decode`], but
//! [`encode`] always writes the 820-byte form, so older readers reject new snapshots.

use std::fs;
use std::path::Path;

use crate::error::{Malformation, SnapshotError};
use crate::image::PROM_SIZE;
use crate::runtime::{RunState, PORT_COUNT, RAM_SIZE, REG_COUNT};

/// Size in bytes of an encoded snapshot.
pub const SNAPSHOT_LEN: usize = PROM_SIZE * 2 + RAM_SIZE + REG_COUNT + PORT_COUNT * 2 + 1 + 2 + 1;

/// Size of the older layout with a one-byte `program_length`.
pub const LEGACY_SNAPSHOT_LEN: usize = SNAPSHOT_LEN - 1;

pub fn encode(state: &RunState) -> Vec<u8> {
    let mut out = Vec::with_capacity(SNAPSHOT_LEN);
    for word in &state.prom {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(&state.ram);
    out.extend_from_slice(&state.reg);
    out.extend_from_slice(&state.in_regs);
    out.extend_from_slice(&state.out_regs);
    out.push(state.pc);
    out.extend_from_slice(&state.program_length.to_le_bytes());
    out.push(u8::from(state.carry));
    debug_assert_eq!(out.len(), SNAPSHOT_LEN);
    out
}

/// Decode into a fresh state. Nothing is returned unless every field is valid.
pub fn decode(bytes: &[u8]) -> Result<RunState, SnapshotError> {
    let legacy = bytes.len() == LEGACY_SNAPSHOT_LEN;
    if bytes.len() < SNAPSHOT_LEN && !legacy {
        return Err(SnapshotError::Truncated {
            expected: SNAPSHOT_LEN,
            found: bytes.len(),
        });
    }
    if bytes.len() > SNAPSHOT_LEN {
        return Err(SnapshotError::TrailingBytes {
            expected: SNAPSHOT_LEN,
            found: bytes.len(),
        });
    }

    let mut r = Reader::new(bytes);
    let mut state = RunState::new();
    for word in state.prom.iter_mut() {
        *word = r.read_u16_le();
    }
    r.read_into(&mut state.ram);
    r.read_into(&mut state.reg);
    r.read_into(&mut state.in_regs);
    r.read_into(&mut state.out_regs);
    state.pc = r.read_u8();
    state.program_length = if legacy {
        r.read_u8() as u16
    } else {
        r.read_u16_le()
    };
    state.carry = match r.read_u8() {
        0 => false,
        1 => true,
        other => {
            return Err(SnapshotError::Malformed {
                field: "carry",
                reason: Malformation::NotABool(other),
            })
        }
    };

    if state.program_length as usize > PROM_SIZE {
        return Err(SnapshotError::Malformed {
            field: "program_length",
            reason: Malformation::OutOfRange(state.program_length),
        });
    }
    if state.reg[0] != 0 {
        return Err(SnapshotError::Malformed {
            field: "regfile",
            reason: Malformation::NonZeroRegister(state.reg[0]),
        });
    }
    Ok(state)
}

pub fn write_file(path: impl AsRef<Path>, state: &RunState) -> Result<(), SnapshotError> {
    fs::write(path, encode(state))?;
    Ok(())
}

pub fn read_file(path: impl AsRef<Path>) -> Result<RunState, SnapshotError> {
    decode(&fs::read(path)?)
}

/// Cursor over a buffer whose length has already been checked.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        slice
    }

    fn read_u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn read_u16_le(&mut self) -> u16 {
        let b = self.take(2);
        u16::from_le_bytes([b[0], b[1]])
    }

    fn read_into(&mut self, dest: &mut [u8]) {
        dest.copy_from_slice(self.take(dest.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::assemble;

    fn busy_state() -> RunState {
        let image = assemble("IMM r1 200\nIMM r2 100\nADD r3 r1 r2\nST r1 r2\nOUT 4 r3\nEXIT").unwrap();
        let mut state = RunState::with_program(&image);
        state.set_input(7, 0x42);
        for _ in 0..5 {
            state.step();
        }
        state
    }

    #[test]
    fn layout() {
        assert_eq!(SNAPSHOT_LEN, 820);
        let state = busy_state();
        let bytes = encode(&state);
        assert_eq!(bytes.len(), SNAPSHOT_LEN);
        // First word, `IMM r1 200` = 0x6C81, little-endian
        assert_eq!(&bytes[0..2], &[0x81, 0x6C]);
        // ram[200] = 100
        assert_eq!(bytes[512 + 200], 100);
        // regfile r3 = 44
        assert_eq!(bytes[768 + 3], 44);
        assert_eq!(bytes[784 + 7], 0x42);
        assert_eq!(bytes[800 + 4], 44);
        assert_eq!(bytes[816], 5);
        assert_eq!(&bytes[817..819], &[6, 0]);
        assert_eq!(bytes[819], 1);
    }

    #[test]
    fn decode_restores_state() {
        let state = busy_state();
        assert_eq!(decode(&encode(&state)).unwrap(), state);
    }

    #[test]
    fn rejects_bad_lengths() {
        let bytes = encode(&busy_state());
        assert!(matches!(
            decode(&bytes[..100]),
            Err(SnapshotError::Truncated { expected: 820, found: 100 })
        ));
        assert!(matches!(decode(&[]), Err(SnapshotError::Truncated { .. })));
        let mut long = bytes.clone();
        long.push(0);
        assert!(matches!(
            decode(&long),
            Err(SnapshotError::TrailingBytes { found: 821, .. })
        ));
    }

    #[test]
    fn accepts_legacy_layout() {
        let state = busy_state();
        let mut bytes = encode(&state);
        // Collapse the two-byte program length into one
        bytes.remove(818);
        assert_eq!(bytes.len(), LEGACY_SNAPSHOT_LEN);
        assert_eq!(decode(&bytes).unwrap(), state);

        bytes[817] = 0;
        assert_eq!(decode(&bytes).unwrap().program_length(), 0);

        assert!(matches!(
            decode(&bytes[..LEGACY_SNAPSHOT_LEN - 1]),
            Err(SnapshotError::Truncated { expected: 820, found: 818 })
        ));
    }

    #[test]
    fn rejects_malformed_fields() {
        let bytes = encode(&busy_state());

        let mut bad_carry = bytes.clone();
        bad_carry[819] = 2;
        assert!(matches!(
            decode(&bad_carry),
            Err(SnapshotError::Malformed { field: "carry", .. })
        ));

        let mut bad_len = bytes.clone();
        bad_len[817..819].copy_from_slice(&257u16.to_le_bytes());
        assert!(matches!(
            decode(&bad_len),
            Err(SnapshotError::Malformed {
                field: "program_length",
                reason: Malformation::OutOfRange(257)
            })
        ));

        let mut bad_r0 = bytes;
        bad_r0[768] = 1;
        assert!(matches!(
            decode(&bad_r0),
            Err(SnapshotError::Malformed { field: "regfile", .. })
        ));
    }
}
