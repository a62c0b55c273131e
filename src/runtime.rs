use crate::image::{ProgramImage, PROM_SIZE};
use crate::isa::Instr;

pub const RAM_SIZE: usize = 256;
pub const REG_COUNT: usize = 16;
pub const PORT_COUNT: usize = 16;

/// Register compared against by `BEQ`/`BGT`.
const CMP_REG: usize = 15;

/// Represents complete machine state during runtime.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RunState {
    /// Program memory. Never written by execution.
    pub(crate) prom: [u16; PROM_SIZE],
    pub(crate) ram: [u8; RAM_SIZE],
    /// 16x 8-bit registers, `r0` reads as zero
    pub(crate) reg: [u8; REG_COUNT],
    pub(crate) in_regs: [u8; PORT_COUNT],
    pub(crate) out_regs: [u8; PORT_COUNT],
    /// Program counter, wraps at 256
    pub(crate) pc: u8,
    pub(crate) carry: bool,
    /// Count of assembled instructions in `prom`
    pub(crate) program_length: u16,
}

/// Whether an instruction set the program counter itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Flow {
    Next,
    Jumped,
}

impl Default for RunState {
    fn default() -> Self {
        RunState {
            prom: [0; PROM_SIZE],
            ram: [0; RAM_SIZE],
            reg: [0; REG_COUNT],
            in_regs: [0; PORT_COUNT],
            out_regs: [0; PORT_COUNT],
            pc: 0,
            carry: false,
            program_length: 0,
        }
    }
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state with `image` loaded.
    pub fn with_program(image: &ProgramImage) -> Self {
        let mut state = Self::new();
        state.load_program(image);
        state
    }

    /// Replace program memory. Registers, RAM and ports are kept.
    pub fn load_program(&mut self, image: &ProgramImage) {
        self.prom = *image.words();
        self.program_length = image.len() as u16;
    }

    /// Clear everything except the loaded program.
    pub fn reset(&mut self) {
        self.ram = [0; RAM_SIZE];
        self.reg = [0; REG_COUNT];
        self.in_regs = [0; PORT_COUNT];
        self.out_regs = [0; PORT_COUNT];
        self.carry = false;
        self.pc = 0;
    }

    pub fn pc(&self) -> u8 {
        self.pc
    }

    pub fn carry(&self) -> bool {
        self.carry
    }

    pub fn reg(&self, idx: usize) -> u8 {
        self.reg[idx]
    }

    pub fn regs(&self) -> &[u8; REG_COUNT] {
        &self.reg
    }

    pub fn ram(&self) -> &[u8; RAM_SIZE] {
        &self.ram
    }

    pub fn in_regs(&self) -> &[u8; PORT_COUNT] {
        &self.in_regs
    }

    pub fn out_regs(&self) -> &[u8; PORT_COUNT] {
        &self.out_regs
    }

    pub fn prom(&self) -> &[u16; PROM_SIZE] {
        &self.prom
    }

    pub fn program_length(&self) -> usize {
        self.program_length as usize
    }

    pub fn set_input(&mut self, port: usize, value: u8) {
        self.in_regs[port] = value;
    }

    /// The instruction `pc` points at, not yet executed.
    pub fn current(&self) -> Instr {
        Instr::decode(self.prom[self.pc as usize])
    }

    const OP_TABLE: [fn(&mut RunState, Instr) -> Flow; 16] = [
        Self::add,  // 0x0
        Self::addc, // 0x1
        Self::sub,  // 0x2
        Self::swb,  // 0x3
        Self::nand, // 0x4
        Self::rsft, // 0x5
        Self::imm,  // 0x6
        Self::ld,   // 0x7
        Self::ldim, // 0x8
        Self::st,   // 0x9
        Self::stim, // 0xA
        Self::beq,  // 0xB
        Self::bgt,  // 0xC
        Self::jmpl, // 0xD
        Self::inp,  // 0xE
        Self::out,  // 0xF
    ];

    /// Execute the instruction at `pc` and return it.
    pub fn step(&mut self) -> Instr {
        let instr = self.current();
        let flow = Self::OP_TABLE[instr.op as usize](self, instr);
        if flow == Flow::Next {
            self.reg[0] = 0;
            self.pc = self.pc.wrapping_add(1);
        }
        debug_assert_eq!(self.reg[0], 0);
        instr
    }

    #[inline]
    fn r(&self, idx: u8) -> u8 {
        self.reg[idx as usize]
    }

    #[inline]
    fn set(&mut self, idx: u8, val: u8) {
        self.reg[idx as usize] = val;
    }

    /// Store the low byte of a 9-bit (or wrapped 16-bit) result and raise carry on overflow.
    #[inline]
    fn set_carrying(&mut self, idx: u8, result: u16) {
        self.carry = result > 0xFF;
        self.set(idx, (result & 0xFF) as u8);
    }

    fn add(&mut self, i: Instr) -> Flow {
        let res = self.r(i.a) as u16 + self.r(i.b) as u16;
        self.set_carrying(i.c, res);
        Flow::Next
    }

    fn addc(&mut self, i: Instr) -> Flow {
        let res = self.r(i.a) as u16 + self.r(i.b) as u16 + self.carry as u16;
        self.set_carrying(i.c, res);
        Flow::Next
    }

    // A borrow wraps the 16-bit difference past 255, so carry means "borrow occurred".
    fn sub(&mut self, i: Instr) -> Flow {
        let res = (self.r(i.a) as u16).wrapping_sub(self.r(i.b) as u16);
        self.set_carrying(i.c, res);
        Flow::Next
    }

    /// Operands are swapped: `c = b - a - carry`.
    fn swb(&mut self, i: Instr) -> Flow {
        let res = (self.r(i.b) as u16)
            .wrapping_sub(self.r(i.a) as u16)
            .wrapping_sub(self.carry as u16);
        self.set_carrying(i.c, res);
        Flow::Next
    }

    fn nand(&mut self, i: Instr) -> Flow {
        self.set(i.c, !(self.r(i.a) & self.r(i.b)));
        Flow::Next
    }

    fn rsft(&mut self, i: Instr) -> Flow {
        self.set(i.c, self.r(i.a) >> 1);
        Flow::Next
    }

    fn imm(&mut self, i: Instr) -> Flow {
        self.set(i.c, i.imm);
        Flow::Next
    }

    fn ld(&mut self, i: Instr) -> Flow {
        let val = self.ram[self.r(i.a) as usize];
        self.set(i.c, val);
        Flow::Next
    }

    fn ldim(&mut self, i: Instr) -> Flow {
        self.set(i.c, self.ram[i.imm as usize]);
        Flow::Next
    }

    fn st(&mut self, i: Instr) -> Flow {
        self.ram[self.r(i.a) as usize] = self.r(i.b);
        Flow::Next
    }

    fn stim(&mut self, i: Instr) -> Flow {
        self.ram[i.imm as usize] = self.r(i.c);
        Flow::Next
    }

    fn branch(&mut self, taken: bool, target: u8) -> Flow {
        if !taken {
            return Flow::Next;
        }
        self.pc = target;
        self.carry = false;
        Flow::Jumped
    }

    fn beq(&mut self, i: Instr) -> Flow {
        let taken = self.reg[CMP_REG] == self.r(i.c);
        self.branch(taken, i.imm)
    }

    fn bgt(&mut self, i: Instr) -> Flow {
        let taken = self.reg[CMP_REG] > self.r(i.c);
        self.branch(taken, i.imm)
    }

    /// Jump to `a`, linking the return address into `c`.
    fn jmpl(&mut self, i: Instr) -> Flow {
        // Target is read after the link write, so `JMPL rX rX` lands on pc + 1
        self.set(i.c, self.pc.wrapping_add(1));
        self.reg[0] = 0;
        self.pc = self.r(i.a);
        self.carry = false;
        Flow::Jumped
    }

    fn inp(&mut self, i: Instr) -> Flow {
        self.set(i.c, self.in_regs[i.a as usize]);
        Flow::Next
    }

    fn out(&mut self, i: Instr) -> Flow {
        self.out_regs[i.a as usize] = self.r(i.b);
        Flow::Next
    }
}
