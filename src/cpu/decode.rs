//! Instruction decoder for the LS-8.
//!
//! Every opcode byte follows the layout `AABCDDDD`:
//! - `AA`: number of operand bytes (0-2)
//! - `B`: 1 if the instruction is executed by the ALU
//! - `C`: 1 if the instruction sets the PC itself
//! - `DDDD`: instruction identifier

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Every LS-8 operation.
///
/// The discriminant is the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== ALU ====================

    Add = 0b1010_0000,
    Sub = 0b1010_0001,
    Mul = 0b1010_0010,
    Div = 0b1010_0011,
    Mod = 0b1010_0100,
    Inc = 0b0110_0101,
    Dec = 0b0110_0110,
    Cmp = 0b1010_0111,
    And = 0b1010_1000,
    Not = 0b0110_1001,
    Or = 0b1010_1010,
    Xor = 0b1010_1011,
    Shl = 0b1010_1100,
    Shr = 0b1010_1101,

    // ==================== Data Transfer ====================

    Ldi = 0b1000_0010,
    Ld = 0b1000_0011,
    St = 0b1000_0100,
    Push = 0b0100_0101,
    Pop = 0b0100_0110,

    // ==================== I/O ====================

    Prn = 0b0100_0111,
    Pra = 0b0100_1000,

    // ==================== Control Flow ====================

    Call = 0b0101_0000,
    Ret = 0b0001_0001,
    Int = 0b0101_0010,
    Iret = 0b0001_0011,
    Jmp = 0b0101_0100,
    Jeq = 0b0101_0101,
    Jne = 0b0101_0110,
    Jgt = 0b0101_0111,
    Jlt = 0b0101_1000,
    Jle = 0b0101_1001,
    Jge = 0b0101_1010,

    // ==================== Special ====================

    Nop = 0b0000_0000,
    Hlt = 0b0000_0001,
}

/// The full opcode table, paired with mnemonics.
pub const OPCODES: [(Opcode, &str); 34] = [
    (Opcode::Add, "ADD"),
    (Opcode::And, "AND"),
    (Opcode::Call, "CALL"),
    (Opcode::Cmp, "CMP"),
    (Opcode::Dec, "DEC"),
    (Opcode::Div, "DIV"),
    (Opcode::Hlt, "HLT"),
    (Opcode::Inc, "INC"),
    (Opcode::Int, "INT"),
    (Opcode::Iret, "IRET"),
    (Opcode::Jeq, "JEQ"),
    (Opcode::Jge, "JGE"),
    (Opcode::Jgt, "JGT"),
    (Opcode::Jle, "JLE"),
    (Opcode::Jlt, "JLT"),
    (Opcode::Jmp, "JMP"),
    (Opcode::Jne, "JNE"),
    (Opcode::Ld, "LD"),
    (Opcode::Ldi, "LDI"),
    (Opcode::Mod, "MOD"),
    (Opcode::Mul, "MUL"),
    (Opcode::Nop, "NOP"),
    (Opcode::Not, "NOT"),
    (Opcode::Or, "OR"),
    (Opcode::Pop, "POP"),
    (Opcode::Pra, "PRA"),
    (Opcode::Prn, "PRN"),
    (Opcode::Push, "PUSH"),
    (Opcode::Ret, "RET"),
    (Opcode::Shl, "SHL"),
    (Opcode::Shr, "SHR"),
    (Opcode::St, "ST"),
    (Opcode::Sub, "SUB"),
    (Opcode::Xor, "XOR"),
];

impl Opcode {
    /// Look up the operation for an opcode byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        OPCODES
            .iter()
            .find(|(op, _)| *op as u8 == byte)
            .map(|(op, _)| *op)
    }

    /// Look up an operation by mnemonic (case-insensitive).
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        OPCODES
            .iter()
            .find(|(_, m)| m.eq_ignore_ascii_case(name))
            .map(|(op, _)| *op)
    }

    /// The opcode byte.
    #[inline]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        OPCODES
            .iter()
            .find(|(op, _)| *op == self)
            .map(|(_, m)| *m)
            .unwrap_or("???")
    }

    /// Number of operand bytes following the opcode (`AA`).
    #[inline]
    pub const fn operand_count(self) -> u8 {
        self.byte() >> 6
    }

    /// Whether the ALU executes this operation (`B`).
    #[inline]
    pub const fn is_alu(self) -> bool {
        self.byte() & 0b0010_0000 != 0
    }

    /// Whether the instruction sets the PC itself (`C`).
    #[inline]
    pub const fn sets_pc(self) -> bool {
        self.byte() & 0b0001_0000 != 0
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A fetched and decoded instruction.
///
/// Both operand bytes are always fetched; `operands()` yields only the ones
/// the opcode consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    pub fetched: [u8; 2],
}

impl Instruction {
    pub fn new(op: Opcode, a: u8, b: u8) -> Self {
        Self { op, fetched: [a, b] }
    }

    /// First fetched operand byte.
    #[inline]
    pub fn a(&self) -> u8 {
        self.fetched[0]
    }

    /// Second fetched operand byte.
    #[inline]
    pub fn b(&self) -> u8 {
        self.fetched[1]
    }

    /// Operand bytes consumed by this instruction.
    pub fn operands(&self) -> &[u8] {
        &self.fetched[..self.op.operand_count() as usize]
    }

    /// Instruction length in bytes.
    pub fn len(&self) -> usize {
        1 + self.op.operand_count() as usize
    }

    /// Encode into its byte representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![self.op.byte()];
        bytes.extend_from_slice(self.operands());
        bytes
    }
}

/// Decode an opcode byte into its operation.
pub fn decode(byte: u8) -> Result<Opcode, DecodeError> {
    Opcode::from_byte(byte).ok_or(DecodeError::InvalidInstruction(byte))
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid instruction {0:#010b}")]
    InvalidInstruction(u8),
}
