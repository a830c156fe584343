//! CPU emulation for the LS-8.
//!
//! This module implements the complete LS-8 architecture:
//! - 256 bytes of memory, with the interrupt vector table at 0xF8-0xFF
//! - 8 byte registers: R0-R4 general purpose, R5 (IM), R6 (IS), R7 (SP)
//! - PC and FL (`00000LGE`) registers
//! - 34 instructions encoded as `AABCDDDD` opcode bytes

pub mod memory;
pub mod registers;
pub mod decode;
pub mod alu;
pub mod stack;
pub mod interrupt;
pub mod execute;
pub mod trace;

pub use memory::{Memory, MemoryError};
pub use registers::Registers;
pub use decode::{Instruction, Opcode, DecodeError};
pub use interrupt::{Clock, ManualClock, SystemClock};
pub use execute::{Cpu, CpuError, CpuSnapshot, CpuState};
pub use trace::trace_line;
