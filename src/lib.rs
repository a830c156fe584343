//! # LS-8 Emulator
//!
//! An emulator for the LS-8, a small 8-bit virtual CPU with 256 bytes of
//! memory, eight registers, a downward-growing stack and eight vectored
//! interrupt lines.

pub mod cpu;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, CpuSnapshot, Memory, Registers, Instruction, Opcode};
pub use asm::{assemble, disassemble, AssemblerError, Program, LoadError, load_program_file, parse_program, save_program};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
