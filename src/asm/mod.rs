//! Program loading, assembly and disassembly for the LS-8.
//!
//! This module provides:
//! - The `.ls8` binary-text program format (load and save)
//! - A simple two-pass assembler (mnemonics → program bytes)
//! - A disassembler (program bytes → readable text)

pub mod assembler;
pub mod disasm;
pub mod program;

pub use assembler::{assemble, AssemblerError};
pub use disasm::disassemble;
pub use program::{Program, LoadError, load_program_file, parse_program, save_program};
