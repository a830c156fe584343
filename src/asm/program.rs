//! `.ls8` program file format.
//!
//! A simple text format:
//! - One byte per line, written as a binary literal (`10000010`)
//! - `#` starts a comment that runs to the end of the line
//! - Blank and comment-only lines are ignored
//! - At most 256 bytes

use crate::asm::disasm::disassemble_at;
use crate::cpu::memory::MEMORY_SIZE;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// A loaded program image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    /// The program bytes, loaded at address 0.
    pub bytes: Vec<u8>,
    /// Original source lines (for debugging), one per byte.
    pub source_lines: Vec<String>,
}

impl Program {
    /// Create a new empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte.
    pub fn push(&mut self, byte: u8, source: &str) -> Result<(), LoadError> {
        if self.bytes.len() == MEMORY_SIZE {
            return Err(LoadError::ProgramTooLarge { size: self.bytes.len() + 1 });
        }
        self.bytes.push(byte);
        self.source_lines.push(source.to_string());
        Ok(())
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Parse `.ls8` source text.
pub fn parse_program(source: &str) -> Result<Program, LoadError> {
    let mut program = Program::new();

    for (line_num, line) in source.lines().enumerate() {
        let code = line.split('#').next().unwrap_or_default().trim();
        if code.is_empty() {
            continue;
        }

        let byte = parse_binary(code).ok_or_else(|| LoadError::ParseError {
            line: line_num + 1,
            message: format!("expected an 8-bit binary literal, found {:?}", code),
        })?;

        program.push(byte, line.trim())?;
    }

    Ok(program)
}

fn parse_binary(code: &str) -> Option<u8> {
    if code.len() > 8 || !code.chars().all(|c| c == '0' || c == '1') {
        return None;
    }
    u8::from_str_radix(code, 2).ok()
}

/// Load a `.ls8` file from disk.
pub fn load_program_file<P: AsRef<Path>>(path: P) -> Result<Program, LoadError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(path.display().to_string()),
        _ => LoadError::IoError(e.to_string()),
    })?;

    let mut source = String::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| LoadError::IoError(e.to_string()))?;
        source.push_str(&line);
        source.push('\n');
    }

    parse_program(&source)
}

/// Save a program as a `.ls8` file, annotating each instruction with its
/// disassembly.
pub fn save_program<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), LoadError> {
    if bytes.len() > MEMORY_SIZE {
        return Err(LoadError::ProgramTooLarge { size: bytes.len() });
    }

    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| LoadError::IoError(e.to_string()))?;
    file.write_all(render_program(bytes).as_bytes())
        .map_err(|e| LoadError::IoError(e.to_string()))
}

/// Render bytes in `.ls8` text form.
pub fn render_program(bytes: &[u8]) -> String {
    let mut out = format!("# LS-8 program\n# {} bytes\n\n", bytes.len());

    let mut addr = 0;
    while addr < bytes.len() {
        let (text, len) = disassemble_at(bytes, addr);
        for (i, byte) in bytes[addr..(addr + len).min(bytes.len())].iter().enumerate() {
            if i == 0 {
                out.push_str(&format!("{:08b} # {:02X}: {}\n", byte, addr, text));
            } else {
                out.push_str(&format!("{:08b}\n", byte));
            }
        }
        addr += len;
    }

    out
}

/// Errors that can occur while loading or saving programs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("program is too large: {size} bytes exceeds 256")]
    ProgramTooLarge { size: usize },
}
