//! Simple assembler for LS-8 programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//! LABEL:              ; Define a label
//!     LDI R0,10       ; Load immediate (decimal, 0x.. hex or 0b.. binary)
//!     LDI R1,LOOP     ; Labels resolve to their address
//!     CMP R0,R1
//!     JNE R1
//!     HLT
//!
//!     ORG 0xF8        ; Zero-fill up to an address
//!     DB HANDLER, 0   ; Emit raw bytes
//! ```
//!
//! Registers are written `R0`-`R7`; `IM`, `IS` and `SP` alias R5-R7.

use crate::cpu::decode::Opcode;
use crate::cpu::memory::MEMORY_SIZE;
use crate::cpu::registers::{IM, IS, SP};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to program bytes.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> address).
    symbols: HashMap<String, usize>,
    /// Pending references: (output_index, label, source_line).
    pending: Vec<(usize, String, usize)>,
    /// Output bytes. The next byte lands at `output.len()`.
    output: Vec<u8>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        if self.output.len() > MEMORY_SIZE {
            return Err(AssemblerError::ProgramTooLarge { size: self.output.len() });
        }

        // Pass 2: Resolve forward references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        }
        .trim();

        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("invalid label {:?}", &line[..colon_idx]),
                });
            }
            if self.symbols.insert(label.clone(), self.output.len()).is_some() {
                return Err(AssemblerError::DuplicateLabel { line: line_num, label });
            }

            // Process rest of line if any
            let rest = line[colon_idx + 1..].trim();
            if !rest.is_empty() {
                return self.process_instruction(rest, line_num);
            }
            return Ok(());
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m.to_uppercase(), rest.trim()),
            None => (line.to_uppercase(), ""),
        };
        let operands: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };

        match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let &[target] = operands.as_slice() else {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "ORG requires one address".into(),
                    });
                };
                let addr = self.parse_number(target, line_num)? as usize;
                if addr < self.output.len() {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: format!("ORG {:#04x} is behind the current address {:#04x}", addr, self.output.len()),
                    });
                }
                self.output.resize(addr, 0);
            }

            "DB" | "DATA" => {
                if operands.is_empty() {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "DB requires at least one value".into(),
                    });
                }
                for operand in operands {
                    self.emit_immediate(operand, line_num)?;
                }
            }

            // Instructions
            _ => {
                let op = Opcode::from_mnemonic(&mnemonic).ok_or_else(|| {
                    AssemblerError::UnknownMnemonic {
                        line: line_num,
                        mnemonic: mnemonic.clone(),
                    }
                })?;

                let expected = op.operand_count() as usize;
                if operands.len() != expected {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: format!("{} takes {} operand(s), found {}", op, expected, operands.len()),
                    });
                }

                self.output.push(op.byte());
                for (i, operand) in operands.into_iter().enumerate() {
                    if op == Opcode::Ldi && i == 1 {
                        self.emit_immediate(operand, line_num)?;
                    } else {
                        let reg = parse_register(operand).ok_or_else(|| {
                            AssemblerError::SyntaxError {
                                line: line_num,
                                message: format!("expected a register, found {:?}", operand),
                            }
                        })?;
                        self.output.push(reg);
                    }
                }
            }
        }

        Ok(())
    }

    /// Emit a byte given as a number or a label.
    fn emit_immediate(&mut self, operand: &str, line_num: usize) -> Result<(), AssemblerError> {
        if is_label(operand) {
            // Placeholder, resolved in pass 2
            self.pending.push((self.output.len(), operand.to_uppercase(), line_num));
            self.output.push(0);
        } else {
            let value = self.parse_number(operand, line_num)?;
            self.output.push(value);
        }
        Ok(())
    }

    fn parse_number(&self, operand: &str, line_num: usize) -> Result<u8, AssemblerError> {
        let operand = operand.trim();

        let parsed = if let Some(hex) = operand.strip_prefix("0x").or_else(|| operand.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16)
        } else if let Some(bin) = operand.strip_prefix("0b").or_else(|| operand.strip_prefix("0B")) {
            i64::from_str_radix(bin, 2)
        } else {
            operand.parse::<i64>()
        };

        let value = parsed.map_err(|_| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid number {:?}", operand),
        })?;

        u8::try_from(value).map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value })
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (out_idx, label, line_num) in &self.pending {
            let addr = *self.symbols.get(label).ok_or_else(|| AssemblerError::UndefinedLabel {
                line: *line_num,
                label: label.clone(),
            })?;

            self.output[*out_idx] = u8::try_from(addr).map_err(|_| AssemblerError::ValueOutOfRange {
                line: *line_num,
                value: addr as i64,
            })?;
        }
        Ok(())
    }
}

/// Parse a register operand: `R0`-`R7`, `IM`, `IS` or `SP`.
fn parse_register(operand: &str) -> Option<u8> {
    let upper = operand.to_uppercase();
    match upper.as_str() {
        "IM" => Some(IM),
        "IS" => Some(IS),
        "SP" => Some(SP),
        _ => upper
            .strip_prefix('R')
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|&n| n <= SP),
    }
}

fn is_label(operand: &str) -> bool {
    operand
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("program is too large: {size} bytes exceeds 256")]
    ProgramTooLarge { size: usize },
}
