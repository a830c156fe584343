//! Disassembler for LS-8 programs.
//!
//! Converts program bytes back to readable assembly.

use crate::cpu::decode::{decode, Instruction, Opcode};

/// Disassemble the instruction starting at `addr`.
///
/// Returns the text and the number of bytes it occupies. Bytes that are not
/// opcodes render as `DB` data. Operands past the end of `bytes` read as 0.
pub fn disassemble_at(bytes: &[u8], addr: usize) -> (String, usize) {
    let Some(&ir) = bytes.get(addr) else {
        return (String::new(), 0);
    };

    match decode(ir) {
        Ok(op) => {
            let a = bytes.get(addr + 1).copied().unwrap_or(0);
            let b = bytes.get(addr + 2).copied().unwrap_or(0);
            let instr = Instruction::new(op, a, b);
            (disassemble_instruction(&instr), instr.len())
        }
        Err(_) => (format!("DB {:#04x}", ir), 1),
    }
}

/// Disassemble a slice of program bytes into a listing.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("; LS-8 Disassembly\n");
    output.push_str("; -----------------\n\n");

    let mut addr = 0;
    while addr < bytes.len() {
        let (line, len) = disassemble_at(bytes, addr);
        let end = (addr + len).min(bytes.len());
        let raw: Vec<String> = bytes[addr..end].iter().map(|b| format!("{:02X}", b)).collect();
        output.push_str(&format!("{:02X}: {:<14} ; {}\n", addr, line, raw.join(" ")));
        addr += len;
    }

    output
}

/// Format a decoded instruction as assembly text.
pub fn disassemble_instruction(instr: &Instruction) -> String {
    let (a, b) = (instr.a(), instr.b());

    match instr.op {
        // The only instruction taking an immediate
        Opcode::Ldi => format!("LDI R{},{}", a, b),

        op => match op.operand_count() {
            0 => op.mnemonic().to_string(),
            1 => format!("{} R{}", op, a),
            _ => format!("{} R{},R{}", op, a, b),
        },
    }
}
