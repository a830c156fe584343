//! One-line CPU state dumps.
//!
//! Format: `TRACE: PC | IR OA OB | R0 R1 R2 R3 R4 R5 R6 R7`, all values in
//! two-digit uppercase hex. Bytes past the end of memory print as `--`.

use crate::cpu::Cpu;
use std::fmt::Write;

/// Render the trace line for the CPU's current state.
pub fn trace_line(cpu: &Cpu) -> String {
    let pc = cpu.regs.pc;
    let mut line = format!("TRACE: {:02X} |", pc);

    for addr in pc..pc + 3 {
        let _ = match cpu.mem.peek(addr) {
            Some(byte) => write!(line, " {:02X}", byte),
            None => write!(line, " --"),
        };
    }
    line.push_str(" |");

    for value in cpu.regs.gp {
        let _ = write!(line, " {:02X}", value);
    }

    line
}
