//! Arithmetic/logic unit.
//!
//! All register writes wrap modulo 256. Shifts by eight or more bits
//! produce zero.

use crate::cpu::decode::Opcode;
use crate::cpu::execute::CpuError;
use crate::cpu::registers::{flags, Registers};

/// Execute an ALU operation on registers `a` and `b`.
///
/// `CMP` writes the flags register; every other operation writes `reg[a]`.
/// On error the register file is left untouched.
pub fn apply(regs: &mut Registers, op: Opcode, a: u8, b: u8) -> Result<(), CpuError> {
    let x = regs.get(a).ok_or(CpuError::InvalidRegister(a))?;
    // Single-operand ops (INC, DEC, NOT) still name a second register byte
    // that is never read.
    let rb = regs.get(b);
    let y = || rb.ok_or(CpuError::InvalidRegister(b));

    let result = match op {
        Opcode::Add => x.wrapping_add(y()?),
        Opcode::Sub => x.wrapping_sub(y()?),
        Opcode::Mul => x.wrapping_mul(y()?),
        Opcode::Div => x.checked_div(y()?).ok_or(CpuError::DivisionByZero)?,
        Opcode::Mod => x.checked_rem(y()?).ok_or(CpuError::DivisionByZero)?,
        Opcode::Inc => x.wrapping_add(1),
        Opcode::Dec => x.wrapping_sub(1),
        Opcode::And => x & y()?,
        Opcode::Or => x | y()?,
        Opcode::Xor => x ^ y()?,
        Opcode::Not => !x,
        Opcode::Shl => x.checked_shl(y()? as u32).unwrap_or(0),
        Opcode::Shr => x.checked_shr(y()? as u32).unwrap_or(0),
        Opcode::Cmp => {
            regs.fl = compare(x, y()?);
            return Ok(());
        }
        other => return Err(CpuError::UnsupportedAluOp(other)),
    };

    if let Some(dest) = regs.get_mut(a) {
        *dest = result;
    }
    Ok(())
}

/// Flags value for comparing `x` against `y`: exactly one of L, G, E.
pub fn compare(x: u8, y: u8) -> u8 {
    match x.cmp(&y) {
        std::cmp::Ordering::Equal => flags::E,
        std::cmp::Ordering::Greater => flags::G,
        std::cmp::Ordering::Less => flags::L,
    }
}
