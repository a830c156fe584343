//! LS-8 CPU registers.
//!
//! The LS-8 has eight general-purpose byte registers, three of which carry
//! reserved roles:
//! - R5: interrupt mask (IM)
//! - R6: interrupt status (IS)
//! - R7: stack pointer (SP)
//!
//! Alongside them live the program counter and the flags register.

use serde::{Serialize, Deserialize};

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// Interrupt mask register index.
pub const IM: u8 = 5;
/// Interrupt status register index.
pub const IS: u8 = 6;
/// Stack pointer register index.
pub const SP: u8 = 7;

/// Initial stack pointer: the stack is empty and grows down from here.
pub const STACK_TOP: u8 = 0xF4;

/// Flags register bits set by `CMP` (`00000LGE`).
pub mod flags {
    /// Equal.
    pub const E: u8 = 0b001;
    /// Greater-than.
    pub const G: u8 = 0b010;
    /// Less-than.
    pub const L: u8 = 0b100;
}

/// The LS-8 register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// General-purpose registers R0..R7.
    pub gp: [u8; REGISTER_COUNT],

    /// Program counter. Kept wider than a byte so that running off the end
    /// of memory surfaces as an out-of-range fetch instead of wrapping.
    pub pc: usize,

    /// Flags register (`00000LGE`).
    pub fl: u8,
}

impl Registers {
    /// Create a register file in its power-on state.
    pub fn new() -> Self {
        let mut gp = [0; REGISTER_COUNT];
        gp[IM as usize] = 0b0000_0001;
        gp[SP as usize] = STACK_TOP;

        Self { gp, pc: 0, fl: 0 }
    }

    /// Read a register, or `None` if the index names no register.
    #[inline]
    pub fn get(&self, index: u8) -> Option<u8> {
        self.gp.get(index as usize).copied()
    }

    /// Mutable access to a register, or `None` if the index names no register.
    #[inline]
    pub fn get_mut(&mut self, index: u8) -> Option<&mut u8> {
        self.gp.get_mut(index as usize)
    }

    /// Current stack pointer.
    #[inline]
    pub fn sp(&self) -> u8 {
        self.gp[SP as usize]
    }

    /// Interrupt mask.
    #[inline]
    pub fn im(&self) -> u8 {
        self.gp[IM as usize]
    }

    /// Interrupt status.
    #[inline]
    pub fn is(&self) -> u8 {
        self.gp[IS as usize]
    }

    /// Set bit `n` of the interrupt status register. Lines past 7 are ignored.
    pub fn raise(&mut self, n: u8) {
        self.gp[IS as usize] |= line_bit(n);
    }

    /// Clear bit `n` of the interrupt status register. Lines past 7 are ignored.
    pub fn acknowledge(&mut self, n: u8) {
        self.gp[IS as usize] &= !line_bit(n);
    }

    /// Move SP down one cell and return the address to write to.
    pub fn push_slot(&mut self) -> usize {
        let sp = &mut self.gp[SP as usize];
        *sp = sp.wrapping_sub(1);
        *sp as usize
    }

    /// Return the address of the top of the stack and move SP up one cell.
    pub fn pop_slot(&mut self) -> usize {
        let sp = &mut self.gp[SP as usize];
        let addr = *sp as usize;
        *sp = sp.wrapping_add(1);
        addr
    }

    /// Advance the program counter past an instruction with `operands`
    /// operand bytes.
    pub fn advance_pc(&mut self, operands: u8) {
        self.pc += 1 + operands as usize;
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u8) {
        self.pc = addr as usize;
    }

    /// True if a flag bit is set.
    pub fn flag(&self, bit: u8) -> bool {
        self.fl & bit != 0
    }
}

fn line_bit(n: u8) -> u8 {
    1u8.checked_shl(n as u32).unwrap_or(0)
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_state() {
        let regs = Registers::new();

        assert_eq!(regs.sp(), 0xF4);
        assert_eq!(regs.im(), 1);
        assert_eq!(regs.is(), 0);
        assert_eq!(regs.pc, 0);
        assert_eq!(regs.fl, 0);
        assert_eq!(&regs.gp[..5], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_register_bounds() {
        let mut regs = Registers::new();

        assert_eq!(regs.get(7), Some(0xF4));
        assert_eq!(regs.get(8), None);
        assert!(regs.get_mut(8).is_none());
    }

    #[test]
    fn test_stack_slots_wrap() {
        let mut regs = Registers::new();
        regs.gp[SP as usize] = 0;

        assert_eq!(regs.push_slot(), 0xFF);
        assert_eq!(regs.sp(), 0xFF);
        assert_eq!(regs.pop_slot(), 0xFF);
        assert_eq!(regs.sp(), 0);
    }

    #[test]
    fn test_raise_and_acknowledge() {
        let mut regs = Registers::new();

        regs.raise(3);
        regs.raise(0);
        assert_eq!(regs.is(), 0b1001);

        regs.acknowledge(3);
        assert_eq!(regs.is(), 0b0001);
    }

    #[test]
    fn test_interrupt_lines_past_seven_are_ignored() {
        let mut regs = Registers::new();
        regs.raise(0);

        regs.raise(8);
        regs.raise(u8::MAX);
        assert_eq!(regs.is(), 0b0001);

        regs.acknowledge(8);
        assert_eq!(regs.is(), 0b0001);
    }

    #[test]
    fn test_advance_pc() {
        let mut regs = Registers::new();
        regs.pc = 10;

        regs.advance_pc(2);
        assert_eq!(regs.pc, 13);

        regs.advance_pc(0);
        assert_eq!(regs.pc, 14);
    }
}
