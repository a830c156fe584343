//! Stack discipline shared by PUSH/POP, CALL/RET and interrupt entry/exit.
//!
//! The stack lives in main memory and grows downward from SP. There is no
//! overflow or underflow check: SP wraps around the address space and may
//! overwrite program data or the vector table.

use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::Registers;

/// Decrement SP, then store `value` at the new top of stack.
pub fn push(regs: &mut Registers, mem: &mut Memory, value: u8) -> Result<(), MemoryError> {
    let addr = regs.push_slot();
    mem.write(addr, value)
}

/// Load the value at the top of stack, then increment SP.
pub fn pop(regs: &mut Registers, mem: &Memory) -> Result<u8, MemoryError> {
    let addr = regs.pop_slot();
    mem.read(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::registers::{SP, STACK_TOP};

    #[test]
    fn test_push_pop_order() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();

        push(&mut regs, &mut mem, 1).unwrap();
        push(&mut regs, &mut mem, 2).unwrap();
        assert_eq!(regs.sp(), STACK_TOP - 2);
        assert_eq!(mem.read(STACK_TOP as usize - 1).unwrap(), 1);
        assert_eq!(mem.read(STACK_TOP as usize - 2).unwrap(), 2);

        assert_eq!(pop(&mut regs, &mem).unwrap(), 2);
        assert_eq!(pop(&mut regs, &mem).unwrap(), 1);
        assert_eq!(regs.sp(), STACK_TOP);
    }

    #[test]
    fn test_push_below_zero_wraps_silently() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.gp[SP as usize] = 0;

        push(&mut regs, &mut mem, 0xAB).unwrap();
        assert_eq!(regs.sp(), 0xFF);
        assert_eq!(mem.read(0xFF).unwrap(), 0xAB);
    }

    #[test]
    fn test_pop_past_initial_address() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        mem.write(STACK_TOP as usize, 0x77).unwrap();

        assert_eq!(pop(&mut regs, &mem).unwrap(), 0x77);
        assert_eq!(regs.sp(), STACK_TOP + 1);
    }
}
