//! Interrupt controller.
//!
//! Interrupts are polled once per cycle, before fetch. Eight interrupt
//! lines map to the bits of the IS register and are gated by the IM
//! register. Line 0 is driven by a one-second timer.
//!
//! Entering a handler saves PC, FL and R0..R6 on the stack and jumps
//! through the vector table at 0xF8..=0xFF. `IRET` unwinds the frame in
//! reverse order.

use crate::cpu::memory::{Memory, MemoryError, VECTOR_TABLE};
use crate::cpu::registers::{Registers, IS};
use crate::cpu::stack;
use serde::{Serialize, Deserialize};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Interrupt line raised by the timer.
pub const TIMER_INTERRUPT: u8 = 0;

/// Number of interrupt lines.
pub const INTERRUPT_COUNT: u8 = 8;

/// Source of wall-clock seconds for the timer interrupt.
///
/// Implementations must not block.
pub trait Clock {
    /// Current time in whole seconds.
    fn now_secs(&self) -> u64;
}

/// The host's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep a handle while the CPU
/// owns another. A manual clock that is never advanced disables the timer.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    secs: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, secs: u64) {
        self.secs.set(self.secs.get() + secs);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.secs.get()
    }
}

/// Interrupt controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupts {
    /// Whether interrupts are serviced. Cleared on handler entry, set by IRET.
    pub enabled: bool,
    /// Last wall-clock second at which the timer fired (or construction time).
    pub last_tick: u64,
}

impl Interrupts {
    pub fn new(now: u64) -> Self {
        Self {
            enabled: true,
            last_tick: now,
        }
    }

    /// Run one interrupt check.
    ///
    /// Returns the line that was dispatched, if any. At most one interrupt is
    /// serviced per call; other pending lines wait for later cycles.
    pub fn poll(
        &mut self,
        regs: &mut Registers,
        mem: &mut Memory,
        now: u64,
    ) -> Result<Option<u8>, MemoryError> {
        if !self.enabled {
            return Ok(None);
        }

        if now.saturating_sub(self.last_tick) >= 1 {
            regs.raise(TIMER_INTERRUPT);
            self.last_tick = now;
            debug!(now, "timer tick");
        }

        let masked = regs.im() & regs.is();
        let Some(line) = (0..INTERRUPT_COUNT).find(|i| masked & (1 << i) != 0) else {
            return Ok(None);
        };

        self.enabled = false;
        regs.acknowledge(line);

        // PC is always a fetchable address here, so it fits in a byte.
        let return_addr = u8::try_from(regs.pc).map_err(|_| MemoryError::OutOfRange(regs.pc))?;
        stack::push(regs, mem, return_addr)?;
        let fl = regs.fl;
        stack::push(regs, mem, fl)?;
        for r in 0..=IS {
            let value = regs.gp[r as usize];
            stack::push(regs, mem, value)?;
        }

        let handler = mem.read(VECTOR_TABLE + line as usize)?;
        debug!(line, handler, return_addr, "dispatching interrupt");
        regs.jump(handler);

        Ok(Some(line))
    }

    /// Unwind an interrupt frame and re-enable interrupts.
    pub fn return_from_interrupt(
        &mut self,
        regs: &mut Registers,
        mem: &Memory,
    ) -> Result<(), MemoryError> {
        for r in (0..=IS).rev() {
            let value = stack::pop(regs, mem)?;
            regs.gp[r as usize] = value;
        }
        regs.fl = stack::pop(regs, mem)?;
        let pc = stack::pop(regs, mem)?;
        regs.jump(pc);
        self.enabled = true;

        debug!(pc, "returned from interrupt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::registers::{IM, STACK_TOP};

    fn setup() -> (Interrupts, Registers, Memory) {
        (Interrupts::new(0), Registers::new(), Memory::new())
    }

    #[test]
    fn test_no_pending_interrupt() {
        let (mut ints, mut regs, mut mem) = setup();

        assert_eq!(ints.poll(&mut regs, &mut mem, 0).unwrap(), None);
        assert!(ints.enabled);
        assert_eq!(regs.sp(), STACK_TOP);
    }

    #[test]
    fn test_timer_fires_after_one_second() {
        let (mut ints, mut regs, mut mem) = setup();
        mem.write(0xF8, 0x40).unwrap();
        regs.pc = 0x10;

        assert_eq!(ints.poll(&mut regs, &mut mem, 1).unwrap(), Some(0));
        assert_eq!(ints.last_tick, 1);
        assert_eq!(regs.pc, 0x40);
        assert_eq!(regs.is(), 0);
        assert!(!ints.enabled);
    }

    #[test]
    fn test_masked_interrupt_stays_pending() {
        let (mut ints, mut regs, mut mem) = setup();
        regs.raise(3);

        assert_eq!(ints.poll(&mut regs, &mut mem, 0).unwrap(), None);
        assert_eq!(regs.is(), 0b1000);
    }

    #[test]
    fn test_lowest_line_wins() {
        let (mut ints, mut regs, mut mem) = setup();
        regs.gp[IM as usize] = 0xFF;
        regs.raise(5);
        regs.raise(2);
        mem.write(0xFA, 0x22).unwrap();

        assert_eq!(ints.poll(&mut regs, &mut mem, 0).unwrap(), Some(2));
        assert_eq!(regs.pc, 0x22);
        assert_eq!(regs.is(), 0b10_0000);
    }

    #[test]
    fn test_disabled_controller_ignores_everything() {
        let (mut ints, mut regs, mut mem) = setup();
        ints.enabled = false;
        regs.raise(0);

        assert_eq!(ints.poll(&mut regs, &mut mem, 10).unwrap(), None);
        assert_eq!(ints.last_tick, 0);
    }

    #[test]
    fn test_frame_layout_and_return() {
        let (mut ints, mut regs, mut mem) = setup();
        regs.pc = 0x33;
        regs.fl = 0b010;
        for r in 0..5 {
            regs.gp[r] = 0x10 + r as u8;
        }
        regs.gp[IM as usize] = 0xFF;
        regs.raise(0);
        regs.raise(1);
        // IS is acknowledged before the frame is saved; line 1 stays pending.
        let mut expected = regs.gp;
        expected[IS as usize] = 0b10;

        ints.poll(&mut regs, &mut mem, 0).unwrap();

        let top = STACK_TOP as usize;
        assert_eq!(mem.read(top - 1).unwrap(), 0x33);
        assert_eq!(mem.read(top - 2).unwrap(), 0b010);
        for r in 0..7 {
            assert_eq!(mem.read(top - 3 - r).unwrap(), expected[r]);
        }
        assert_eq!(mem.read(top - 9).unwrap(), 0b10);
        assert_eq!(regs.sp() as usize, top - 9);

        // Clobber everything the frame protects, including IS.
        regs.gp[..7].copy_from_slice(&[0xEE; 7]);
        regs.fl = 0;
        ints.return_from_interrupt(&mut regs, &mem).unwrap();

        assert!(ints.enabled);
        assert_eq!(regs.pc, 0x33);
        assert_eq!(regs.fl, 0b010);
        assert_eq!(regs.gp, expected);
        assert_eq!(regs.is(), 0b10);
        assert_eq!(regs.sp(), STACK_TOP);
    }

    #[test]
    fn test_manual_clock_shares_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        handle.advance(3);
        assert_eq!(clock.now_secs(), 3);
    }
}
