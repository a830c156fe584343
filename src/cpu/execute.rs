//! CPU execution engine for the LS-8.
//!
//! Implements the interrupt-check / fetch / decode / execute / advance cycle
//! and every non-ALU instruction.

use crate::cpu::{alu, stack};
use crate::cpu::decode::{self, DecodeError, Instruction, Opcode};
use crate::cpu::interrupt::{Clock, Interrupts, SystemClock, INTERRUPT_COUNT};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::{flags, Registers, REGISTER_COUNT};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed HLT instruction).
    Halted,
    /// CPU stopped on a fatal error.
    Faulted,
}

/// The LS-8 CPU.
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Interrupt controller.
    pub interrupts: Interrupts,
    /// Instruction count (for profiling).
    pub cycles: u64,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
    /// Console output not yet collected by the host.
    output: String,
    clock: Box<dyn Clock>,
}

impl Cpu {
    /// Create a new CPU driven by the host's wall clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a new CPU whose timer interrupt follows `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        let now = clock.now_secs();
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            interrupts: Interrupts::new(now),
            cycles: 0,
            last_instr: None,
            output: String::new(),
            clock: Box::new(clock),
        }
    }

    /// Load a program into memory at address 0.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_program(program)?;
        debug!(bytes = program.len(), "program loaded");
        Ok(())
    }

    /// Execute a single cycle.
    ///
    /// Returns the instruction that was executed, or an error. A fatal error
    /// moves the CPU to [`CpuState::Faulted`].
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        match self.cycle() {
            Ok(instr) => {
                self.cycles += 1;
                self.last_instr = Some(instr);
                Ok(instr)
            }
            Err(e) => {
                warn!(pc = self.regs.pc, error = %e, "cpu fault");
                self.state = CpuState::Faulted;
                Err(e)
            }
        }
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles + max_cycles;

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    fn cycle(&mut self) -> Result<Instruction, CpuError> {
        let now = self.clock.now_secs();
        self.interrupts.poll(&mut self.regs, &mut self.mem, now)?;

        // Fetch, always reading both operand bytes.
        let pc = self.regs.pc;
        let ir = self.mem.read(pc)?;
        let a = self.mem.read(pc + 1)?;
        let b = self.mem.read(pc + 2)?;

        // Decode
        let op = decode::decode(ir)?;
        let instr = Instruction::new(op, a, b);
        trace!(pc, %op, a, b, "execute");

        // Execute
        self.execute(instr)?;

        // Advance
        if self.state == CpuState::Running && !op.sets_pc() {
            self.regs.advance_pc(op.operand_count());
        }

        Ok(instr)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<(), CpuError> {
        let (a, b) = (instr.a(), instr.b());

        match instr.op {
            op if op.is_alu() => alu::apply(&mut self.regs, op, a, b)?,

            Opcode::Hlt => {
                debug!(pc = self.regs.pc, cycles = self.cycles + 1, "halted");
                self.state = CpuState::Halted;
            }

            // ==================== Data Transfer ====================

            Opcode::Ldi => {
                *self.reg_mut(a)? = b;
            }

            Opcode::Ld => {
                let addr = self.reg(b)?;
                let value = self.mem.read(addr as usize)?;
                *self.reg_mut(a)? = value;
            }

            Opcode::St => {
                let addr = self.reg(a)?;
                let value = self.reg(b)?;
                self.mem.write(addr as usize, value)?;
            }

            Opcode::Push => {
                self.reg(a)?;
                // SP moves before the register is read, so `PUSH SP`
                // stores the decremented pointer.
                let addr = self.regs.push_slot();
                let value = self.reg(a)?;
                self.mem.write(addr, value)?;
            }

            Opcode::Pop => {
                let value = self.mem.read(self.regs.sp() as usize)?;
                *self.reg_mut(a)? = value;
                // SP moves after the write, so `POP SP` lands one past the
                // popped value.
                self.regs.pop_slot();
            }

            // ==================== I/O ====================

            Opcode::Prn => {
                let value = self.reg(a)?;
                self.output.push_str(&format!("{}\n", value));
            }

            Opcode::Pra => {
                let value = self.reg(a)?;
                self.output.push(char::from(value));
            }

            // ==================== Control Flow ====================

            Opcode::Call => {
                let target = self.reg(a)?;
                let return_addr = self.regs.pc + 2;
                let return_addr = u8::try_from(return_addr)
                    .map_err(|_| MemoryError::OutOfRange(return_addr))?;
                stack::push(&mut self.regs, &mut self.mem, return_addr)?;
                self.regs.jump(target);
            }

            Opcode::Ret => {
                let addr = stack::pop(&mut self.regs, &self.mem)?;
                self.regs.jump(addr);
            }

            Opcode::Int => {
                let n = self.reg(a)?;
                if n >= INTERRUPT_COUNT {
                    return Err(CpuError::InvalidInterruptNumber(n));
                }
                self.regs.raise(n);
                debug!(n, "software interrupt raised");
                // INT is encoded as setting the PC, but only raises the line.
                self.regs.advance_pc(instr.op.operand_count());
            }

            Opcode::Iret => {
                self.interrupts.return_from_interrupt(&mut self.regs, &self.mem)?;
            }

            Opcode::Jmp => {
                let target = self.reg(a)?;
                self.regs.jump(target);
            }

            Opcode::Jeq => self.branch(self.regs.flag(flags::E), a)?,
            Opcode::Jne => self.branch(!self.regs.flag(flags::E), a)?,
            Opcode::Jgt => self.branch(self.regs.flag(flags::G), a)?,
            Opcode::Jlt => self.branch(self.regs.flag(flags::L), a)?,
            Opcode::Jge => self.branch(self.regs.flag(flags::G | flags::E), a)?,
            Opcode::Jle => self.branch(self.regs.flag(flags::L | flags::E), a)?,

            // ==================== Special ====================

            Opcode::Nop => {}

            // Every ALU opcode carries the ALU bit and is caught above.
            other => return Err(CpuError::UnsupportedAluOp(other)),
        }

        Ok(())
    }

    /// Jump to the address in register `r` if `taken`, else fall through.
    fn branch(&mut self, taken: bool, r: u8) -> Result<(), CpuError> {
        let target = self.reg(r)?;
        if taken {
            self.regs.jump(target);
        } else {
            self.regs.advance_pc(1);
        }
        Ok(())
    }

    fn reg(&self, r: u8) -> Result<u8, CpuError> {
        self.regs.get(r).ok_or(CpuError::InvalidRegister(r))
    }

    fn reg_mut(&mut self, r: u8) -> Result<&mut u8, CpuError> {
        self.regs.get_mut(r).ok_or(CpuError::InvalidRegister(r))
    }

    /// Console output produced since the last call, leaving the buffer empty.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Console output not yet taken.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Capture the architectural state for inspection or serialization.
    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            state: self.state,
            pc: self.regs.pc,
            fl: self.regs.fl,
            registers: self.regs.gp,
            interrupts_enabled: self.interrupts.enabled,
            cycles: self.cycles,
            last_instruction: self.last_instr,
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("interrupts", &self.interrupts)
            .finish()
    }
}

/// Serializable view of the CPU's architectural state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub state: CpuState,
    pub pc: usize,
    pub fl: u8,
    pub registers: [u8; REGISTER_COUNT],
    pub interrupts_enabled: bool,
    pub cycles: u64,
    pub last_instruction: Option<Instruction>,
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("decode error: {0}")]
    DecodeError(#[from] DecodeError),

    #[error("invalid register R{0}")]
    InvalidRegister(u8),

    #[error("invalid interrupt number {0}")]
    InvalidInterruptNumber(u8),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unsupported ALU operation {0}")]
    UnsupportedAluOp(Opcode),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::interrupt::ManualClock;
    use crate::cpu::registers::{IM, IS, STACK_TOP};

    fn make_cpu(program: &[u8]) -> Cpu {
        let mut cpu = Cpu::with_clock(ManualClock::new());
        cpu.load_program(program).unwrap();
        cpu
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = make_cpu(&[0x01]);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 0);
    }

    #[test]
    fn test_print_eight() {
        let mut cpu = make_cpu(&[0x82, 0x00, 0x08, 0x47, 0x00, 0x00, 0x01]);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 4);
        assert!(cpu.is_halted());
        assert_eq!(cpu.take_output(), "8\n");
        assert_eq!(cpu.output(), "");
    }

    #[test]
    fn test_pra_prints_character() {
        let mut cpu = make_cpu(&[0x82, 0x02, b'A', 0x48, 0x02, 0x01]);
        cpu.run().unwrap();
        assert_eq!(cpu.output(), "A");
    }

    #[test]
    fn test_ldi_invalid_register() {
        let mut cpu = make_cpu(&[0x82, 0x08, 0x01, 0x01]);

        let err = cpu.step().unwrap_err();

        assert_eq!(err, CpuError::InvalidRegister(8));
        assert_eq!(cpu.state, CpuState::Faulted);
    }

    #[test]
    fn test_prn_invalid_register() {
        let mut cpu = make_cpu(&[0x47, 0x09, 0x01]);
        assert_eq!(cpu.step(), Err(CpuError::InvalidRegister(9)));
    }

    #[test]
    fn test_invalid_instruction_stops_execution() {
        let mut cpu = make_cpu(&[0x82, 0x00, 0x01, 0xFF, 0x82, 0x00, 0x02, 0x01]);

        cpu.step().unwrap();
        let err = cpu.step().unwrap_err();

        assert_eq!(err, CpuError::DecodeError(DecodeError::InvalidInstruction(0xFF)));
        assert_eq!(cpu.state, CpuState::Faulted);
        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Faulted)));
        assert_eq!(cpu.regs.gp[0], 1);
        assert_eq!(cpu.cycles, 1);
    }

    #[test]
    fn test_push_pop_roundtrip() {
        let mut cpu = make_cpu(&[
            0x82, 0x00, 0x2A, // LDI R0,42
            0x45, 0x00,       // PUSH R0
            0x46, 0x03,       // POP R3
            0x01,             // HLT
        ]);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.gp[3], 42);
        assert_eq!(cpu.regs.sp(), STACK_TOP);
        assert_eq!(cpu.mem.read(STACK_TOP as usize - 1).unwrap(), 42);
    }

    #[test]
    fn test_push_sp_stores_decremented_pointer() {
        let mut cpu = make_cpu(&[
            0x45, 0x07, // PUSH R7
            0x01,       // HLT
        ]);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.sp(), STACK_TOP - 1);
        assert_eq!(cpu.mem.read(STACK_TOP as usize - 1).unwrap(), STACK_TOP - 1);
    }

    #[test]
    fn test_pop_sp_increments_after_write() {
        let mut cpu = make_cpu(&[
            0x46, 0x07, // POP R7
            0x01,       // HLT
        ]);
        cpu.mem.write(STACK_TOP as usize, 0x80).unwrap();

        cpu.run().unwrap();

        assert_eq!(cpu.regs.sp(), 0x81);
    }

    #[test]
    fn test_call_and_return() {
        let mut cpu = make_cpu(&[
            0x82, 0x01, 0x06, // 0: LDI R1,6
            0x50, 0x01,       // 3: CALL R1
            0x01,             // 5: HLT
            0x82, 0x00, 0x09, // 6: LDI R0,9
            0x11,             // 9: RET
        ]);

        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 6);
        assert_eq!(cpu.mem.read(STACK_TOP as usize - 1).unwrap(), 5);

        cpu.run().unwrap();

        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 5);
        assert_eq!(cpu.regs.gp[0], 9);
        assert_eq!(cpu.regs.sp(), STACK_TOP);
    }

    #[test]
    fn test_conditional_jumps() {
        // R3 ends up 1 if the jump was taken, 0 if it fell through.
        fn jumped(jump: Opcode, x: u8, y: u8) -> bool {
            let mut cpu = make_cpu(&[
                0x82, 0x00, x,      // 0: LDI R0,x
                0x82, 0x01, y,      // 3: LDI R1,y
                0x82, 0x02, 15,     // 6: LDI R2,15
                0xA7, 0x00, 0x01,   // 9: CMP R0,R1
                jump.byte(), 0x02,  // 12: Jxx R2
                0x01,               // 14: HLT
                0x82, 0x03, 0x01,   // 15: LDI R3,1
                0x01,               // 18: HLT
            ]);
            cpu.run().unwrap();
            cpu.regs.gp[3] == 1
        }

        let cases = [
            (Opcode::Jeq, [true, false, false]),
            (Opcode::Jne, [false, true, true]),
            (Opcode::Jgt, [false, true, false]),
            (Opcode::Jlt, [false, false, true]),
            (Opcode::Jge, [true, true, false]),
            (Opcode::Jle, [true, false, true]),
        ];

        for (jump, [eq, gt, lt]) in cases {
            assert_eq!(jumped(jump, 7, 7), eq, "{} equal", jump);
            assert_eq!(jumped(jump, 9, 7), gt, "{} greater", jump);
            assert_eq!(jumped(jump, 3, 7), lt, "{} less", jump);
        }
    }

    #[test]
    fn test_jmp() {
        let mut cpu = make_cpu(&[
            0x82, 0x00, 0x06, // 0: LDI R0,6
            0x54, 0x00,       // 3: JMP R0
            0xFF,             // 5: (invalid, skipped)
            0x01,             // 6: HLT
        ]);

        assert_eq!(cpu.run().unwrap(), 3);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_store_and_load() {
        let mut cpu = make_cpu(&[
            0x82, 0x00, 0x80, // LDI R0,0x80
            0x82, 0x01, 0x5A, // LDI R1,0x5A
            0x84, 0x00, 0x01, // ST R0,R1
            0x83, 0x02, 0x00, // LD R2,R0
            0x01,             // HLT
        ]);

        cpu.run().unwrap();

        assert_eq!(cpu.mem.read(0x80).unwrap(), 0x5A);
        assert_eq!(cpu.regs.gp[2], 0x5A);
    }

    #[test]
    fn test_alu_dispatch_and_division_by_zero() {
        let mut cpu = make_cpu(&[
            0x82, 0x00, 0x0C, // LDI R0,12
            0x82, 0x01, 0x03, // LDI R1,3
            0xA2, 0x00, 0x01, // MUL R0,R1
            0xA3, 0x00, 0x02, // DIV R0,R2 (R2 = 0)
        ]);

        cpu.step().unwrap();
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs.gp[0], 36);

        assert_eq!(cpu.step(), Err(CpuError::DivisionByZero));
        assert_eq!(cpu.regs.gp[0], 36);
    }

    #[test]
    fn test_software_interrupt() {
        let mut cpu = make_cpu(&[
            0x82, 0x00, 0x00, // 0: LDI R0,0
            0x52, 0x00,       // 3: INT R0
            0x01,             // 5: HLT
        ]);
        cpu.mem.write(0x10, 0x82).unwrap(); // 0x10: LDI R1,0x42
        cpu.mem.write(0x11, 0x01).unwrap();
        cpu.mem.write(0x12, 0x42).unwrap();
        cpu.mem.write(0x13, 0x13).unwrap(); // 0x13: IRET
        cpu.mem.write(0xF8, 0x10).unwrap();
        // Line 1 is pending but masked, so IS is non-zero in the frame.
        cpu.regs.raise(1);

        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs.is(), 0b11);
        assert_eq!(cpu.regs.pc, 5);

        // The next cycle dispatches before fetching.
        let instr = cpu.step().unwrap();
        assert_eq!(instr.op, Opcode::Ldi);
        assert!(!cpu.interrupts.enabled);
        assert_eq!(cpu.regs.is(), 0b10);
        assert_eq!(cpu.regs.gp[1], 0x42);

        let top = STACK_TOP as usize;
        assert_eq!(cpu.mem.read(top - 1).unwrap(), 5);    // PC
        assert_eq!(cpu.mem.read(top - 2).unwrap(), 0);    // FL
        assert_eq!(cpu.mem.read(top - 3).unwrap(), 0);    // R0
        assert_eq!(cpu.mem.read(top - 8).unwrap(), 1);    // R5 (IM)
        assert_eq!(cpu.mem.read(top - 9).unwrap(), 0b10); // R6 (IS)
        assert_eq!(cpu.regs.sp() as usize, top - 9);

        assert_eq!(cpu.step().unwrap().op, Opcode::Iret);
        assert!(cpu.interrupts.enabled);
        assert_eq!(cpu.regs.pc, 5);
        assert_eq!(cpu.regs.gp[1], 0);
        assert_eq!(cpu.regs.is(), 0b10);
        assert_eq!(cpu.regs.sp(), STACK_TOP);

        assert_eq!(cpu.step().unwrap().op, Opcode::Hlt);
    }

    #[test]
    fn test_int_invalid_number() {
        let mut cpu = make_cpu(&[
            0x82, 0x00, 0x08, // LDI R0,8
            0x52, 0x00,       // INT R0
        ]);

        cpu.step().unwrap();
        assert_eq!(cpu.step(), Err(CpuError::InvalidInterruptNumber(8)));
        assert_eq!(cpu.regs.is(), 0);
    }

    #[test]
    fn test_timer_interrupt() {
        let clock = ManualClock::new();
        let mut cpu = Cpu::with_clock(clock.clone());
        cpu.load_program(&[0x00, 0x00, 0x00, 0x01]).unwrap();
        cpu.mem.write(0xF8, 0x03).unwrap();

        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 1);

        clock.advance(1);
        let instr = cpu.step().unwrap();

        assert_eq!(instr.op, Opcode::Hlt);
        assert!(cpu.is_halted());
        assert!(!cpu.interrupts.enabled);
        assert_eq!(cpu.mem.read(STACK_TOP as usize - 1).unwrap(), 1);
    }

    #[test]
    fn test_masked_software_interrupt_is_deferred() {
        let mut cpu = make_cpu(&[
            0x82, 0x00, 0x03, // LDI R0,3
            0x52, 0x00,       // INT R0
            0x00,             // NOP
            0x01,             // HLT
        ]);

        cpu.run().unwrap();

        assert!(cpu.interrupts.enabled);
        assert_eq!(cpu.regs.gp[IS as usize], 0b1000);
        assert_eq!(cpu.regs.gp[IM as usize], 0b0001);
    }

    #[test]
    fn test_fetch_ahead_past_end_of_memory() {
        let mut cpu = make_cpu(&[]);
        cpu.mem.write(0xFD, 0x00).unwrap();
        cpu.regs.pc = 0xFD;

        // NOP at 0xFD reads 0xFE and 0xFF, both in range.
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 0xFE);

        // The next fetch-ahead reaches 0x100.
        assert_eq!(
            cpu.step(),
            Err(CpuError::MemoryError(MemoryError::OutOfRange(0x100)))
        );
    }

    #[test]
    fn test_run_limited() {
        // JMP R0 back to itself forever.
        let mut cpu = make_cpu(&[0x54, 0x00]);

        assert_eq!(cpu.run_limited(50).unwrap(), 50);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_snapshot() {
        let mut cpu = make_cpu(&[0x82, 0x04, 0x07, 0x01]);
        cpu.run().unwrap();

        let snap = cpu.snapshot();

        assert_eq!(snap.state, CpuState::Halted);
        assert_eq!(snap.registers[4], 7);
        assert_eq!(snap.registers[7], STACK_TOP);
        assert_eq!(snap.cycles, 2);
        assert_eq!(snap.last_instruction.map(|i| i.op), Some(Opcode::Hlt));
    }
}
