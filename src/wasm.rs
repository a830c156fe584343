//! WebAssembly bindings for the LS-8 emulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.
//! The wall clock is not available on `wasm32-unknown-unknown`, so the timer
//! interrupt is driven by the host through [`WasmCpu::advance_clock`].

use wasm_bindgen::prelude::*;
use crate::Cpu;
use crate::asm::assembler::assemble;
use crate::asm::disasm::{disassemble, disassemble_instruction};
use crate::asm::program::parse_program;
use crate::cpu::ManualClock;
use crate::cpu::memory::MEMORY_SIZE;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn js_err(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

/// WebAssembly-friendly CPU wrapper.
#[wasm_bindgen]
pub struct WasmCpu {
    cpu: Cpu,
    clock: ManualClock,
    program: Vec<u8>,
}

#[wasm_bindgen]
impl WasmCpu {
    /// Create a new CPU instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let clock = ManualClock::new();
        Self {
            cpu: Cpu::with_clock(clock.clone()),
            clock,
            program: Vec::new(),
        }
    }

    /// Load a program from assembly source code. Returns its size in bytes.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let bytes = assemble(source).map_err(js_err)?;
        self.load_bytes(bytes)
    }

    /// Load a program in `.ls8` binary-text form. Returns its size in bytes.
    #[wasm_bindgen]
    pub fn load_ls8(&mut self, text: &str) -> Result<usize, JsError> {
        let program = parse_program(text).map_err(js_err)?;
        self.load_bytes(program.bytes)
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let instr = self.cpu.step().map_err(js_err)?;
        Ok(disassemble_instruction(&instr))
    }

    /// Run until halt, fault or `max_cycles`. Returns the total cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        self.cpu.run_limited(max_cycles as u64).map_err(js_err)?;
        Ok(self.cpu.cycles)
    }

    /// Move the emulated clock forward, firing the timer on the next step.
    #[wasm_bindgen]
    pub fn advance_clock(&mut self, secs: u32) {
        self.clock.advance(secs as u64);
    }

    /// Reset CPU to initial state with loaded program.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.cpu = Cpu::with_clock(self.clock.clone());
        if !self.program.is_empty() {
            let _ = self.cpu.load_program(&self.program);
        }
    }

    /// Check if CPU is running.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Check if CPU is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> usize {
        self.cpu.regs.pc
    }

    /// Get a general-purpose register, or 0 for an invalid index.
    #[wasm_bindgen]
    pub fn register(&self, index: u8) -> u8 {
        self.cpu.regs.get(index).unwrap_or(0)
    }

    /// Get the flags register.
    #[wasm_bindgen]
    pub fn flags(&self) -> u8 {
        self.cpu.regs.fl
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state)
    }

    /// Get memory cell value at address.
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: usize) -> u8 {
        self.cpu.mem.peek(addr).unwrap_or(0)
    }

    /// Get all 256 bytes of memory.
    #[wasm_bindgen]
    pub fn memory_all(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.cpu.mem.as_slice())
    }

    /// Get a snapshot of the CPU as a JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.cpu.snapshot()).map_err(js_err)
    }

    /// Collect everything printed since the last call.
    #[wasm_bindgen]
    pub fn take_output(&mut self) -> String {
        self.cpu.take_output()
    }
}

impl WasmCpu {
    fn load_bytes(&mut self, bytes: Vec<u8>) -> Result<usize, JsError> {
        let mut cpu = Cpu::with_clock(self.clock.clone());
        cpu.load_program(&bytes).map_err(js_err)?;

        let len = bytes.len();
        self.cpu = cpu;
        self.program = bytes;
        Ok(len)
    }
}

impl Default for WasmCpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the program size in bytes.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<usize, JsError> {
    let bytes = assemble(source).map_err(js_err)?;
    Ok(bytes.len())
}

/// Disassemble raw program bytes into a listing.
#[wasm_bindgen]
pub fn wasm_disassemble(bytes: &[u8]) -> String {
    disassemble(&bytes[..bytes.len().min(MEMORY_SIZE)])
}
