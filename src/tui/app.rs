//! Debugger application state and logic.

use crate::Cpu;
use crate::asm::disasm::{disassemble_at, disassemble_instruction};
use crate::cpu::ManualClock;
use crate::cpu::memory::MEMORY_SIZE;
use std::collections::HashSet;

/// Bytes shown per row in the memory view.
pub const ROW_BYTES: usize = 16;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Original program for reference.
    pub program: Vec<u8>,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<usize>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Everything the program has printed.
    pub console: String,
    /// Memory view scroll offset, in rows.
    pub mem_scroll: usize,
    /// Whether the CPU's timer interrupt follows the wall clock.
    timer: bool,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<u8>, timer: bool) -> Self {
        let cpu = Self::fresh_cpu(&program, timer);

        Self {
            cpu,
            program,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            console: String::new(),
            mem_scroll: 0,
            timer,
        }
    }

    fn fresh_cpu(program: &[u8], timer: bool) -> Cpu {
        let mut cpu = if timer {
            Cpu::new()
        } else {
            Cpu::with_clock(ManualClock::new())
        };
        // Programs reaching the debugger have already been size-checked.
        let _ = cpu.load_program(program);
        cpu
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        match self.cpu.step() {
            Ok(instr) => {
                self.status = format!("PC={:02X}: {}", pc, disassemble_instruction(&instr));
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
        self.console.push_str(&self.cpu.take_output());
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() {
            self.running = false;
            self.status = format!("Stopped after {} cycles", self.cpu.cycles);
            return;
        }

        self.step();

        // Check for breakpoint
        let pc = self.cpu.regs.pc;
        if self.running && self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={:02X}", pc);
        }
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:02X}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:02X}", pc);
        }
    }

    /// Start over with a fresh CPU running the original program.
    pub fn reset(&mut self) {
        self.cpu = Self::fresh_cpu(&self.program, self.timer);
        self.console.clear();
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Scroll the memory view.
    pub fn scroll_memory(&mut self, delta: isize) {
        let max = MEMORY_SIZE / ROW_BYTES - 1;
        self.mem_scroll = self.mem_scroll.saturating_add_signed(delta).min(max);
    }

    /// Get disassembly around the current PC.
    ///
    /// Instructions are found by decoding linearly from address 0, so data
    /// embedded in code may throw the listing out of step with execution.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(usize, String, bool)> {
        let pc = self.cpu.regs.pc;
        let bytes = self.cpu.mem.as_slice();

        let mut listing = Vec::new();
        let mut addr = 0;
        while addr < bytes.len() {
            if addr > pc && listing.last().map_or(false, |&(prev, _, _)| prev < pc) {
                // PC points into the middle of what we decoded; show it anyway.
                let (text, _) = disassemble_at(bytes, pc);
                listing.push((pc, text, true));
            }
            let (text, len) = disassemble_at(bytes, addr);
            listing.push((addr, text, addr == pc));
            addr += len.max(1);
        }

        let current = listing.iter().position(|(_, _, cur)| *cur).unwrap_or(0);
        let start = current.saturating_sub(lines / 2);
        listing.into_iter().skip(start).take(lines).collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<u8>, timer: bool) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create app
    let mut app = DebuggerApp::new(program, timer);

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_memory(-1),
                        KeyCode::Down => app.scroll_memory(1),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
