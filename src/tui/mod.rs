//! TUI debugger for the LS-8 emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and flag display
//! - Hex memory view highlighting PC and SP
//! - Step/run/breakpoint controls
//! - Disassembly view and program output

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
