//! Terminal rendering of vault progress events.

use std::io::{self, Write};

use nexusvault_vault::Progress;

const CLEAR_WIDTH: usize = 80;

/// Draws `[n/total] label` on one line, then replaces it with `✓ label`.
#[derive(Debug, Default)]
pub struct TerminalProgress;

impl TerminalProgress {
    pub fn new() -> Self {
        Self
    }
}

impl Progress for TerminalProgress {
    fn step(&self, step: usize, total: usize, label: &str) {
        let mut out = io::stdout().lock();
        let _ = write!(out, "\r{}", format_step(step, total, label));
        let _ = out.flush();
    }

    fn done(&self, label: &str) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "\r{}\r{}", " ".repeat(CLEAR_WIDTH), format_done(label));
    }
}

fn format_step(step: usize, total: usize, label: &str) -> String {
    format!("[{}/{}] {}", step, total, label)
}

fn format_done(label: &str) -> String {
    format!("✓ {}", label)
}
