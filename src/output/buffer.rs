//! Per-session output buffer
//!
//! Raw chunks are kept in arrival order under a byte budget. The same bytes are fed
//! through a `vte` parser into a line-oriented virtual screen whose text is what
//! search scans; escape sequences never reach the rendered text.

use std::collections::VecDeque;

use serde::Serialize;
use vte::{Params, Parser, Perform};

const TAB_WIDTH: usize = 8;

/// Rendered lines wrap at this many columns
pub const MAX_LINE_WIDTH: usize = 4096;

/// Eviction limits for one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub scrollback_bytes: usize,
    pub scrollback_lines: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            scrollback_bytes: 4 * 1024 * 1024,
            scrollback_lines: 10_000,
        }
    }
}

/// Buffer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub write_cursor: u64,
    pub chunks_received: u64,
    pub retained_bytes: usize,
    pub retained_lines: usize,
    pub evicted_lines: u64,
}

/// Line-oriented text rendering of the output stream
#[derive(Debug, Default)]
struct VirtualScreen {
    lines: VecDeque<String>,
    current: Vec<char>,
    col: usize,
    evicted: u64,
    max_lines: usize,
}

impl VirtualScreen {
    fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            ..Default::default()
        }
    }

    fn put(&mut self, c: char) {
        if self.col >= MAX_LINE_WIDTH {
            self.newline();
        }
        if self.col < self.current.len() {
            self.current[self.col] = c;
        } else {
            self.current.resize(self.col, ' ');
            self.current.push(c);
        }
        self.col += 1;
    }

    fn newline(&mut self) {
        let line: String = self.current.drain(..).collect();
        self.lines.push_back(line.trim_end().to_string());
        self.col = 0;
        self.trim();
    }

    fn trim(&mut self) {
        // The current (unterminated) line counts towards the limit.
        while self.lines.len() + 1 > self.max_lines && !self.lines.is_empty() {
            self.lines.pop_front();
            self.evicted += 1;
        }
    }

    fn move_to(&mut self, col: usize) {
        self.col = col.min(MAX_LINE_WIDTH - 1);
    }

    fn erase_line(&mut self, mode: u16) {
        match mode {
            0 => self.current.truncate(self.col),
            1 => {
                let end = self.col.min(self.current.len().saturating_sub(1));
                for cell in self.current.iter_mut().take(end + 1) {
                    *cell = ' ';
                }
            }
            _ => self.current.clear(),
        }
    }

    fn clear(&mut self) {
        self.evicted += self.lines.len() as u64;
        self.lines.clear();
        self.current.clear();
        self.col = 0;
    }

    fn line_count(&self) -> usize {
        self.lines.len() + 1
    }

    fn current_text(&self) -> String {
        let text: String = self.current.iter().collect();
        text.trim_end().to_string()
    }
}

struct ScreenPerformer<'a> {
    screen: &'a mut VirtualScreen,
}

impl Perform for ScreenPerformer<'_> {
    fn print(&mut self, c: char) {
        self.screen.put(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.screen.newline(),
            b'\r' => self.screen.col = 0,
            0x08 => self.screen.col = self.screen.col.saturating_sub(1),
            b'\t' => {
                let next = ((self.screen.col / TAB_WIDTH + 1) * TAB_WIDTH).min(MAX_LINE_WIDTH);
                while self.screen.col < next {
                    self.screen.put(' ');
                }
            }
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        if !intermediates.is_empty() {
            return;
        }
        let first = params
            .iter()
            .next()
            .and_then(|p| p.first().copied())
            .unwrap_or(0);

        match action {
            'K' => self.screen.erase_line(first),
            'C' => {
                let col = self.screen.col.saturating_add(usize::from(first.max(1)));
                self.screen.move_to(col);
            }
            'D' => self.screen.col = self.screen.col.saturating_sub(usize::from(first.max(1))),
            'G' => self.screen.move_to(usize::from(first.max(1)) - 1),
            'J' if first == 3 => self.screen.clear(),
            _ => {}
        }
    }
}

/// Append-only output buffer for a single session
pub struct OutputBuffer {
    chunks: VecDeque<Vec<u8>>,
    retained_bytes: usize,
    write_cursor: u64,
    chunks_received: u64,
    limits: BufferLimits,
    screen: VirtualScreen,
    parser: Parser,
}

impl OutputBuffer {
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            chunks: VecDeque::new(),
            retained_bytes: 0,
            write_cursor: 0,
            chunks_received: 0,
            limits,
            screen: VirtualScreen::new(limits.scrollback_lines),
            parser: Parser::new(),
        }
    }

    /// Append a chunk in arrival order
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        let mut performer = ScreenPerformer {
            screen: &mut self.screen,
        };
        for &byte in bytes {
            self.parser.advance(&mut performer, byte);
        }

        self.chunks.push_back(bytes.to_vec());
        self.retained_bytes += bytes.len();
        self.write_cursor += bytes.len() as u64;
        self.chunks_received += 1;
        self.evict();
    }

    fn evict(&mut self) {
        // Always keep the newest chunk, even if it alone exceeds the budget.
        while self.retained_bytes > self.limits.scrollback_bytes && self.chunks.len() > 1 {
            if let Some(oldest) = self.chunks.pop_front() {
                self.retained_bytes -= oldest.len();
            }
        }
    }

    /// Apply new limits, evicting immediately if they shrank
    pub fn set_limits(&mut self, limits: BufferLimits) {
        self.limits = limits;
        self.screen.max_lines = limits.scrollback_lines.max(1);
        self.screen.trim();
        self.evict();
    }

    /// Drop scrollback while keeping the write cursor
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.retained_bytes = 0;
        self.screen.clear();
    }

    /// Total bytes ever appended
    pub fn write_cursor(&self) -> u64 {
        self.write_cursor
    }

    /// Retained raw bytes, oldest first
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.retained_bytes);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Absolute index of the first retained line
    pub fn first_line(&self) -> u64 {
        self.screen.evicted
    }

    /// Retained rendered lines, including the unterminated current line
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.screen.lines.iter().cloned().collect();
        lines.push(self.screen.current_text());
        lines
    }

    /// Rendered text joined with newlines
    pub fn rendered_text(&self) -> String {
        self.lines().join("\n")
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            write_cursor: self.write_cursor,
            chunks_received: self.chunks_received,
            retained_bytes: self.retained_bytes,
            retained_lines: self.screen.line_count(),
            evicted_lines: self.screen.evicted,
        }
    }
}
