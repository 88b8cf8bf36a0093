//! Chunk loader: the materialized window of lines in streaming mode.
//!
//! The window moves only when the cursor enters the edge zone (the outer
//! fifth of the window on either side), and every move keeps the focused
//! absolute line inside the new window. Steps are half a chunk, so after a
//! move the cursor sits outside the opposite edge zone.

use crate::error::Result;

/// Inclusive 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, line: usize) -> bool {
        (self.start..=self.end).contains(&line)
    }

    /// `chunk_size` lines from `start`, slid back so it never passes `total`.
    ///
    /// Near end of file the start moves back rather than the window
    /// shrinking, so it is shorter than `chunk_size` only when `total` is.
    pub fn anchored(start: usize, chunk_size: usize, total: usize) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let len = chunk_size.max(1).min(total);
        let start = start.clamp(1, total - len + 1);
        Some(Self {
            start,
            end: start + len - 1,
        })
    }

    /// Window of `chunk_size` lines with `target` near the middle.
    pub fn centered(target: usize, chunk_size: usize, total: usize) -> Option<Self> {
        Self::anchored(target.saturating_sub(chunk_size / 2), chunk_size, total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Unloaded,
    Loaded(Window),
}

/// Result of a window move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowShift {
    pub window: Window,
    /// Cursor position relative to the new window (1-based).
    pub cursor: usize,
}

pub struct ChunkLoader {
    chunk_size: usize,
    state: ChunkState,
    lines: Vec<String>,
}

impl ChunkLoader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            state: ChunkState::Unloaded,
            lines: Vec::new(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn window(&self) -> Option<Window> {
        match self.state {
            ChunkState::Loaded(window) => Some(window),
            ChunkState::Unloaded => None,
        }
    }

    /// Materialized lines of the current window.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Content of an absolute line if it is inside the window.
    pub fn line(&self, line: usize) -> Option<&str> {
        let window = self.window()?;
        if !window.contains(line) {
            return None;
        }
        self.lines.get(line - window.start).map(String::as_str)
    }

    /// Fetch `window` and switch to it. On error the previous state stays.
    fn load<F>(&mut self, window: Window, fetch: F) -> Result<()>
    where
        F: FnOnce(Window) -> Result<Vec<String>>,
    {
        self.lines = fetch(window)?;
        self.state = ChunkState::Loaded(window);
        Ok(())
    }

    /// Initial load anchored at `start`.
    pub fn activate<F>(&mut self, start: usize, total: usize, fetch: F) -> Result<Option<Window>>
    where
        F: FnOnce(Window) -> Result<Vec<String>>,
    {
        let Some(window) = Window::anchored(start, self.chunk_size, total) else {
            self.reset();
            return Ok(None);
        };
        self.load(window, fetch)?;
        Ok(Some(window))
    }

    /// Centre the window on `target` (search hit, goto line).
    ///
    /// Returns the target's position relative to the window.
    pub fn jump_to<F>(&mut self, target: usize, total: usize, fetch: F) -> Result<Option<usize>>
    where
        F: FnOnce(Window) -> Result<Vec<String>>,
    {
        let target = target.clamp(1, total.max(1));
        let Some(window) = Window::centered(target, self.chunk_size, total) else {
            self.reset();
            return Ok(None);
        };
        if self.window() != Some(window) {
            self.load(window, fetch)?;
        }
        Ok(Some(target - window.start + 1))
    }

    /// React to the cursor's position within the window.
    ///
    /// `cursor` is 1-based relative to the current window. Returns the new
    /// window and relative cursor when the window moved.
    pub fn on_cursor<F>(&mut self, cursor: usize, total: usize, fetch: F) -> Result<Option<WindowShift>>
    where
        F: FnOnce(Window) -> Result<Vec<String>>,
    {
        let Some(window) = self.window() else {
            return Ok(None);
        };

        let len = window.len();
        let cursor = cursor.clamp(1, len);
        let edge_zone = (len / 5).max(1);
        let step = (self.chunk_size / 2).max(1);

        let candidate = if cursor <= edge_zone && window.start > 1 {
            Window::anchored(window.start.saturating_sub(step), self.chunk_size, total)
        } else if cursor > len - edge_zone && window.end < total {
            Window::anchored(window.start + step, self.chunk_size, total)
        } else {
            None
        };

        let Some(candidate) = candidate.filter(|c| *c != window) else {
            return Ok(None);
        };

        let focused = window.start + cursor - 1;
        self.load(candidate, fetch)?;
        Ok(Some(WindowShift {
            window: candidate,
            cursor: focused - candidate.start + 1,
        }))
    }

    /// After the file grew, extend a window that the old end of file cut short.
    pub fn on_growth<F>(&mut self, total: usize, fetch: F) -> Result<bool>
    where
        F: FnOnce(Window) -> Result<Vec<String>>,
    {
        let Some(window) = self.window() else {
            return Ok(false);
        };
        match Window::anchored(window.start, self.chunk_size, total) {
            Some(candidate) if candidate != window => {
                self.load(candidate, fetch)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Re-read the current window, clamped to `total` (after invalidation or
    /// a rebuild).
    pub fn reload<F>(&mut self, total: usize, fetch: F) -> Result<Option<Window>>
    where
        F: FnOnce(Window) -> Result<Vec<String>>,
    {
        let Some(window) = self.window() else {
            return Ok(None);
        };
        self.activate(window.start, total, fetch)
    }

    pub fn reset(&mut self) {
        self.state = ChunkState::Unloaded;
        self.lines.clear();
    }
}
