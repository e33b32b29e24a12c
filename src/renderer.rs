//! Differential renderer: a double-buffered cell grid that emits the
//! minimal ANSI edit sequence each frame (§4.3). This replaces the
//! teacher's ratatui `Frame`/widget composition — here the core writes
//! raw escape sequences directly, because the full-screen surface is
//! the single pane-multiplexing destination rather than a composed
//! widget tree.

use std::io::{self, Write};

use crate::vt::{CellSnapshot, ColorSpec, RenderState, UnderlineKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub codepoint: u32,
    pub fg: ColorSpec,
    pub bg: ColorSpec,
    pub bold: bool,
    pub italic: bool,
    pub faint: bool,
    pub strikethrough: bool,
    pub inverse: bool,
    pub underline: UnderlineKind,
}

impl Default for Cell {
    fn default() -> Self {
        Cell {
            codepoint: b' ' as u32,
            fg: ColorSpec::None,
            bg: ColorSpec::None,
            bold: false,
            italic: false,
            faint: false,
            strikethrough: false,
            inverse: false,
            underline: UnderlineKind::None,
        }
    }
}

impl Cell {
    fn from_snapshot(s: &CellSnapshot) -> Self {
        // Control codes and the null marker render as a blank; the
        // wide-tail marker (codepoint 0, wide_tail) never carries a
        // glyph of its own (§4.3 step 2).
        let codepoint = if s.wide_tail {
            0
        } else if s.codepoint == 0 || s.codepoint < 0x20 || s.codepoint == 0x7f {
            b' ' as u32
        } else {
            s.codepoint
        };
        Cell {
            codepoint,
            fg: s.fg,
            bg: s.bg,
            bold: s.bold,
            italic: s.italic,
            faint: s.faint,
            strikethrough: s.strikethrough,
            inverse: s.inverse,
            underline: s.underline,
        }
    }
}

pub struct CellBuffer {
    pub width: u16,
    pub height: u16,
    cells: Vec<Cell>,
}

impl CellBuffer {
    pub fn new(width: u16, height: u16) -> Self {
        CellBuffer { width, height, cells: vec![Cell::default(); width as usize * height as usize] }
    }

    fn idx(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u16, y: u16) -> Cell {
        self.cells[self.idx(x, y)]
    }

    pub fn set(&mut self, x: u16, y: u16, cell: Cell) {
        if x < self.width && y < self.height {
            let idx = self.idx(x, y);
            self.cells[idx] = cell;
        }
    }

    fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = Cell::default());
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.cells = vec![Cell::default(); width as usize * height as usize];
    }
}

/// Tracked SGR state so `endFrame` only emits the attributes that
/// actually changed between consecutive cells (§4.3 "SGR state
/// tracking").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SgrState {
    fg: ColorSpec,
    bg: ColorSpec,
    bold: bool,
    italic: bool,
    faint: bool,
    strikethrough: bool,
    inverse: bool,
    underline: UnderlineKind,
}

impl Default for SgrState {
    fn default() -> Self {
        SgrState {
            fg: ColorSpec::None,
            bg: ColorSpec::None,
            bold: false,
            italic: false,
            faint: false,
            strikethrough: false,
            inverse: false,
            underline: UnderlineKind::None,
        }
    }
}

pub struct Renderer {
    current: CellBuffer,
    next: CellBuffer,
    sgr: SgrState,
}

impl Renderer {
    pub fn new(width: u16, height: u16) -> Self {
        Renderer {
            current: CellBuffer::new(width, height),
            next: CellBuffer::new(width, height),
            sgr: SgrState::default(),
        }
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.current.resize(width, height);
        self.next.resize(width, height);
        self.invalidate();
    }

    /// Forces the next `endFrame` to be a full redraw, by zeroing
    /// `current` so every cell compares as different.
    pub fn invalidate(&mut self) {
        self.current.clear();
    }

    pub fn begin_frame(&mut self) {
        self.next.clear();
    }

    pub fn set_cell(&mut self, x: u16, y: u16, cell: Cell) {
        self.next.set(x, y, cell);
    }

    /// Stamps one pane's render-state snapshot into the frame buffer
    /// at `(offset_x, offset_y)`, clipped to `(w, h)`.
    pub fn draw_render_state(&mut self, state: &RenderState, offset_x: u16, offset_y: u16, w: u16, h: u16) {
        for row in 0..h.min(state.rows) {
            for col in 0..w.min(state.cols) {
                if let Some(snap) = state.cell(row, col) {
                    let mut cell = Cell::from_snapshot(snap);
                    if !snap.wide_tail && snap.bg == ColorSpec::None && snap.fg == ColorSpec::None
                        && snap.codepoint == 0
                    {
                        cell = Cell::default();
                    }
                    self.set_cell(offset_x + col, offset_y + row, cell);
                }
            }
        }
    }

    /// Emits the minimal diff between `current` and `next` to `out`,
    /// then swaps buffers. Returns true if anything was written.
    pub fn end_frame<W: Write>(&mut self, out: &mut W, force_full: bool) -> io::Result<bool> {
        let width = self.next.width;
        let height = self.next.height;

        let differs = force_full
            || (0..width as usize * height as usize).any(|i| self.current.cells[i] != self.next.cells[i]);

        if !differs {
            std::mem::swap(&mut self.current, &mut self.next);
            return Ok(false);
        }

        let mut buf: Vec<u8> = Vec::with_capacity(width as usize * height as usize * 4);
        buf.extend_from_slice(b"\x1b[?2026h");
        buf.extend_from_slice(b"\x1b[?25l");
        buf.extend_from_slice(b"\x1b[0m");
        self.sgr = SgrState::default();
        if force_full {
            buf.extend_from_slice(b"\x1b[H\x1b[2J");
        }

        for y in 0..height {
            self.emit_row(&mut buf, y, width, force_full);
        }

        buf.extend_from_slice(b"\x1b[0m\x1b[?2026l");
        out.write_all(&buf)?;
        out.flush()?;

        std::mem::swap(&mut self.current, &mut self.next);
        Ok(true)
    }

    fn emit_row(&mut self, buf: &mut Vec<u8>, y: u16, width: u16, force_full: bool) {
        let first_diff = if force_full {
            0
        } else {
            match (0..width).find(|&x| self.current.get(x, y) != self.next.get(x, y)) {
                Some(x) => x,
                None => return,
            }
        };

        // Uniform blank tail optimization: find the last column that
        // differs from a blank default cell, walking back from the end.
        let blank = Cell::default();
        let mut last_nonblank = width;
        while last_nonblank > first_diff && self.next.get(last_nonblank - 1, y) == blank {
            last_nonblank -= 1;
        }

        buf.extend_from_slice(format!("\x1b[{};1H", y + 1).as_bytes());
        if first_diff > 0 {
            buf.extend_from_slice(format!("\x1b[{}C", first_diff).as_bytes());
        }

        let mut x = first_diff;
        let mut unchanged_run: u16 = 0;
        while x < last_nonblank {
            let cell = self.next.get(x, y);
            if !force_full && self.current.get(x, y) == cell {
                unchanged_run += 1;
                x += 1;
                continue;
            }
            if unchanged_run > 0 {
                buf.extend_from_slice(format!("\x1b[{}C", unchanged_run).as_bytes());
                unchanged_run = 0;
            }
            self.emit_cell(buf, cell);
            x += 1;
        }
        if unchanged_run > 0 {
            buf.extend_from_slice(format!("\x1b[{}C", unchanged_run).as_bytes());
        }

        if last_nonblank < width {
            self.apply_sgr(buf, &blank);
            buf.extend_from_slice(b"\x1b[K");
        }
    }

    fn emit_cell(&mut self, buf: &mut Vec<u8>, cell: Cell) {
        self.apply_sgr(buf, &cell);
        if cell.codepoint == 0 {
            // wide-character tail: advance without a glyph (§4.3 step 3).
            buf.extend_from_slice(b"\x1b[1C");
            return;
        }
        let ch = char::from_u32(cell.codepoint).unwrap_or(' ');
        let mut tmp = [0u8; 4];
        buf.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
    }

    fn apply_sgr(&mut self, buf: &mut Vec<u8>, cell: &Cell) {
        let need_reset = (self.sgr.bold && !cell.bold)
            || (self.sgr.italic && !cell.italic)
            || (self.sgr.faint && !cell.faint)
            || (self.sgr.strikethrough && !cell.strikethrough)
            || (self.sgr.inverse && !cell.inverse)
            || (self.sgr.underline != UnderlineKind::None && cell.underline == UnderlineKind::None);

        if need_reset {
            buf.extend_from_slice(b"\x1b[0m");
            self.sgr = SgrState::default();
        }

        if cell.bold && !self.sgr.bold {
            buf.extend_from_slice(b"\x1b[1m");
        }
        if cell.faint && !self.sgr.faint {
            buf.extend_from_slice(b"\x1b[2m");
        }
        if cell.italic && !self.sgr.italic {
            buf.extend_from_slice(b"\x1b[3m");
        }
        if cell.underline != UnderlineKind::None && self.sgr.underline != cell.underline {
            match cell.underline {
                UnderlineKind::Single => buf.extend_from_slice(b"\x1b[4m"),
                UnderlineKind::Double => buf.extend_from_slice(b"\x1b[4:2m"),
                UnderlineKind::Curly => buf.extend_from_slice(b"\x1b[4:3m"),
                UnderlineKind::Dotted => buf.extend_from_slice(b"\x1b[4:4m"),
                UnderlineKind::Dashed => buf.extend_from_slice(b"\x1b[4:5m"),
                UnderlineKind::None => {}
            }
        }
        if cell.strikethrough && !self.sgr.strikethrough {
            buf.extend_from_slice(b"\x1b[9m");
        }
        if cell.inverse && !self.sgr.inverse {
            buf.extend_from_slice(b"\x1b[7m");
        }
        if cell.fg != self.sgr.fg {
            match cell.fg {
                ColorSpec::None => buf.extend_from_slice(b"\x1b[39m"),
                ColorSpec::Palette(n) => buf.extend_from_slice(format!("\x1b[38;5;{n}m").as_bytes()),
                ColorSpec::Rgb(r, g, b) => buf.extend_from_slice(format!("\x1b[38;2;{r};{g};{b}m").as_bytes()),
            }
        }
        if cell.bg != self.sgr.bg {
            match cell.bg {
                ColorSpec::None => buf.extend_from_slice(b"\x1b[49m"),
                ColorSpec::Palette(n) => buf.extend_from_slice(format!("\x1b[48;5;{n}m").as_bytes()),
                ColorSpec::Rgb(r, g, b) => buf.extend_from_slice(format!("\x1b[48;2;{r};{g};{b}m").as_bytes()),
            }
        }

        self.sgr = SgrState {
            fg: cell.fg,
            bg: cell.bg,
            bold: cell.bold,
            italic: cell.italic,
            faint: cell.faint,
            strikethrough: cell.strikethrough,
            inverse: cell.inverse,
            underline: cell.underline,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_frame_emits_nothing_and_swaps() {
        let mut r = Renderer::new(10, 3);
        r.begin_frame();
        let mut out = Vec::new();
        let wrote = r.end_frame(&mut out, false).unwrap();
        assert!(!wrote);
        assert!(out.is_empty());
    }

    #[test]
    fn invalidate_forces_full_redraw() {
        let mut r = Renderer::new(4, 1);
        r.begin_frame();
        r.set_cell(0, 0, Cell { codepoint: b'A' as u32, ..Cell::default() });
        let mut out = Vec::new();
        r.end_frame(&mut out, false).unwrap();

        r.invalidate();
        r.begin_frame();
        r.set_cell(0, 0, Cell { codepoint: b'A' as u32, ..Cell::default() });
        let mut out2 = Vec::new();
        let wrote = r.end_frame(&mut out2, false).unwrap();
        assert!(wrote);
        let s = String::from_utf8_lossy(&out2);
        assert!(s.contains("\x1b[2J"));
    }

    #[test]
    fn single_cell_change_is_minimal() {
        let mut r = Renderer::new(10, 3);
        r.begin_frame();
        let mut out = Vec::new();
        r.end_frame(&mut out, false).unwrap(); // establish blank baseline

        r.begin_frame();
        r.set_cell(5, 1, Cell { codepoint: b'A' as u32, bold: true, fg: ColorSpec::Palette(1), ..Cell::default() });
        let mut out2 = Vec::new();
        let wrote = r.end_frame(&mut out2, false).unwrap();
        assert!(wrote);
        let s = String::from_utf8_lossy(&out2);
        assert_eq!(s.matches("\x1b[2;1H").count(), 1);
        assert!(s.contains("\x1b[1m"));
        assert!(s.contains("\x1b[38;5;1m"));
        assert!(s.contains('A'));
    }

    #[test]
    fn wide_tail_never_emits_glyph() {
        let mut r = Renderer::new(4, 1);
        r.begin_frame();
        r.set_cell(0, 0, Cell { codepoint: 0x4e2d, ..Cell::default() }); // 中
        r.set_cell(1, 0, Cell { codepoint: 0, ..Cell::default() });
        let mut out = Vec::new();
        r.end_frame(&mut out, true).unwrap();
        let s = String::from_utf8_lossy(&out);
        assert!(s.contains('\u{4e2d}'));
        assert!(s.contains("\x1b[1C"));
    }
}
