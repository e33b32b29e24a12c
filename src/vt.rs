//! Thin wrapper around the `vt100` crate presenting the VT interface the
//! rest of the engine is written against (§9 Design Notes: "VT as
//! external" — `init`, `feed`, `resize`, `getCursor`, `getCursorStyle`,
//! `isCursorVisible`, `inAltScreen`, `getPwd`, `getRenderState`,
//! `scrollViewport`, `invalidateRenderState`).
//!
//! `vt100::Parser` already implements most of this; the handful of
//! things it doesn't track (DECSCUSR cursor style, OSC 7 cwd) are kept
//! here as small pieces of side state updated by the output pipeline.

use std::sync::{Arc, Mutex};

/// A style-carrying cell as produced by a render-state snapshot. Stable
/// against ongoing VT mutation — the renderer reads this, not the VT
/// directly, per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSnapshot {
    pub codepoint: u32,
    pub fg: ColorSpec,
    pub bg: ColorSpec,
    pub bold: bool,
    pub italic: bool,
    pub faint: bool,
    pub strikethrough: bool,
    pub inverse: bool,
    pub underline: UnderlineKind,
    /// True for the trailing column of a wide character; the lead cell
    /// carries the glyph, the tail carries this marker instead.
    pub wide_tail: bool,
}

impl Default for CellSnapshot {
    fn default() -> Self {
        CellSnapshot {
            codepoint: b' ' as u32,
            fg: ColorSpec::None,
            bg: ColorSpec::None,
            bold: false,
            italic: false,
            faint: false,
            strikethrough: false,
            inverse: false,
            underline: UnderlineKind::None,
            wide_tail: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpec {
    None,
    Palette(u8),
    Rgb(u8, u8, u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderlineKind {
    None,
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

/// A full-grid snapshot handed to the renderer for one pane.
pub struct RenderState {
    pub rows: u16,
    pub cols: u16,
    pub cells: Vec<CellSnapshot>,
}

impl RenderState {
    pub fn cell(&self, row: u16, col: u16) -> Option<&CellSnapshot> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row as usize * self.cols as usize + col as usize)
    }
}

fn vt_color(c: vt100::Color) -> ColorSpec {
    match c {
        vt100::Color::Default => ColorSpec::None,
        vt100::Color::Idx(i) => ColorSpec::Palette(i),
        vt100::Color::Rgb(r, g, b) => ColorSpec::Rgb(r, g, b),
    }
}

/// Cursor shapes settable via DECSCUSR (`CSI Ps SP q`), tracked here
/// because `vt100::Parser` doesn't surface the raw escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    BlinkingBlock,
    SteadyBlock,
    BlinkingUnderline,
    SteadyUnderline,
    BlinkingBar,
    SteadyBar,
}

impl CursorStyle {
    pub fn from_decscusr(n: u32) -> Option<Self> {
        match n {
            0 | 1 => Some(CursorStyle::BlinkingBlock),
            2 => Some(CursorStyle::SteadyBlock),
            3 => Some(CursorStyle::BlinkingUnderline),
            4 => Some(CursorStyle::SteadyUnderline),
            5 => Some(CursorStyle::BlinkingBar),
            6 => Some(CursorStyle::SteadyBar),
            _ => None,
        }
    }

    /// The numeric parameter DECRQSS should echo back for this style.
    pub fn decscusr_param(&self) -> u32 {
        match self {
            CursorStyle::BlinkingBlock => 1,
            CursorStyle::SteadyBlock => 2,
            CursorStyle::BlinkingUnderline => 3,
            CursorStyle::SteadyUnderline => 4,
            CursorStyle::BlinkingBar => 5,
            CursorStyle::SteadyBar => 6,
        }
    }
}

/// Owns a `vt100::Parser` plus the small bits of state the library
/// doesn't track on its own.
pub struct Vt {
    parser: Arc<Mutex<vt100::Parser>>,
    cursor_style: CursorStyle,
    /// Last directory reported via OSC 7, if any (populated by the
    /// output pipeline, not the parser).
    pwd: Option<String>,
}

impl Vt {
    pub fn init(rows: u16, cols: u16, scrollback: usize) -> Self {
        Vt {
            parser: Arc::new(Mutex::new(vt100::Parser::new(rows, cols, scrollback))),
            cursor_style: CursorStyle::SteadyBlock,
            pwd: None,
        }
    }

    pub fn handle(&self) -> Arc<Mutex<vt100::Parser>> {
        self.parser.clone()
    }

    pub fn feed(&self, bytes: &[u8]) {
        if let Ok(mut p) = self.parser.lock() {
            p.process(bytes);
        }
    }

    pub fn resize(&self, rows: u16, cols: u16) {
        if let Ok(mut p) = self.parser.lock() {
            p.screen_mut().set_size(rows, cols);
        }
    }

    pub fn get_cursor(&self) -> (u16, u16) {
        self.parser
            .lock()
            .map(|p| p.screen().cursor_position())
            .unwrap_or((0, 0))
    }

    pub fn is_cursor_visible(&self) -> bool {
        self.parser
            .lock()
            .map(|p| !p.screen().hide_cursor())
            .unwrap_or(true)
    }

    pub fn in_alt_screen(&self) -> bool {
        self.parser
            .lock()
            .map(|p| p.screen().alternate_screen())
            .unwrap_or(false)
    }

    pub fn get_cursor_style(&self) -> CursorStyle {
        self.cursor_style
    }

    pub fn set_cursor_style(&mut self, style: CursorStyle) {
        self.cursor_style = style;
    }

    pub fn get_pwd(&self) -> Option<&str> {
        self.pwd.as_deref()
    }

    pub fn set_pwd(&mut self, pwd: String) {
        self.pwd = Some(pwd);
    }

    pub fn scroll_viewport(&self, delta: isize) {
        if let Ok(mut p) = self.parser.lock() {
            p.screen_mut().set_scrollback(
                (p.screen().scrollback() as isize + delta).max(0) as usize,
            );
        }
    }

    pub fn invalidate_render_state(&self) {
        // vt100 has no retained "render state" cache of its own; a
        // fresh `get_render_state` call always reflects the live
        // screen, so invalidation is a no-op kept for interface parity
        // with the description in §9.
    }

    /// Snapshot the current screen into a stable `RenderState`, per
    /// §4.3 — the renderer reads from this, never from the live VT, so
    /// concurrent mutation (more bytes arriving) can't tear a frame.
    pub fn get_render_state(&self) -> RenderState {
        let parser = match self.parser.lock() {
            Ok(p) => p,
            Err(_) => {
                return RenderState { rows: 0, cols: 0, cells: Vec::new() };
            }
        };
        let screen = parser.screen();
        let (rows, cols) = screen.size();
        let mut cells = Vec::with_capacity(rows as usize * cols as usize);
        for r in 0..rows {
            let mut c = 0u16;
            while c < cols {
                if let Some(cell) = screen.cell(r, c) {
                    let contents = cell.contents();
                    let codepoint = contents.chars().next().map(|ch| ch as u32).unwrap_or(0);
                    let width = unicode_width::UnicodeWidthStr::width(contents.as_str());
                    cells.push(CellSnapshot {
                        codepoint,
                        fg: vt_color(cell.fgcolor()),
                        bg: vt_color(cell.bgcolor()),
                        bold: cell.bold(),
                        italic: cell.italic(),
                        faint: cell.dim(),
                        strikethrough: false,
                        inverse: cell.inverse(),
                        underline: if cell.underline() {
                            UnderlineKind::Single
                        } else {
                            UnderlineKind::None
                        },
                        wide_tail: false,
                    });
                    c += 1;
                    if width >= 2 {
                        cells.push(CellSnapshot { codepoint: 0, wide_tail: true, ..CellSnapshot::default() });
                        c += 1;
                    }
                } else {
                    cells.push(CellSnapshot::default());
                    c += 1;
                }
            }
            cells.truncate(r as usize * cols as usize + cols as usize);
            while (cells.len() as u16) < (r + 1) * cols {
                cells.push(CellSnapshot::default());
            }
        }
        RenderState { rows, cols, cells }
    }
}
