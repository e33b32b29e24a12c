//! The fundamental unit: a pane (§3 "Pane"). Owns a VT, a tagged
//! backend, and the per-pane transient state the output pipeline and
//! float machinery need (OSC buffer, escape tail, capture buffer,
//! cached cwd, float metadata).

use portable_pty::{PtySize, PtySystem};

use crate::backend::Backend;
use crate::error::Result;
use crate::output_pipeline::OutputPipeline;
use crate::types::{PaneId, Rect};
use crate::vt::Vt;

/// Geometry and style metadata only present on floating panes.
#[derive(Debug, Clone)]
pub struct FloatMeta {
    pub title: String,
    /// A single byte naming the float definition this pane toggles.
    pub float_key: u8,
    /// Percentage geometry so floats stay proportional across resizes.
    pub pct_x: u16,
    pub pct_y: u16,
    pub pct_w: u16,
    pub pct_h: u16,
    pub per_cwd_dir: Option<String>,
    pub sticky: bool,
}

/// Visibility of a floating pane: tab-bound floats use a plain flag;
/// global floats use a per-tab bitmask bounded to 64 tabs (§9).
#[derive(Debug, Clone, Copy)]
pub enum Visibility {
    TabBound(bool),
    Global(u64),
}

impl Visibility {
    pub fn visible_on(&self, tab_index: usize) -> bool {
        match self {
            Visibility::TabBound(b) => *b,
            Visibility::Global(mask) => tab_index < 64 && (mask & (1 << tab_index)) != 0,
        }
    }

    pub fn set_visible_on(&mut self, tab_index: usize, visible: bool) {
        match self {
            Visibility::TabBound(b) => *b = visible,
            Visibility::Global(mask) => {
                if tab_index < 64 {
                    if visible {
                        *mask |= 1 << tab_index;
                    } else {
                        *mask &= !(1 << tab_index);
                    }
                }
            }
        }
    }
}

pub struct Pane {
    pub id: PaneId,
    /// Numeric in-process id, cheaper than the UUID for log lines and
    /// internal indexing.
    pub numeric_id: u64,
    pub rect: Rect,
    pub focused: bool,
    /// `Some(tab_index)` if this is a tab-bound float; `None` for a
    /// global float or a tiled pane.
    pub float_parent_tab: Option<usize>,
    pub visibility: Option<Visibility>,
    pub vt: Vt,
    pub backend: Backend,
    pub output: OutputPipeline,
    pub capture_output: Option<Vec<u8>>,
    pub exit_status: Option<i32>,
    pub cached_cwd: Option<String>,
    pub float_meta: Option<FloatMeta>,
}

impl Pane {
    pub fn new_local(
        pty_system: &dyn PtySystem,
        numeric_id: u64,
        command: Option<&str>,
        cwd: Option<&str>,
        env_lines: &[String],
        size: PtySize,
        scrollback: usize,
    ) -> Result<Self> {
        let backend = crate::backend::LocalBackend::spawn(pty_system, command, cwd, env_lines, size)?;
        Ok(Pane {
            id: PaneId::new(),
            numeric_id,
            rect: Rect::new(0, 0, size.cols, size.rows),
            focused: false,
            float_parent_tab: None,
            visibility: None,
            vt: Vt::init(size.rows, size.cols, scrollback),
            backend: Backend::Local(backend),
            output: OutputPipeline::default(),
            capture_output: None,
            exit_status: None,
            cached_cwd: None,
            float_meta: None,
        })
    }

    pub fn new_daemon(
        numeric_id: u64,
        socket_path: &std::path::Path,
        size: PtySize,
        scrollback: usize,
    ) -> Result<Self> {
        let backend = crate::backend::DaemonBackend::connect(socket_path)?;
        Ok(Pane {
            id: PaneId::new(),
            numeric_id,
            rect: Rect::new(0, 0, size.cols, size.rows),
            focused: false,
            float_parent_tab: None,
            visibility: None,
            vt: Vt::init(size.rows, size.cols, scrollback),
            backend: Backend::Daemon(backend),
            output: OutputPipeline::default(),
            capture_output: None,
            exit_status: None,
            cached_cwd: None,
            float_meta: None,
        })
    }

    /// One `poll()`-driven read cycle: reads raw bytes from the
    /// backend into `scratch`, runs the output pipeline, feeds the
    /// (untouched) block to the VT, and returns whether a clear-screen
    /// was observed and any bytes that must reach the outer terminal
    /// directly. `None` if the backend had nothing to offer.
    pub fn poll(&mut self, scratch: &mut [u8]) -> Result<Option<PanePollOutcome>> {
        let Some(result) = self.backend.poll(scratch)? else {
            return Ok(None);
        };
        if result.bytes.is_empty() && !result.backlog_end {
            return Ok(None);
        }
        if let Some(capture) = self.capture_output.as_mut() {
            capture.extend_from_slice(&result.bytes);
        }
        let outcome = self.output.process(&result.bytes, &self.vt);
        self.vt.feed(&result.bytes);
        if !outcome.to_backend.is_empty() {
            self.backend.write(&outcome.to_backend)?;
        }
        Ok(Some(PanePollOutcome {
            to_outer: outcome.to_outer,
            did_clear: outcome.did_clear,
            backlog_end: result.backlog_end,
        }))
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.rect.w = cols;
        self.rect.h = rows;
        self.vt.resize(rows, cols);
        self.backend.resize(cols, rows)
    }

    /// True if this pane's process lives in the daemon, and so can
    /// survive this side's exit (§8 "Round-trip frame").
    pub fn is_daemon_backed(&self) -> bool {
        matches!(self.backend, Backend::Daemon(_))
    }

    pub fn is_alive(&mut self) -> bool {
        let alive = self.backend.is_alive();
        if !alive && self.exit_status.is_none() {
            self.exit_status = self.backend.exit_code();
        }
        alive
    }

    pub fn close(&mut self) {
        self.backend.close();
    }

    /// `replaceWithPod` (§4.2): atomically swaps this pane's backend
    /// from local to daemon-client (the "disown" path — hand a live
    /// process to the daemon, then reopen as a thin client of it).
    /// The VT is reinitialized empty; per §9 open question (b), the
    /// pane stays blank until the daemon's `output` backlog replay
    /// repaints it.
    pub fn replace_with_daemon(&mut self, socket_path: &std::path::Path, scrollback: usize) -> Result<()> {
        self.backend.close();
        let fresh = crate::backend::DaemonBackend::connect(socket_path)?;
        self.backend = Backend::Daemon(fresh);
        self.vt = Vt::init(self.rect.h, self.rect.w, scrollback);
        self.output = OutputPipeline::default();
        self.capture_output = None;
        self.backend.resize(self.rect.w, self.rect.h)
    }
}

pub struct PanePollOutcome {
    pub to_outer: Vec<u8>,
    pub did_clear: bool,
    pub backlog_end: bool,
}
