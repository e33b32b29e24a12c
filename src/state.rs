//! The State singleton (§3 "State (singleton)"): owns every tab, every
//! float, the daemon/IPC collaborators, the renderer, the MUX-scoped
//! realm, and the small set of flags the main loop checks each
//! iteration.

use std::sync::atomic::{AtomicU64, Ordering};

use portable_pty::{native_pty_system, PtySize, PtySystem};

use crate::config::Config;
use crate::daemon_client::DaemonClient;
use crate::error::Result;
use crate::float::FloatManager;
use crate::ipc::IpcServer;
use crate::pane::Pane;
use crate::realm::Realm;
use crate::renderer::Renderer;
use crate::tab::Tab;
use crate::types::Rect;

static NEXT_NUMERIC_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_numeric_id() -> u64 {
    NEXT_NUMERIC_ID.fetch_add(1, Ordering::Relaxed)
}

/// Scope + target a popup relayed from the daemon was shown under, so
/// the resolution can be routed back to the right realm and, for
/// tab/pane scope, reported against the right `target_uuid` (§4.4
/// "Popup relay").
#[derive(Debug, Clone)]
pub enum PendingPopupScope {
    Mux,
    Tab(usize),
    SplitPane(usize, usize),
    FloatPane(usize),
}

/// Global run flags (§3), grouped so the main loop can clear/check
/// them without threading six separate bools through its signature.
#[derive(Debug, Default)]
pub struct Flags {
    pub running: bool,
    pub needs_render: bool,
    pub force_full_render: bool,
    pub detach_mode: bool,
    pub skip_dead_check: bool,
    pub exit_intent_deadline_ms: Option<u64>,
}

pub struct State {
    pub pty_system: Box<dyn PtySystem + Send>,
    pub tabs: Vec<Tab>,
    pub active_tab: usize,
    pub floats: FloatManager,
    pub daemon: DaemonClient,
    pub ipc: Option<IpcServer>,
    pub pending_pop_response: Option<PendingPopupScope>,
    pub renderer: Renderer,
    pub mux_realm: Realm,
    pub flags: Flags,
    pub term_cols: u16,
    pub term_rows: u16,
    pub config: Config,
    /// True immediately after the prefix byte, waiting for the next
    /// byte to classify as an action (§4.1 stdin handling).
    pub prefix_armed: bool,
}

impl State {
    pub fn new(config: Config, term_cols: u16, term_rows: u16) -> Result<Self> {
        Self::with_command(config, term_cols, term_rows, None)
    }

    /// Like [`State::new`], but spawns the initial pane running
    /// `command` instead of the user's shell (CLI `--command`).
    pub fn with_command(config: Config, term_cols: u16, term_rows: u16, command: Option<&str>) -> Result<Self> {
        let pty_system = native_pty_system();
        let size = PtySize { rows: term_rows, cols: term_cols, pixel_width: 0, pixel_height: 0 };
        let first_pane = Pane::new_local(&*pty_system, next_numeric_id(), command, None, &[], size, config.scrollback_lines)?;
        let tab = Tab::new("main".to_string(), first_pane);

        Ok(State {
            pty_system,
            tabs: vec![tab],
            active_tab: 0,
            floats: FloatManager::default(),
            daemon: DaemonClient::disconnected(),
            ipc: None,
            pending_pop_response: None,
            renderer: Renderer::new(term_cols, term_rows),
            mux_realm: Realm::default(),
            flags: Flags { running: true, needs_render: true, force_full_render: true, ..Flags::default() },
            term_cols,
            term_rows,
            config,
            prefix_armed: false,
        })
    }

    pub fn active_tab(&self) -> &Tab {
        &self.tabs[self.active_tab]
    }

    pub fn active_tab_mut(&mut self) -> &mut Tab {
        &mut self.tabs[self.active_tab]
    }

    /// The cwd used to evaluate `per_cwd` float matches: the active
    /// tab's focused tiled pane's last-known working directory.
    pub fn active_cwd(&self) -> Option<&str> {
        self.active_tab().focused_pane().and_then(|p| p.cached_cwd.as_deref())
    }

    /// Content area available for tab layouts, below the status bar.
    pub fn content_rect(&self) -> Rect {
        Rect::new(0, 0, self.term_cols, self.term_rows.saturating_sub(1))
    }

    /// Recomputes every tab's pane geometry and every float's pixel
    /// rect from its stored percentages (§4.1 step (b)).
    pub fn resize_all(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.term_cols = cols;
        self.term_rows = rows;
        let area = self.content_rect();
        let mut failures = Vec::new();
        for tab in &mut self.tabs {
            tab.layout.resize(area, |pane, rect| {
                pane.rect = rect;
                if let Err(e) = pane.resize(rect.w, rect.h) {
                    failures.push(format!("{e}"));
                }
            });
        }
        for float in &mut self.floats.floats {
            let meta = float.pane.float_meta.as_ref().expect("float carries metadata");
            let x = (area.w as u32 * meta.pct_x as u32 / 100) as u16;
            let y = (area.h as u32 * meta.pct_y as u32 / 100) as u16;
            let w = (area.w as u32 * meta.pct_w as u32 / 100).max(1) as u16;
            let h = (area.h as u32 * meta.pct_h as u32 / 100).max(1) as u16;
            float.pane.rect = Rect::new(x, y, w, h);
            if let Err(e) = float.pane.resize(w, h) {
                failures.push(format!("{e}"));
            }
        }
        self.renderer.resize(cols, rows);
        self.flags.force_full_render = true;
        if let Some(first) = failures.into_iter().next() {
            tracing::warn!(error = %first, "pane resize failed");
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_numeric_id_is_monotonic() {
        let a = next_numeric_id();
        let b = next_numeric_id();
        assert!(b > a);
    }
}
