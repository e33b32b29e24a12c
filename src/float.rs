//! Float lifecycle (§4.4): named overlays toggled by a keybinding,
//! ad-hoc overlays spawned over the local IPC socket, and the
//! blocking "wait-for-exit" variant that returns captured output.

use std::collections::HashMap;

use portable_pty::{PtySize, PtySystem};

use crate::config::FloatDef;
use crate::error::Result;
use crate::pane::{FloatMeta, Pane, Visibility};
use crate::types::PaneId;

pub struct Float {
    pub pane: Pane,
}

impl Float {
    fn meta(&self) -> &FloatMeta {
        self.pane.float_meta.as_ref().expect("float pane always carries FloatMeta")
    }

    fn visibility_mut(&mut self) -> &mut Visibility {
        self.pane.visibility.as_mut().expect("float pane always carries Visibility")
    }

    pub fn is_visible_on(&self, tab_index: usize) -> bool {
        self.pane.visibility.as_ref().is_some_and(|v| v.visible_on(tab_index))
    }

    pub fn set_visible_on(&mut self, tab_index: usize, visible: bool) {
        self.visibility_mut().set_visible_on(tab_index, visible);
    }

    /// True if this float is pinned to one tab and that tab isn't `tab_index`.
    pub fn tab_bound_elsewhere(&self, tab_index: usize) -> bool {
        matches!(self.pane.float_parent_tab, Some(t) if t != tab_index)
    }
}

/// Key = pane UUID; value = an ad-hoc "wait for exit" request's pending
/// state (§3 "Ad-hoc float request"). The held connection fd itself
/// lives with the IPC server; this just marks which panes owe a result.
pub struct PendingWait {
    pub result_file: Option<std::path::PathBuf>,
}

#[derive(Default)]
pub struct FloatManager {
    pub floats: Vec<Float>,
    pub active_floating: Option<usize>,
    pub pending_waits: HashMap<String, PendingWait>,
}

impl FloatManager {
    /// Locates an existing float matching a named float definition
    /// (§4.4 "Named float toggle"), split out from the toggle itself so
    /// callers can spawn a replacement pane without holding a borrow of
    /// this manager across the spawn (spawning needs the rest of
    /// `State`, which this manager is itself a field of).
    pub fn find_existing(&self, def: &FloatDef, tab_index: usize, active_cwd: Option<&str>) -> Option<usize> {
        self.floats.iter().position(|f| {
            f.meta().float_key == def.key
                && !f.tab_bound_elsewhere(tab_index)
                && (!def.per_cwd || f.meta().per_cwd_dir.as_deref() == active_cwd)
        })
    }

    /// Toggles an already-located float's visibility on `tab_index`,
    /// applying `exclusive`/`per_cwd` hiding of siblings.
    pub fn toggle_existing(&mut self, idx: usize, def: &FloatDef, tab_index: usize) -> ToggleOutcome {
        let now_visible = !self.floats[idx].is_visible_on(tab_index);
        self.floats[idx].set_visible_on(tab_index, now_visible);

        if !now_visible {
            if self.active_floating == Some(idx) {
                self.active_floating = None;
            }
            return ToggleOutcome::HiddenBackToTile;
        }

        if def.exclusive {
            for (i, f) in self.floats.iter_mut().enumerate() {
                if i != idx {
                    f.set_visible_on(tab_index, false);
                }
            }
        } else if def.per_cwd {
            for (i, f) in self.floats.iter_mut().enumerate() {
                if i != idx && f.meta().float_key == def.key {
                    f.set_visible_on(tab_index, false);
                }
            }
        }
        self.active_floating = Some(idx);
        ToggleOutcome::Focused(idx)
    }

    /// Registers a freshly spawned pane as a new named float and
    /// focuses it.
    pub fn insert_new(&mut self, mut pane: Pane, def: &FloatDef, tab_index: usize, active_cwd: Option<&str>) -> usize {
        pane.float_meta = Some(FloatMeta {
            title: def.command.clone(),
            float_key: def.key,
            pct_x: (100 - def.pct_w) / 2,
            pct_y: (100 - def.pct_h) / 2,
            pct_w: def.pct_w,
            pct_h: def.pct_h,
            per_cwd_dir: if def.per_cwd { active_cwd.map(str::to_string) } else { None },
            sticky: def.sticky,
        });
        pane.visibility = Some(Visibility::TabBound(true));
        pane.float_parent_tab = Some(tab_index);
        self.floats.push(Float { pane });
        let idx = self.floats.len() - 1;
        self.active_floating = Some(idx);
        idx
    }

    /// Spawns an ad-hoc float for an IPC `float` request. When `wait` is
    /// set and the request didn't supply a `result_file`, one is
    /// generated and injected into the child's environment as
    /// `HEXE_FLOAT_RESULT_FILE` (§4.4/§6) so the process has somewhere
    /// to write its captured stdout before exiting.
    pub fn create_adhoc(
        &mut self,
        pty_system: &dyn PtySystem,
        numeric_id: u64,
        command: &str,
        cwd: Option<&str>,
        env_lines: &[String],
        size: PtySize,
        scrollback: usize,
        wait: bool,
        result_file: Option<std::path::PathBuf>,
    ) -> Result<PaneId> {
        let result_file = if wait { Some(result_file.unwrap_or_else(|| default_result_file_path(numeric_id))) } else { None };

        let mut spawn_env = env_lines.to_vec();
        if let Some(path) = &result_file {
            spawn_env.push(format!("HEXE_FLOAT_RESULT_FILE={}", path.display()));
        }

        let mut pane = Pane::new_local(pty_system, numeric_id, Some(command), cwd, &spawn_env, size, scrollback)?;
        pane.float_meta = Some(FloatMeta {
            title: command.to_string(),
            float_key: 0,
            pct_x: 15,
            pct_y: 15,
            pct_w: 70,
            pct_h: 70,
            per_cwd_dir: None,
            sticky: false,
        });
        pane.visibility = Some(Visibility::TabBound(true));
        if wait {
            pane.capture_output = Some(Vec::new());
        }
        let id = pane.id.clone();
        self.floats.push(Float { pane });
        if wait {
            self.pending_waits.insert(id.0.clone(), PendingWait { result_file });
        }
        Ok(id)
    }

    /// Reaps dead floats in reverse index order (§4.1 step (c)),
    /// calling `on_complete` for each one that had a pending wait-for-
    /// exit request. Returns the ids of floats that were focused and
    /// removed, so the caller can transfer focus onward.
    pub fn reap_dead(&mut self, mut on_complete: impl FnMut(&Pane, Option<PendingWait>)) -> Vec<usize> {
        let mut freed_focus_indices = Vec::new();
        for i in (0..self.floats.len()).rev() {
            if self.floats[i].pane.is_alive() {
                continue;
            }
            let pending = self.pending_waits.remove(&self.floats[i].pane.id.0);
            let mut pane = self.floats.remove(i).pane;
            pane.close();
            on_complete(&pane, pending);
            if self.active_floating == Some(i) {
                self.active_floating = None;
                freed_focus_indices.push(i);
            } else if let Some(active) = self.active_floating {
                if active > i {
                    self.active_floating = Some(active - 1);
                }
            }
        }
        if self.active_floating.is_none() && !self.floats.is_empty() && !freed_focus_indices.is_empty() {
            self.active_floating = Some(self.floats.len() - 1);
        }
        freed_focus_indices
    }
}

fn default_result_file_path(numeric_id: u64) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("hexe-float-result-{}-{numeric_id}", std::process::id()))
}

pub enum ToggleOutcome {
    Created(usize),
    Focused(usize),
    HiddenBackToTile,
}

/// Reads, trims, and deletes a float's result file (§4.4 "blocking
/// float completion"). Returns an empty string if no file was written.
pub fn read_and_trim_result_file(path: &std::path::Path) -> String {
    let contents = std::fs::read(path).unwrap_or_default();
    let _ = std::fs::remove_file(path);
    let trimmed = contents
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\n' | b'\r' | b'\t'))
        .map(|end| &contents[..=end])
        .unwrap_or(&[]);
    String::from_utf8_lossy(trimmed).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_file_trims_trailing_whitespace() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("hexe-test-result-{}", std::process::id()));
        std::fs::write(&path, b"hi\n\n  ").unwrap();
        let trimmed = read_and_trim_result_file(&path);
        assert_eq!(trimmed, "hi");
        assert!(!path.exists());
    }

    #[test]
    fn missing_result_file_yields_empty_string() {
        let path = std::env::temp_dir().join("hexe-test-nonexistent-result-file");
        let _ = std::fs::remove_file(&path);
        assert_eq!(read_and_trim_result_file(&path), "");
    }
}
