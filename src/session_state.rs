//! Session-state serialization (§8 "Round-trip frame"): the JSON shape
//! handed to the daemon on detach and parsed back out on reattach.
//! Only identity and geometry survive the round trip — live backend
//! connections are re-established against the daemon by UUID after
//! deserializing, not carried in the payload itself.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::float::Float;
use crate::layout::LayoutTree;
use crate::pane::{Pane, Visibility};
use crate::tab::Tab;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedPane {
    pub uuid: String,
    pub numeric_id: u64,
    pub cached_cwd: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedTab {
    pub id: String,
    pub name: String,
    pub layout: LayoutTree<SerializedPane>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SerializedVisibility {
    TabBound(bool),
    Global(u64),
}

impl From<&Visibility> for SerializedVisibility {
    fn from(v: &Visibility) -> Self {
        match v {
            Visibility::TabBound(b) => SerializedVisibility::TabBound(*b),
            Visibility::Global(mask) => SerializedVisibility::Global(*mask),
        }
    }
}

impl From<SerializedVisibility> for Visibility {
    fn from(v: SerializedVisibility) -> Self {
        match v {
            SerializedVisibility::TabBound(b) => Visibility::TabBound(b),
            SerializedVisibility::Global(mask) => Visibility::Global(mask),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedFloat {
    pub pane: SerializedPane,
    pub float_key: u8,
    pub pct_x: u16,
    pub pct_y: u16,
    pub pct_w: u16,
    pub pct_h: u16,
    pub per_cwd_dir: Option<String>,
    pub sticky: bool,
    pub tab_parent: Option<usize>,
    pub visibility: SerializedVisibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedState {
    pub active_tab: usize,
    pub tabs: Vec<SerializedTab>,
    pub floats: Vec<SerializedFloat>,
    pub active_floating: Option<usize>,
}

fn serialize_pane(pane: &Pane) -> SerializedPane {
    SerializedPane { uuid: pane.id.0.clone(), numeric_id: pane.numeric_id, cached_cwd: pane.cached_cwd.clone() }
}

/// Builds the detach payload. Local-only panes can't survive this
/// process exiting, so they're dropped from the tree entirely rather
/// than serialized and then failing to reattach (§8 "local-only panes
/// ... are simply not included"): a tiled split collapses to whichever
/// side is daemon-backed, a tab with no surviving tiled pane at all is
/// dropped, and local-only floats are skipped outright. `active_tab`/
/// `active_floating` are remapped to the post-filter indices.
pub fn build(tabs: &[Tab], active_tab: usize, floats: &[Float], active_floating: Option<usize>) -> SerializedState {
    let mut serialized_tabs = Vec::new();
    let mut new_active_tab = 0usize;
    let mut tab_index_map: Vec<Option<usize>> = Vec::with_capacity(tabs.len());

    for (i, t) in tabs.iter().enumerate() {
        match t.layout.export_tree_filtered(&mut |pane: &Pane| pane.is_daemon_backed(), &mut serialize_pane) {
            Some(layout) => {
                tab_index_map.push(Some(serialized_tabs.len()));
                if i == active_tab {
                    new_active_tab = serialized_tabs.len();
                }
                serialized_tabs.push(SerializedTab { id: t.id.0.clone(), name: t.name.clone(), layout });
            }
            None => tab_index_map.push(None),
        }
    }

    let mut serialized_floats = Vec::new();
    let mut new_active_floating = None;
    for (i, f) in floats.iter().enumerate() {
        if !f.pane.is_daemon_backed() {
            continue;
        }
        if Some(i) == active_floating {
            new_active_floating = Some(serialized_floats.len());
        }
        let meta = f.pane.float_meta.as_ref().expect("a Float always carries FloatMeta");
        serialized_floats.push(SerializedFloat {
            pane: serialize_pane(&f.pane),
            float_key: meta.float_key,
            pct_x: meta.pct_x,
            pct_y: meta.pct_y,
            pct_w: meta.pct_w,
            pct_h: meta.pct_h,
            per_cwd_dir: meta.per_cwd_dir.clone(),
            sticky: meta.sticky,
            tab_parent: f.pane.float_parent_tab.and_then(|old| tab_index_map.get(old).copied().flatten()),
            visibility: f
                .pane
                .visibility
                .as_ref()
                .map(SerializedVisibility::from)
                .unwrap_or(SerializedVisibility::TabBound(false)),
        });
    }

    SerializedState { active_tab: new_active_tab, tabs: serialized_tabs, floats: serialized_floats, active_floating: new_active_floating }
}

pub fn to_json(state: &SerializedState) -> Result<String> {
    serde_json::to_string(state).map_err(Error::Serialize)
}

pub fn from_json(json: &str) -> Result<SerializedState> {
    serde_json::from_str(json).map_err(Error::Serialize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LayoutKind;

    fn pane(uuid: &str) -> SerializedPane {
        SerializedPane { uuid: uuid.to_string(), numeric_id: 1, cached_cwd: None }
    }

    #[test]
    fn round_trip_preserves_uuids_and_tab_ordering() {
        let state = SerializedState {
            active_tab: 1,
            tabs: vec![
                SerializedTab { id: "tab-a".into(), name: "one".into(), layout: LayoutTree::Leaf(pane("aaa")) },
                SerializedTab {
                    id: "tab-b".into(),
                    name: "two".into(),
                    layout: LayoutTree::Split {
                        kind: LayoutKind::Horizontal,
                        ratio: 50,
                        first: Box::new(LayoutTree::Leaf(pane("bbb"))),
                        second: Box::new(LayoutTree::Leaf(pane("ccc"))),
                    },
                },
            ],
            floats: Vec::new(),
            active_floating: None,
        };

        let json = to_json(&state).unwrap();
        let parsed = from_json(&json).unwrap();
        assert_eq!(parsed.active_tab, 1);
        assert_eq!(parsed.tabs[0].id, "tab-a");
        assert_eq!(parsed.tabs[1].id, "tab-b");
        match &parsed.tabs[1].layout {
            LayoutTree::Split { first, second, .. } => {
                assert!(matches!(**first, LayoutTree::Leaf(ref p) if p.uuid == "bbb"));
                assert!(matches!(**second, LayoutTree::Leaf(ref p) if p.uuid == "ccc"));
            }
            _ => panic!("expected a split"),
        }
    }

    #[test]
    fn round_trip_preserves_float_geometry_and_visibility() {
        let state = SerializedState {
            active_tab: 0,
            tabs: vec![SerializedTab { id: "tab-a".into(), name: "one".into(), layout: LayoutTree::Leaf(pane("aaa")) }],
            floats: vec![SerializedFloat {
                pane: pane("fff"),
                float_key: b'l',
                pct_x: 15,
                pct_y: 15,
                pct_w: 70,
                pct_h: 70,
                per_cwd_dir: Some("/home/me/project".into()),
                sticky: true,
                tab_parent: Some(0),
                visibility: SerializedVisibility::TabBound(true),
            }],
            active_floating: Some(0),
        };

        let json = to_json(&state).unwrap();
        let parsed = from_json(&json).unwrap();
        let float = &parsed.floats[0];
        assert_eq!(float.pct_w, 70);
        assert_eq!(float.pct_h, 70);
        assert!(float.sticky);
        assert!(matches!(float.visibility, SerializedVisibility::TabBound(true)));
        assert_eq!(parsed.active_floating, Some(0));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(from_json("not json").is_err());
    }
}
