//! Tab (§3 "Tab"): a layout tree of tiled panes plus its own
//! notification queue, popup stack, and UUID.

use crate::layout::Layout;
use crate::pane::Pane;
use crate::realm::Realm;
use crate::types::TabId;

pub struct Tab {
    pub id: TabId,
    pub name: String,
    pub layout: Layout<Pane>,
    pub realm: Realm,
}

impl Tab {
    pub fn new(name: String, first_pane: Pane) -> Self {
        Tab { id: TabId::new(), name, layout: Layout::new(first_pane), realm: Realm::default() }
    }

    pub fn focused_pane(&self) -> Option<&Pane> {
        self.layout.get_focused_pane()
    }

    pub fn focused_pane_mut(&mut self) -> Option<&mut Pane> {
        self.layout.get_focused_pane_mut()
    }
}
