//! Notification/popup realms (§3 "Realms"): MUX, TAB, and PANE-scoped
//! managers. Each scope owns its own queue; rendering and input
//! routing honor the scope independently.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealmScope {
    Mux,
    Tab,
    Pane,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub duration_ms: u64,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone)]
pub enum PopupKind {
    Confirm { message: String },
    Choose { message: String, options: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupResolution {
    Confirmed(bool),
    Selected(usize),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Popup {
    pub kind: PopupKind,
    pub timeout_ms: Option<u64>,
    pub shown_at_ms: u64,
    /// Set once the user (or a timeout) resolves this popup; taken by
    /// the main loop's "tick" pass to emit a `pop_response`.
    pub resolution: Option<PopupResolution>,
}

impl Popup {
    pub fn confirm(message: String, timeout_ms: Option<u64>, now_ms: u64) -> Self {
        Popup { kind: PopupKind::Confirm { message }, timeout_ms, shown_at_ms: now_ms, resolution: None }
    }

    pub fn choose(message: String, options: Vec<String>, timeout_ms: Option<u64>, now_ms: u64) -> Self {
        Popup { kind: PopupKind::Choose { message, options }, timeout_ms, shown_at_ms: now_ms, resolution: None }
    }

    pub fn accept(&mut self) {
        self.resolution = Some(match &self.kind {
            PopupKind::Confirm { .. } => PopupResolution::Confirmed(true),
            PopupKind::Choose { .. } => PopupResolution::Selected(0),
        });
    }

    pub fn cancel(&mut self) {
        self.resolution = Some(PopupResolution::Cancelled);
    }

    pub fn select(&mut self, index: usize) {
        self.resolution = Some(PopupResolution::Selected(index));
    }

    /// Auto-resolves on expiry (§5 "Cancellation / timeouts"). Confirm
    /// popups time out to "no"; choose popups time out to cancelled.
    pub fn tick(&mut self, now_ms: u64) {
        if self.resolution.is_some() {
            return;
        }
        if let Some(timeout) = self.timeout_ms {
            if now_ms.saturating_sub(self.shown_at_ms) >= timeout {
                self.resolution = Some(match &self.kind {
                    PopupKind::Confirm { .. } => PopupResolution::Confirmed(false),
                    PopupKind::Choose { .. } => PopupResolution::Cancelled,
                });
            }
        }
    }
}

/// Owns the notification queue and popup stack for one scope.
#[derive(Debug, Default)]
pub struct Realm {
    pub notifications: Vec<Notification>,
    pub popups: Vec<Popup>,
}

impl Realm {
    pub fn push_notification(&mut self, message: String, duration_ms: u64, now_ms: u64) {
        self.notifications.push(Notification { message, duration_ms, created_at_ms: now_ms });
    }

    pub fn push_popup(&mut self, popup: Popup) {
        self.popups.push(popup);
    }

    pub fn top_popup_mut(&mut self) -> Option<&mut Popup> {
        self.popups.last_mut()
    }

    /// Ticks every popup's timeout and expires stale notifications;
    /// returns resolved-and-popped popups for the caller to act on
    /// (e.g. emit a `pop_response`).
    pub fn tick(&mut self, now_ms: u64) -> Vec<Popup> {
        self.notifications.retain(|n| now_ms.saturating_sub(n.created_at_ms) < n.duration_ms);

        if let Some(top) = self.popups.last_mut() {
            top.tick(now_ms);
        }

        let mut resolved = Vec::new();
        while matches!(self.popups.last(), Some(p) if p.resolution.is_some()) {
            resolved.push(self.popups.pop().unwrap());
        }
        resolved
    }

    pub fn has_blocking_popup(&self) -> bool {
        self.popups.last().is_some_and(|p| p.resolution.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popup_times_out_to_expected_resolution() {
        let mut confirm = Popup::confirm("ok?".into(), Some(100), 0);
        confirm.tick(50);
        assert!(confirm.resolution.is_none());
        confirm.tick(150);
        assert_eq!(confirm.resolution, Some(PopupResolution::Confirmed(false)));
    }

    #[test]
    fn realm_tick_pops_only_resolved_popups() {
        let mut realm = Realm::default();
        realm.push_popup(Popup::confirm("a".into(), None, 0));
        realm.push_popup(Popup::confirm("b".into(), None, 0));
        realm.top_popup_mut().unwrap().accept();
        let resolved = realm.tick(10);
        assert_eq!(resolved.len(), 1);
        assert_eq!(realm.popups.len(), 1);
    }

    #[test]
    fn blocking_popup_reports_true_until_resolved() {
        let mut realm = Realm::default();
        realm.push_popup(Popup::confirm("a".into(), None, 0));
        assert!(realm.has_blocking_popup());
        realm.top_popup_mut().unwrap().accept();
        assert!(!realm.has_blocking_popup());
    }

    #[test]
    fn stale_notifications_expire() {
        let mut realm = Realm::default();
        realm.push_notification("hi".into(), 100, 0);
        realm.tick(50);
        assert_eq!(realm.notifications.len(), 1);
        realm.tick(200);
        assert_eq!(realm.notifications.len(), 0);
    }
}
