//! Daemon client (§4.6): the control-plane half of the external
//! session daemon collaborator. A separate Unix-domain, line-delimited
//! JSON socket from the per-pane framed sockets in
//! [`crate::backend::daemon`] — this one carries pane lifecycle RPCs
//! and an inbound stream of notify/popup messages.

use std::io::{Read as _, Write as _};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

pub struct PaneHandle {
    pub socket_path: PathBuf,
    pub uuid: String,
}

pub struct PaneAux {
    pub created_from: Option<String>,
    pub focused_from: Option<String>,
}

pub struct DaemonClient {
    control: Option<UnixStream>,
    read_buf: Vec<u8>,
}

impl DaemonClient {
    pub fn connect(socket_path: &std::path::Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).map_err(Error::Daemon)?;
        stream.set_nonblocking(true).map_err(Error::Daemon)?;
        Ok(DaemonClient { control: Some(stream), read_buf: Vec::new() })
    }

    pub fn disconnected() -> Self {
        DaemonClient { control: None, read_buf: Vec::new() }
    }

    pub fn is_connected(&self) -> bool {
        self.control.is_some()
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.control.as_ref().map(|s| s.as_raw_fd())
    }

    /// Sends a serialized mux session so the daemon can keep owning the
    /// panes it hosts across process exit (§4.6).
    pub fn detach_session(&mut self, uuid: &str, serialized_state: Value) -> Result<()> {
        self.rpc(&json!({ "type": "detach_session", "uuid": uuid, "state": serialized_state }))?;
        Ok(())
    }

    /// Reattaches to a previously detached session matched by UUID
    /// prefix (CLI `--attach`). Response carries back the session's
    /// serialized state plus a `uuid -> socket_path` map so each
    /// daemon-backed pane's per-pane frame socket can be reopened.
    pub fn attach_session(&mut self, uuid_prefix: &str) -> Result<(Value, Value)> {
        let resp = self.rpc(&json!({ "type": "attach_session", "uuid_prefix": uuid_prefix }))?;
        let state = resp
            .get("state")
            .cloned()
            .ok_or_else(|| Error::DaemonProtocol("attach_session: missing state".into()))?;
        let sockets = resp
            .get("sockets")
            .cloned()
            .ok_or_else(|| Error::DaemonProtocol("attach_session: missing sockets".into()))?;
        Ok((state, sockets))
    }

    pub fn create_pane(&mut self, command: Option<&str>, cwd: Option<&str>, envs: &[String]) -> Result<PaneHandle> {
        let resp = self.rpc(&json!({ "type": "create_pane", "command": command, "cwd": cwd, "envs": envs }))?;
        parse_pane_handle(&resp)
    }

    /// Keeps the process alive under the daemon, detached from this mux.
    pub fn orphan_pane(&mut self, uuid: &str) -> Result<()> {
        self.rpc(&json!({ "type": "orphan_pane", "uuid": uuid }))?;
        Ok(())
    }

    pub fn adopt_pane(&mut self, orphan_uuid: &str) -> Result<PaneHandle> {
        let resp = self.rpc(&json!({ "type": "adopt_pane", "uuid": orphan_uuid }))?;
        parse_pane_handle(&resp)
    }

    pub fn kill_pane(&mut self, uuid: &str) -> Result<()> {
        self.rpc(&json!({ "type": "kill_pane", "uuid": uuid }))?;
        Ok(())
    }

    /// Returns the count of orphaned panes whose uuid starts with `prefix`.
    pub fn list_orphaned_panes(&mut self, prefix: &str) -> Result<usize> {
        let resp = self.rpc(&json!({ "type": "list_orphaned_panes", "prefix": prefix }))?;
        resp.get("count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| Error::DaemonProtocol("list_orphaned_panes: missing count".into()))
    }

    pub fn get_pane_aux(&mut self, uuid: &str) -> Result<PaneAux> {
        let resp = self.rpc(&json!({ "type": "get_pane_aux", "uuid": uuid }))?;
        Ok(PaneAux {
            created_from: resp.get("created_from").and_then(Value::as_str).map(str::to_string),
            focused_from: resp.get("focused_from").and_then(Value::as_str).map(str::to_string),
        })
    }

    pub fn update_pane_aux(&mut self, uuid: &str, fields: Value) -> Result<()> {
        self.rpc(&json!({ "type": "update_pane_aux", "uuid": uuid, "fields": fields }))?;
        Ok(())
    }

    /// Reports how a relayed popup was resolved (§4.4 "Popup relay"),
    /// scoped by the target uuid it was shown against (`None` for a
    /// MUX-scoped popup).
    pub fn pop_response(&mut self, target_uuid: Option<&str>, resolution: Value) -> Result<()> {
        self.rpc(&json!({ "type": "pop_response", "target_uuid": target_uuid, "resolution": resolution }))?;
        Ok(())
    }

    /// Performs a request/response round trip. Temporarily switches the
    /// socket to blocking mode for the duration of the call; RPCs are
    /// infrequent (pane lifecycle actions), not part of the per-iteration
    /// poll budget.
    fn rpc(&mut self, request: &Value) -> Result<Value> {
        let stream = self.control.as_mut().ok_or_else(|| Error::DaemonProtocol("daemon not connected".into()))?;
        stream.set_nonblocking(false).map_err(Error::Daemon)?;
        let result = (|| -> Result<Value> {
            writeln!(stream, "{request}").map_err(Error::Daemon)?;
            let line = read_line_blocking(stream)?;
            let value: Value = serde_json::from_str(&line).map_err(|e| Error::DaemonProtocol(e.to_string()))?;
            if value.get("type").and_then(Value::as_str) == Some("error") {
                let message = value.get("message").and_then(Value::as_str).unwrap_or("unknown error");
                return Err(Error::DaemonProtocol(message.to_string()));
            }
            Ok(value)
        })();
        let _ = stream.set_nonblocking(true);
        result
    }

    /// Drains whatever unsolicited inbound lines (notify/popup relay)
    /// are currently buffered on the socket; non-blocking, called from
    /// the main loop's poll pass.
    pub fn poll_messages(&mut self, scratch: &mut [u8]) -> Result<Vec<InboundMessage>> {
        let Some(stream) = self.control.as_mut() else {
            return Ok(Vec::new());
        };
        loop {
            match stream.read(scratch) {
                Ok(0) => break,
                Ok(n) => self.read_buf.extend_from_slice(&scratch[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Daemon(e)),
            }
        }

        let mut messages = Vec::new();
        while let Some(pos) = self.read_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.read_buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<RawInbound>(line) {
                Ok(raw) => messages.push(raw.into()),
                Err(e) => return Err(Error::DaemonProtocol(e.to_string())),
            }
        }
        Ok(messages)
    }
}

fn read_line_blocking(stream: &mut UnixStream) -> Result<String> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) => break,
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => out.push(byte[0]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Daemon(e)),
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn parse_pane_handle(resp: &Value) -> Result<PaneHandle> {
    let socket_path = resp
        .get("socket_path")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::DaemonProtocol("missing socket_path".into()))?;
    let uuid = resp
        .get("uuid")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::DaemonProtocol("missing uuid".into()))?;
    Ok(PaneHandle { socket_path: PathBuf::from(socket_path), uuid: uuid.to_string() })
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawInbound {
    Notify { message: String, #[serde(default = "default_duration_ms")] duration_ms: u64 },
    Notification { message: String, #[serde(default = "default_duration_ms")] duration_ms: u64 },
    PaneNotification { pane_uuid: String, message: String, #[serde(default = "default_duration_ms")] duration_ms: u64 },
    TabNotification { tab_uuid: String, message: String, #[serde(default = "default_duration_ms")] duration_ms: u64 },
    PopConfirm { message: String, target_uuid: Option<String>, timeout_ms: Option<u64> },
    PopChoose { message: String, options: Vec<String>, target_uuid: Option<String>, timeout_ms: Option<u64> },
}

fn default_duration_ms() -> u64 {
    3_000
}

#[derive(Debug, Clone)]
pub enum InboundMessage {
    Notify { message: String, duration_ms: u64 },
    PaneNotification { pane_uuid: String, message: String, duration_ms: u64 },
    TabNotification { tab_uuid: String, message: String, duration_ms: u64 },
    PopConfirm { message: String, target_uuid: Option<String>, timeout_ms: Option<u64> },
    PopChoose { message: String, options: Vec<String>, target_uuid: Option<String>, timeout_ms: Option<u64> },
}

impl From<RawInbound> for InboundMessage {
    fn from(raw: RawInbound) -> Self {
        match raw {
            RawInbound::Notify { message, duration_ms } | RawInbound::Notification { message, duration_ms } => {
                InboundMessage::Notify { message, duration_ms }
            }
            RawInbound::PaneNotification { pane_uuid, message, duration_ms } => {
                InboundMessage::PaneNotification { pane_uuid, message, duration_ms }
            }
            RawInbound::TabNotification { tab_uuid, message, duration_ms } => {
                InboundMessage::TabNotification { tab_uuid, message, duration_ms }
            }
            RawInbound::PopConfirm { message, target_uuid, timeout_ms } => {
                InboundMessage::PopConfirm { message, target_uuid, timeout_ms }
            }
            RawInbound::PopChoose { message, options, target_uuid, timeout_ms } => {
                InboundMessage::PopChoose { message, options, target_uuid, timeout_ms }
            }
        }
    }
}

/// Popup relay scope resolution (§4.4): a tab UUID prefix match wins
/// first, then a pane UUID prefix among the tab's tiled splits, then
/// among floats; otherwise the popup is MUX-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedScope {
    Mux,
    Tab(usize),
    SplitPane(usize, usize),
    FloatPane(usize),
}

pub fn resolve_popup_scope(target_uuid: Option<&str>, tabs: &[(String, Vec<String>)], floats: &[String]) -> ResolvedScope {
    let Some(prefix) = target_uuid else {
        return ResolvedScope::Mux;
    };

    if let Some(tab_index) = tabs.iter().position(|(uuid, _)| uuid.starts_with(prefix)) {
        return ResolvedScope::Tab(tab_index);
    }

    for (tab_index, (_, panes)) in tabs.iter().enumerate() {
        if let Some(pane_index) = panes.iter().position(|uuid| uuid.starts_with(prefix)) {
            return ResolvedScope::SplitPane(tab_index, pane_index);
        }
    }

    if let Some(float_index) = floats.iter().position(|uuid| uuid.starts_with(prefix)) {
        return ResolvedScope::FloatPane(float_index);
    }

    ResolvedScope::Mux
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_prefix_wins_over_pane_prefix() {
        let tabs = vec![("abc123".to_string(), vec!["def456".to_string()])];
        let floats = vec![];
        assert_eq!(resolve_popup_scope(Some("abc"), &tabs, &floats), ResolvedScope::Tab(0));
    }

    #[test]
    fn split_pane_prefix_matches_when_no_tab_matches() {
        let tabs = vec![("abc123".to_string(), vec!["def456".to_string()])];
        let floats = vec![];
        assert_eq!(resolve_popup_scope(Some("def"), &tabs, &floats), ResolvedScope::SplitPane(0, 0));
    }

    #[test]
    fn float_prefix_matches_after_splits_fail() {
        let tabs = vec![("abc123".to_string(), vec!["def456".to_string()])];
        let floats = vec!["999000".to_string()];
        assert_eq!(resolve_popup_scope(Some("999"), &tabs, &floats), ResolvedScope::FloatPane(0));
    }

    #[test]
    fn no_target_is_mux_scoped() {
        let tabs = vec![("abc123".to_string(), vec![])];
        let floats = vec![];
        assert_eq!(resolve_popup_scope(None, &tabs, &floats), ResolvedScope::Mux);
    }

    #[test]
    fn unmatched_prefix_falls_back_to_mux() {
        let tabs = vec![("abc123".to_string(), vec!["def456".to_string()])];
        let floats = vec![];
        assert_eq!(resolve_popup_scope(Some("zzz"), &tabs, &floats), ResolvedScope::Mux);
    }

    #[test]
    fn inbound_notify_and_notification_aliases_parse_the_same() {
        let a: RawInbound = serde_json::from_str(r#"{"type":"notify","message":"hi","duration_ms":10}"#).unwrap();
        let b: RawInbound = serde_json::from_str(r#"{"type":"notification","message":"hi","duration_ms":10}"#).unwrap();
        assert!(matches!(InboundMessage::from(a), InboundMessage::Notify { .. }));
        assert!(matches!(InboundMessage::from(b), InboundMessage::Notify { .. }));
    }
}
