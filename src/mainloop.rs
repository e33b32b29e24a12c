//! The single-threaded `poll()`-driven reactor (§4.1). One iteration:
//! reap lifecycle state, build a poll set over stdin, every pane's
//! backend fd, the daemon control socket, and the local IPC listener,
//! block for at most a frame interval, then drain whatever became
//! readable in a fixed order before ticking realms and rendering.
//!
//! Individual pane/daemon/IPC failures never abort the loop — per the
//! error-handling design (see [`crate::error`]) they're turned into a
//! MUX-realm notification and the reactor keeps going.

use std::io::{self, Read as _, Write as _};
use std::os::fd::RawFd;
use std::os::unix::net::UnixStream;
use std::time::Instant;

use portable_pty::PtySize;

use crate::config::{FloatDef, LastTabClosePolicy};
use crate::daemon_client::{resolve_popup_scope, InboundMessage, ResolvedScope};
use crate::error::{Error, Result};
use crate::float::read_and_trim_result_file;
use crate::ipc::{self, FloatRequest, IpcRequest};
use crate::pane::Pane;
use crate::realm::{Popup, PopupKind, PopupResolution};
use crate::renderer::Cell;
use crate::state::{PendingPopupScope, State};
use crate::tab::Tab;
use crate::types::{FocusDir, LayoutKind, PaneId, Rect};

/// Ctrl-B: the one hardcoded prefix byte this engine recognizes on its
/// own. A configurable key-binding table is an external collaborator
/// (§1); this fixed set exists only so the reactor has something to
/// dispatch without one.
const PREFIX_BYTE: u8 = 0x02;
const STATUS_BAR_INTERVAL_MS: u64 = 250;

pub fn run(state: &mut State) -> Result<()> {
    let start = Instant::now();
    let mut last_render = Instant::now();
    let mut last_status = Instant::now();
    let mut scratch = vec![0u8; 64 * 1024];
    // Set while a pane's forwarded OSC passthrough-query awaits the
    // outer terminal's real reply (§4.2.1); stdin bytes are routed to
    // this pane's backend instead of the usual prefix/popup handling
    // until the reply sequence is fully scanned.
    let mut osc_reply_target: Option<(PaneLoc, PaneId)> = None;
    let mut osc_reply_scan = OscReplyScan::Idle;

    while state.flags.running {
        state.flags.skip_dead_check = false;
        let now_ms = start.elapsed().as_millis() as u64;

        if let Ok((cols, rows)) = crossterm::terminal::size() {
            if cols != state.term_cols || rows != state.term_rows {
                state.resize_all(cols, rows)?;
            }
        }

        reap_dead_floats(state);
        reap_dead_splits(state, now_ms);

        let targets = build_poll_targets(state);
        let mut pollfds: Vec<libc::pollfd> = targets
            .iter()
            .map(|(fd, _)| libc::pollfd { fd: *fd, events: libc::POLLIN, revents: 0 })
            .collect();

        let timeout_ms = compute_timeout(state, &last_render, &last_status, now_ms);
        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::Pty(err));
        }

        for (slot, (_, target)) in pollfds.iter().zip(targets.iter()) {
            if slot.revents & libc::POLLIN == 0 {
                continue;
            }
            match *target {
                PollTarget::Stdin => handle_stdin(state, &mut osc_reply_target, &mut osc_reply_scan)?,
                PollTarget::Pane(loc) => drain_pane(state, loc, &mut scratch, &mut osc_reply_target, &mut osc_reply_scan),
                PollTarget::Daemon => handle_daemon_socket(state, &mut scratch, now_ms),
                PollTarget::Ipc => handle_ipc(state, now_ms),
            }
        }

        reap_dead_floats(state);
        reap_dead_splits(state, now_ms);

        tick_realms(state, now_ms);

        if state.flags.needs_render && last_render.elapsed().as_millis() as u64 >= state.config.frame_pacing_ms {
            render(state)?;
            last_render = Instant::now();
            state.flags.needs_render = false;
            state.flags.force_full_render = false;
        }
        if last_status.elapsed().as_millis() as u64 >= STATUS_BAR_INTERVAL_MS {
            last_status = Instant::now();
            state.flags.needs_render = true;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaneLoc {
    Split(usize, usize),
    Float(usize),
}

/// Scans stdin bytes routed to an awaiting pane for the terminating
/// BEL or ST of its OSC reply, mirroring the scanner in
/// [`crate::output_pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OscReplyScan {
    Idle,
    Esc,
    Osc,
    OscEsc,
}

#[derive(Debug, Clone, Copy)]
enum PollTarget {
    Stdin,
    Pane(PaneLoc),
    Daemon,
    Ipc,
}

fn build_poll_targets(state: &State) -> Vec<(RawFd, PollTarget)> {
    let mut out = vec![(0 as RawFd, PollTarget::Stdin)];
    for (tab_idx, tab) in state.tabs.iter().enumerate() {
        for (leaf_idx, pane) in tab.layout.split_iterator() {
            out.push((pane.backend.fd(), PollTarget::Pane(PaneLoc::Split(tab_idx, leaf_idx))));
        }
    }
    for (i, float) in state.floats.floats.iter().enumerate() {
        out.push((float.pane.backend.fd(), PollTarget::Pane(PaneLoc::Float(i))));
    }
    if let Some(fd) = state.daemon.fd() {
        out.push((fd, PollTarget::Daemon));
    }
    if let Some(ipc) = &state.ipc {
        out.push((ipc.fd(), PollTarget::Ipc));
    }
    out
}

fn compute_timeout(state: &State, last_render: &Instant, last_status: &Instant, now_ms: u64) -> i32 {
    let since_render = last_render.elapsed().as_millis() as u64;
    let since_status = last_status.elapsed().as_millis() as u64;

    let mut wait = if state.flags.needs_render {
        state.config.frame_pacing_ms.saturating_sub(since_render).max(1)
    } else {
        state.config.idle_poll_ms
    };
    wait = wait.min(STATUS_BAR_INTERVAL_MS.saturating_sub(since_status).max(1));

    if let Some(deadline) = soonest_popup_deadline(state, now_ms) {
        wait = wait.min(deadline.max(1));
    }

    wait.min(state.config.idle_poll_ms.max(wait)) as i32
}

fn soonest_popup_deadline(state: &State, now_ms: u64) -> Option<u64> {
    let mut soonest: Option<u64> = None;
    let mut consider = |popup: &Popup| {
        if let Some(timeout) = popup.timeout_ms {
            let remaining = timeout.saturating_sub(now_ms.saturating_sub(popup.shown_at_ms));
            soonest = Some(soonest.map_or(remaining, |s| s.min(remaining)));
        }
    };
    if let Some(p) = state.mux_realm.popups.last() {
        consider(p);
    }
    for tab in &state.tabs {
        if let Some(p) = tab.realm.popups.last() {
            consider(p);
        }
    }
    soonest
}

// --- lifecycle reaping (§4.1 steps (c) and the post-poll sweep) ----------

fn reap_dead_floats(state: &mut State) {
    let daemon_connected = state.daemon.is_connected();
    let mut kills = Vec::new();
    let mut deliveries = Vec::new();

    let freed = state.floats.reap_dead(|pane, pending| {
        if daemon_connected {
            kills.push(pane.id.0.clone());
        }
        if let Some(pending) = pending {
            let stdout = pending.result_file.as_deref().map(read_and_trim_result_file).unwrap_or_default();
            deliveries.push((pane.id.clone(), pane.exit_status.unwrap_or(-1), stdout));
        }
    });

    for uuid in kills {
        let _ = state.daemon.kill_pane(&uuid);
    }
    for (pane_id, exit_code, stdout) in deliveries {
        if let Some(ipc) = state.ipc.as_mut() {
            if let Some(stream) = ipc.waiting.remove(&pane_id.0) {
                ipc::deliver_float_result(stream, &pane_id, exit_code, &stdout);
            }
        }
    }
    if !freed.is_empty() {
        state.flags.needs_render = true;
    }
}

fn first_dead_leaf(state: &mut State, tab_idx: usize) -> Option<usize> {
    let indices: Vec<usize> = state.tabs[tab_idx].layout.split_iterator().into_iter().map(|(i, _)| i).collect();
    for idx in indices {
        if let Some(pane) = state.tabs[tab_idx].layout.get_mut(idx) {
            if !pane.is_alive() {
                return Some(idx);
            }
        }
    }
    None
}

fn reap_dead_splits(state: &mut State, now_ms: u64) {
    let mut tab_idx = 0;
    while tab_idx < state.tabs.len() {
        let mut tab_removed = false;
        loop {
            let Some(dead_idx) = first_dead_leaf(state, tab_idx) else { break };
            let last_pane_in_tab = state.tabs[tab_idx].layout.split_count() == 1;

            if let Some(pane) = state.tabs[tab_idx].layout.get_mut(dead_idx) {
                pane.close();
            }

            if last_pane_in_tab {
                state.tabs.remove(tab_idx);
                tab_removed = true;
                if state.tabs.is_empty() {
                    match state.config.last_tab_close {
                        LastTabClosePolicy::Exit => state.flags.running = false,
                        LastTabClosePolicy::Confirm => {
                            state.mux_realm.push_popup(Popup::confirm(
                                "Close the last tab and exit?".to_string(),
                                Some(10_000),
                                now_ms,
                            ));
                            state.pending_pop_response = Some(PendingPopupScope::Mux);
                        }
                    }
                }
                break;
            }
            state.tabs[tab_idx].layout.close_pane(dead_idx);
        }
        // A removed tab shifts the next tab into this index; only
        // advance when nothing was removed here.
        if !tab_removed {
            tab_idx += 1;
        }
    }
    if !state.tabs.is_empty() && state.active_tab >= state.tabs.len() {
        state.active_tab = state.tabs.len() - 1;
    }
}

// --- pane drain -----------------------------------------------------------

fn drain_pane(
    state: &mut State,
    loc: PaneLoc,
    scratch: &mut [u8],
    osc_reply_target: &mut Option<(PaneLoc, PaneId)>,
    osc_reply_scan: &mut OscReplyScan,
) {
    let pane = match loc {
        PaneLoc::Split(tab_idx, leaf_idx) => state.tabs.get_mut(tab_idx).and_then(|t| t.layout.get_mut(leaf_idx)),
        PaneLoc::Float(i) => state.floats.floats.get_mut(i).map(|f| &mut f.pane),
    };
    let Some(pane) = pane else { return };

    let poll_result = pane.poll(scratch);
    let expects_reply = pane.output.osc_expect_response;
    let pane_id = pane.id.clone();

    match poll_result {
        Ok(Some(outcome)) => {
            if !outcome.to_outer.is_empty() {
                let mut stdout = io::stdout();
                let _ = stdout.write_all(&outcome.to_outer);
                let _ = stdout.flush();
            }
            if outcome.did_clear {
                state.flags.force_full_render = true;
            }
            state.flags.needs_render = true;
        }
        Ok(None) => {}
        Err(e) => {
            state.mux_realm.push_notification(format!("pane i/o error: {e}"), 4_000, 0);
            state.flags.needs_render = true;
        }
    }

    if expects_reply {
        *osc_reply_target = Some((loc, pane_id));
        *osc_reply_scan = OscReplyScan::Idle;
    }
}

/// Looks up the pane at `loc` without distinguishing split/float,
/// for the stdin-side OSC reply router, which doesn't need the
/// field-disjoint borrow `drain_pane` does.
fn pane_at_mut(state: &mut State, loc: PaneLoc) -> Option<&mut Pane> {
    match loc {
        PaneLoc::Split(tab_idx, leaf_idx) => state.tabs.get_mut(tab_idx).and_then(|t| t.layout.get_mut(leaf_idx)),
        PaneLoc::Float(i) => state.floats.floats.get_mut(i).map(|f| &mut f.pane),
    }
}

/// Advances the OSC-reply scan by one byte and forwards it straight
/// to the awaiting pane's backend. Clears `osc_expect_response` once
/// the terminator is seen.
fn route_osc_reply_byte(state: &mut State, loc: PaneLoc, b: u8, scan: &mut OscReplyScan) {
    *scan = match (*scan, b) {
        (OscReplyScan::Idle, 0x1b) => OscReplyScan::Esc,
        (OscReplyScan::Esc, b']') => OscReplyScan::Osc,
        (OscReplyScan::Osc, 0x07) => OscReplyScan::Idle,
        (OscReplyScan::Osc, 0x1b) => OscReplyScan::OscEsc,
        (OscReplyScan::OscEsc, b'\\') => OscReplyScan::Idle,
        (OscReplyScan::OscEsc, _) => OscReplyScan::Osc,
        (other, _) => other,
    };
    if let Some(pane) = pane_at_mut(state, loc) {
        let _ = pane.backend.write(&[b]);
        if *scan == OscReplyScan::Idle {
            pane.output.osc_expect_response = false;
        }
    }
}

// --- daemon control-plane messages ----------------------------------------

fn handle_daemon_socket(state: &mut State, scratch: &mut [u8], now_ms: u64) {
    let messages = match state.daemon.poll_messages(scratch) {
        Ok(m) => m,
        Err(e) => {
            state.mux_realm.push_notification(format!("daemon: {e}"), 4_000, now_ms);
            state.flags.needs_render = true;
            return;
        }
    };
    for msg in messages {
        dispatch_inbound(state, msg, now_ms);
    }
}

fn owning_tab_of_pane(state: &State, prefix: &str) -> Option<usize> {
    state.tabs.iter().position(|t| t.layout.split_iterator().iter().any(|(_, p)| p.id.starts_with(prefix)))
}

fn dispatch_inbound(state: &mut State, msg: InboundMessage, now_ms: u64) {
    match msg {
        InboundMessage::Notify { message, duration_ms } => {
            state.mux_realm.push_notification(message, duration_ms, now_ms);
        }
        InboundMessage::PaneNotification { pane_uuid, message, duration_ms } => {
            match owning_tab_of_pane(state, &pane_uuid) {
                Some(i) => state.tabs[i].realm.push_notification(message, duration_ms, now_ms),
                None => state.mux_realm.push_notification(message, duration_ms, now_ms),
            }
        }
        InboundMessage::TabNotification { tab_uuid, message, duration_ms } => {
            match state.tabs.iter().position(|t| t.id.starts_with(&tab_uuid)) {
                Some(i) => state.tabs[i].realm.push_notification(message, duration_ms, now_ms),
                None => state.mux_realm.push_notification(message, duration_ms, now_ms),
            }
        }
        InboundMessage::PopConfirm { message, target_uuid, timeout_ms } => {
            let scope = resolve_scope(state, target_uuid.as_deref());
            push_popup_for_scope(state, scope, Popup::confirm(message, timeout_ms, now_ms));
        }
        InboundMessage::PopChoose { message, options, target_uuid, timeout_ms } => {
            let scope = resolve_scope(state, target_uuid.as_deref());
            push_popup_for_scope(state, scope, Popup::choose(message, options, timeout_ms, now_ms));
        }
    }
    state.flags.needs_render = true;
}

fn resolve_scope(state: &State, target_uuid: Option<&str>) -> ResolvedScope {
    let tabs: Vec<(String, Vec<String>)> = state
        .tabs
        .iter()
        .map(|t| (t.id.0.clone(), t.layout.split_iterator().into_iter().map(|(_, p)| p.id.0.clone()).collect()))
        .collect();
    let floats: Vec<String> = state.floats.floats.iter().map(|f| f.pane.id.0.clone()).collect();
    resolve_popup_scope(target_uuid, &tabs, &floats)
}

fn push_popup_for_scope(state: &mut State, scope: ResolvedScope, popup: Popup) {
    match scope {
        ResolvedScope::Mux => {
            state.mux_realm.push_popup(popup);
            state.pending_pop_response = Some(PendingPopupScope::Mux);
        }
        ResolvedScope::Tab(i) => {
            state.tabs[i].realm.push_popup(popup);
            state.pending_pop_response = Some(PendingPopupScope::Tab(i));
        }
        ResolvedScope::SplitPane(tab_i, pane_i) => {
            state.tabs[tab_i].realm.push_popup(popup);
            state.pending_pop_response = Some(PendingPopupScope::SplitPane(tab_i, pane_i));
        }
        ResolvedScope::FloatPane(i) => {
            // Floats have no realm of their own; surfaced at MUX scope.
            state.mux_realm.push_popup(popup);
            state.pending_pop_response = Some(PendingPopupScope::FloatPane(i));
        }
    }
}

fn tick_realms(state: &mut State, now_ms: u64) {
    for popup in state.mux_realm.tick(now_ms) {
        emit_pop_response(state, &popup);
    }
    for tab_idx in 0..state.tabs.len() {
        let resolved = state.tabs[tab_idx].realm.tick(now_ms);
        for popup in resolved {
            emit_pop_response(state, &popup);
        }
    }
}

fn scope_target_uuid(state: &State, scope: PendingPopupScope) -> Option<String> {
    match scope {
        PendingPopupScope::Mux => None,
        PendingPopupScope::Tab(i) => state.tabs.get(i).map(|t| t.id.0.clone()),
        PendingPopupScope::SplitPane(tab_i, pane_i) => {
            state.tabs.get(tab_i).and_then(|t| t.layout.split_iterator().get(pane_i).map(|(_, p)| p.id.0.clone()))
        }
        PendingPopupScope::FloatPane(i) => state.floats.floats.get(i).map(|f| f.pane.id.0.clone()),
    }
}

fn emit_pop_response(state: &mut State, popup: &Popup) {
    let Some(scope) = state.pending_pop_response.take() else { return };
    let target = scope_target_uuid(state, scope);
    let resolution = match popup.resolution {
        Some(PopupResolution::Confirmed(v)) => serde_json::json!({ "confirmed": v }),
        Some(PopupResolution::Selected(i)) => serde_json::json!({ "selected": i }),
        Some(PopupResolution::Cancelled) | None => serde_json::json!({ "cancelled": true }),
    };
    if state.daemon.is_connected() {
        let _ = state.daemon.pop_response(target.as_deref(), resolution);
    }
}

// --- IPC (§4.4 "Ad-hoc float") ---------------------------------------------

fn handle_ipc(state: &mut State, now_ms: u64) {
    match state.ipc.as_mut() {
        Some(ipc) => ipc.accept_one(),
        None => return,
    }
    let Some((request, stream)) = state.ipc.as_mut().and_then(|i| i.poll_requests()) else { return };
    match request {
        IpcRequest::Notify { message, duration_ms } => {
            state.mux_realm.push_notification(message, duration_ms, now_ms);
            state.flags.needs_render = true;
        }
        IpcRequest::Float(req) => dispatch_ipc_float(state, req, stream),
    }
}

fn dispatch_ipc_float(state: &mut State, req: FloatRequest, stream: UnixStream) {
    let area = state.content_rect();
    let w = (area.w as u32 * 70 / 100).max(1) as u16;
    let h = (area.h as u32 * 70 / 100).max(1) as u16;
    let size = PtySize { cols: w, rows: h, pixel_width: 0, pixel_height: 0 };
    let numeric_id = crate::state::next_numeric_id();

    let result = state.floats.create_adhoc(
        &*state.pty_system,
        numeric_id,
        &req.command,
        req.cwd.as_deref(),
        &req.env_lines,
        size,
        state.config.scrollback_lines,
        req.wait,
        req.result_file.clone(),
    );

    match result {
        Ok(pane_id) => {
            let idx = state.floats.floats.len() - 1;
            position_float(state, idx);
            if req.wait {
                if let Some(ipc) = state.ipc.as_mut() {
                    ipc.waiting.insert(pane_id.0.clone(), stream);
                }
            } else {
                ipc::reply_float_created(stream, &pane_id);
            }
            state.flags.needs_render = true;
        }
        Err(e) => ipc::reply_error(&stream, &format!("{e}")),
    }
}

fn position_float(state: &mut State, idx: usize) {
    let area = state.content_rect();
    if let Some(float) = state.floats.floats.get_mut(idx) {
        if let Some(meta) = float.pane.float_meta.clone() {
            let x = (area.w as u32 * meta.pct_x as u32 / 100) as u16;
            let y = (area.h as u32 * meta.pct_y as u32 / 100) as u16;
            let w = (area.w as u32 * meta.pct_w as u32 / 100).max(1) as u16;
            let h = (area.h as u32 * meta.pct_h as u32 / 100).max(1) as u16;
            float.pane.rect = Rect::new(x, y, w, h);
        }
    }
}

// --- stdin: blocking-popup input, the hardcoded prefix scheme, or raw
// passthrough to the focused pane -------------------------------------------

fn handle_stdin(
    state: &mut State,
    osc_reply_target: &mut Option<(PaneLoc, PaneId)>,
    osc_reply_scan: &mut OscReplyScan,
) -> Result<()> {
    let mut byte = [0u8; 1];
    match io::stdin().lock().read(&mut byte) {
        Ok(0) => return Ok(()),
        Ok(_) => {}
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => return Ok(()),
        Err(e) => return Err(Error::Pty(e)),
    }
    let b = byte[0];

    if let Some((loc, pane_id)) = osc_reply_target.clone() {
        let still_waiting = pane_at_mut(state, loc).is_some_and(|p| p.id == pane_id);
        if still_waiting {
            route_osc_reply_byte(state, loc, b, osc_reply_scan);
            if *osc_reply_scan == OscReplyScan::Idle {
                *osc_reply_target = None;
            }
            return Ok(());
        }
        *osc_reply_target = None;
        *osc_reply_scan = OscReplyScan::Idle;
    }

    if state.mux_realm.has_blocking_popup() {
        resolve_popup_input(state.mux_realm.top_popup_mut().unwrap(), b);
        state.flags.needs_render = true;
        return Ok(());
    }
    let active_tab = state.active_tab;
    if state.tabs[active_tab].realm.has_blocking_popup() {
        resolve_popup_input(state.tabs[active_tab].realm.top_popup_mut().unwrap(), b);
        state.flags.needs_render = true;
        return Ok(());
    }

    if state.prefix_armed {
        state.prefix_armed = false;
        return dispatch_prefixed_action(state, b);
    }
    if b == PREFIX_BYTE {
        state.prefix_armed = true;
        return Ok(());
    }

    forward_to_focused(state, &[b])
}

fn resolve_popup_input(popup: &mut Popup, b: u8) {
    match &popup.kind {
        PopupKind::Confirm { .. } => match b {
            b'y' | b'Y' => popup.accept(),
            b'n' | b'N' => popup.resolution = Some(PopupResolution::Confirmed(false)),
            _ => popup.cancel(),
        },
        PopupKind::Choose { options, .. } => {
            if b == 0x1b {
                popup.cancel();
            } else if let Some(n) = (b as char).to_digit(10) {
                if (n as usize) < options.len() {
                    popup.select(n as usize);
                } else {
                    popup.cancel();
                }
            }
        }
    }
}

fn forward_to_focused(state: &mut State, bytes: &[u8]) -> Result<()> {
    if let Some(idx) = state.floats.active_floating {
        if let Some(float) = state.floats.floats.get_mut(idx) {
            return float.pane.backend.write(bytes);
        }
    }
    if let Some(pane) = state.active_tab_mut().focused_pane_mut() {
        pane.backend.write(bytes)?;
    }
    Ok(())
}

fn dispatch_prefixed_action(state: &mut State, b: u8) -> Result<()> {
    match b {
        b'c' => close_focused_pane(state),
        b'|' => split_focused(state, LayoutKind::Horizontal)?,
        b'-' => split_focused(state, LayoutKind::Vertical)?,
        b'h' => move_focus(state, FocusDir::Left),
        b'j' => move_focus(state, FocusDir::Down),
        b'k' => move_focus(state, FocusDir::Up),
        b'l' => move_focus(state, FocusDir::Right),
        b'd' => {
            state.flags.detach_mode = true;
            state.flags.running = false;
        }
        b'n' => new_tab(state)?,
        b'1'..=b'9' => {
            let idx = (b - b'1') as usize;
            if idx < state.tabs.len() {
                state.active_tab = idx;
            }
        }
        _ => match state.config.floats.iter().position(|f| f.key == b) {
            Some(def_idx) => toggle_named_float(state, def_idx)?,
            None => forward_to_focused(state, &[PREFIX_BYTE, b])?,
        },
    }
    state.flags.needs_render = true;
    Ok(())
}

fn close_focused_pane(state: &mut State) {
    if let Some(idx) = state.floats.active_floating {
        if let Some(float) = state.floats.floats.get_mut(idx) {
            float.pane.close();
        }
        return;
    }
    let tab = state.active_tab_mut();
    let idx = tab.layout.focused_index();
    if tab.layout.split_count() > 1 {
        if let Some(mut pane) = tab.layout.close_pane(idx) {
            pane.close();
        }
    }
}

fn split_focused(state: &mut State, kind: LayoutKind) -> Result<()> {
    let focus_idx = state.active_tab().layout.focused_index();
    let parent_rect = state.active_tab().layout.get_focused_pane().map(|p| p.rect).unwrap_or_else(|| state.content_rect());
    let size = PtySize { cols: parent_rect.w.max(1), rows: parent_rect.h.max(1), pixel_width: 0, pixel_height: 0 };
    let cwd = state.active_cwd().map(str::to_string);

    let pane = Pane::new_local(&*state.pty_system, crate::state::next_numeric_id(), None, cwd.as_deref(), &[], size, state.config.scrollback_lines)?;
    state.active_tab_mut().layout.split(focus_idx, kind, pane);

    let area = state.content_rect();
    state.active_tab_mut().layout.resize(area, |p, r| {
        p.rect = r;
        let _ = p.resize(r.w, r.h);
    });
    Ok(())
}

fn move_focus(state: &mut State, dir: FocusDir) {
    if state.floats.active_floating.is_some() {
        return;
    }
    let tab = state.active_tab();
    let focus_idx = tab.layout.focused_index();
    let Some(from) = tab.layout.get_focused_pane() else { return };
    let from_rect = from.rect;
    let (cursor_row, cursor_col) = from.vt.get_cursor();
    let cursor = (from_rect.x as i32 + cursor_col as i32, from_rect.y as i32 + cursor_row as i32);

    let candidates: Vec<(usize, Rect)> =
        tab.layout.split_iterator().into_iter().filter(|(idx, _)| *idx != focus_idx).map(|(idx, p)| (idx, p.rect)).collect();
    let rects: Vec<Rect> = candidates.iter().map(|(_, r)| *r).collect();

    if let Some(pick) = crate::focus::next_in_direction(from_rect, &rects, dir, cursor) {
        let target_idx = candidates[pick].0;
        state.active_tab_mut().layout.focus(target_idx);
    }
}

fn new_tab(state: &mut State) -> Result<()> {
    let area = state.content_rect();
    let size = PtySize { cols: area.w.max(1), rows: area.h.max(1), pixel_width: 0, pixel_height: 0 };
    let pane = Pane::new_local(&*state.pty_system, crate::state::next_numeric_id(), None, None, &[], size, state.config.scrollback_lines)?;
    let tab = Tab::new(format!("tab {}", state.tabs.len() + 1), pane);
    state.tabs.push(tab);
    state.active_tab = state.tabs.len() - 1;
    state.flags.force_full_render = true;
    Ok(())
}

fn toggle_named_float(state: &mut State, def_idx: usize) -> Result<()> {
    let def = state.config.floats[def_idx].clone();
    let tab_idx = state.active_tab;
    let cwd = state.active_cwd().map(str::to_string);

    match state.floats.find_existing(&def, tab_idx, cwd.as_deref()) {
        Some(existing) => {
            state.floats.toggle_existing(existing, &def, tab_idx);
        }
        None => {
            let pane = spawn_for_float(state, &def, cwd.as_deref())?;
            let idx = state.floats.insert_new(pane, &def, tab_idx, cwd.as_deref());
            position_float(state, idx);
        }
    }
    Ok(())
}

fn spawn_for_float(state: &mut State, def: &FloatDef, cwd: Option<&str>) -> Result<Pane> {
    let area = state.content_rect();
    let w = (area.w as u32 * def.pct_w as u32 / 100).max(1) as u16;
    let h = (area.h as u32 * def.pct_h as u32 / 100).max(1) as u16;
    let size = PtySize { cols: w, rows: h, pixel_width: 0, pixel_height: 0 };
    let numeric_id = crate::state::next_numeric_id();

    if state.daemon.is_connected() {
        if let Ok(handle) = state.daemon.create_pane(Some(&def.command), cwd, &[]) {
            return Pane::new_daemon(numeric_id, &handle.socket_path, size, state.config.scrollback_lines);
        }
    }
    Pane::new_local(&*state.pty_system, numeric_id, Some(&def.command), cwd, &[], size, state.config.scrollback_lines)
}

// --- rendering --------------------------------------------------------------

fn render(state: &mut State) -> Result<()> {
    state.renderer.begin_frame();

    let active_tab = state.active_tab;
    let tiled: Vec<(Rect, crate::vt::RenderState)> = state.tabs[active_tab]
        .layout
        .split_iterator()
        .into_iter()
        .map(|(_, p)| (p.rect, p.vt.get_render_state()))
        .collect();
    for (rect, rs) in &tiled {
        state.renderer.draw_render_state(rs, rect.x, rect.y, rect.w, rect.h);
    }

    let floating: Vec<(Rect, crate::vt::RenderState)> = state
        .floats
        .floats
        .iter()
        .filter(|f| f.is_visible_on(active_tab))
        .map(|f| (f.pane.rect, f.pane.vt.get_render_state()))
        .collect();
    for (rect, rs) in &floating {
        state.renderer.draw_render_state(rs, rect.x, rect.y, rect.w, rect.h);
    }

    draw_status_bar(state);

    let mut stdout = io::stdout();
    state.renderer.end_frame(&mut stdout, state.flags.force_full_render).map_err(Error::Pty)?;
    Ok(())
}

fn draw_status_bar(state: &mut State) {
    let row = state.term_rows.saturating_sub(1);
    let cols = state.term_cols;
    let active_tab = state.active_tab;
    let mut x = 0u16;
    for (i, tab) in state.tabs.iter().enumerate() {
        if x >= cols {
            break;
        }
        let label = format!(" {} ", tab.name);
        for ch in label.chars() {
            if x >= cols {
                break;
            }
            state.renderer.set_cell(x, row, Cell { codepoint: ch as u32, inverse: i == active_tab, ..Cell::default() });
            x += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_popup_input_confirm_yes_and_no() {
        let mut yes = Popup::confirm("ok?".into(), None, 0);
        resolve_popup_input(&mut yes, b'y');
        assert_eq!(yes.resolution, Some(PopupResolution::Confirmed(true)));

        let mut no = Popup::confirm("ok?".into(), None, 0);
        resolve_popup_input(&mut no, b'n');
        assert_eq!(no.resolution, Some(PopupResolution::Confirmed(false)));
    }

    #[test]
    fn resolve_popup_input_choose_selects_digit_or_cancels() {
        let mut popup = Popup::choose("pick".into(), vec!["a".into(), "b".into()], None, 0);
        resolve_popup_input(&mut popup, b'1');
        assert_eq!(popup.resolution, Some(PopupResolution::Selected(1)));

        let mut popup2 = Popup::choose("pick".into(), vec!["a".into()], None, 0);
        resolve_popup_input(&mut popup2, 0x1b);
        assert_eq!(popup2.resolution, Some(PopupResolution::Cancelled));

        let mut popup3 = Popup::choose("pick".into(), vec!["a".into()], None, 0);
        resolve_popup_input(&mut popup3, b'9');
        assert_eq!(popup3.resolution, Some(PopupResolution::Cancelled));
    }
}
