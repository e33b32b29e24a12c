mod backend;
mod clipboard;
mod cli;
mod config;
mod daemon_client;
mod error;
mod float;
mod focus;
mod ipc;
mod layout;
mod mainloop;
mod output_pipeline;
mod pane;
mod protocol;
mod realm;
mod renderer;
mod session_state;
mod state;
mod tab;
mod terminal_guard;
mod types;
mod vt;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::Config;
use crate::daemon_client::DaemonClient;
use crate::error::{Error, Result};
use crate::float::Float;
use crate::ipc::IpcServer;
use crate::layout::{Layout, LayoutTree};
use crate::pane::{FloatMeta, Pane, Visibility};
use crate::realm::Realm;
use crate::session_state::{SerializedPane, SerializedState};
use crate::state::State;
use crate::tab::Tab;
use crate::terminal_guard::TerminalGuard;
use crate::types::TabId;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose);

    tracing::info!(version = %types::VERSION, "starting");

    let config = Config::load(cli.config.as_deref())?;
    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));

    let mut guard = TerminalGuard::enter()?;
    let result = run_session(&cli, config, cols, rows);
    guard.leave();

    match result {
        Ok(Some(detach_uuid)) => {
            println!("Session detached: {detach_uuid}");
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Builds the `State`, wires up the daemon/IPC collaborators, and runs
/// the main loop. Returns `Some(uuid)` of the session that was detached,
/// if the loop exited via a detach rather than a plain quit.
fn run_session(cli: &Cli, config: Config, cols: u16, rows: u16) -> Result<Option<String>> {
    let mut state = if let Some(prefix) = cli.attach.as_deref() {
        attach_session(&config, prefix, cols, rows)?
    } else {
        State::with_command(config.clone(), cols, rows, cli.command.as_deref())?
    };

    if let Some(socket_path) = config.daemon_socket.as_deref() {
        if !state.daemon.is_connected() {
            match DaemonClient::connect(socket_path) {
                Ok(client) => state.daemon = client,
                Err(e) => tracing::warn!(error = %e, "daemon connect failed, running without persistence"),
            }
        }
        let ipc_path = socket_path.with_file_name(format!(
            "{}.ipc",
            socket_path.file_stem().and_then(|s| s.to_str()).unwrap_or("hexe")
        ));
        match IpcServer::bind(&ipc_path) {
            Ok(server) => state.ipc = Some(server),
            Err(e) => tracing::warn!(error = %e, "local ipc bind failed, ad-hoc floats unavailable"),
        }
    }

    mainloop::run(&mut state)?;

    if state.flags.detach_mode {
        let serialized = session_state::build(
            &state.tabs,
            state.active_tab,
            &state.floats.floats,
            state.floats.active_floating,
        );
        let session_uuid = state.tabs[state.active_tab].id.0.clone();
        if state.daemon.is_connected() {
            let value = serde_json::to_value(&serialized).map_err(Error::Serialize)?;
            state.daemon.detach_session(&session_uuid, value)?;
        }
        return Ok(Some(session_uuid));
    }

    Ok(None)
}

/// Reattaches to a previously detached session (CLI `--attach`):
/// connects to the daemon, asks it for the session matching
/// `uuid_prefix`, and rebuilds tabs/floats from the returned
/// [`SerializedState`], reconnecting each pane as a daemon-client by its
/// preserved UUID (§8 "Round-trip frame").
fn attach_session(config: &Config, uuid_prefix: &str, cols: u16, rows: u16) -> Result<State> {
    let socket_path = config
        .daemon_socket
        .clone()
        .ok_or_else(|| Error::Config("no daemon_socket configured; cannot --attach".into()))?;
    let mut daemon = DaemonClient::connect(&socket_path)?;
    let (state_value, sockets_value) = daemon.attach_session(uuid_prefix)?;
    let serialized: SerializedState = serde_json::from_value(state_value).map_err(Error::Serialize)?;
    let sockets: std::collections::HashMap<String, PathBuf> =
        serde_json::from_value(sockets_value).map_err(Error::Serialize)?;

    let mut state = State::new(config.clone(), cols, rows)?;
    state.daemon = daemon;
    state.tabs.clear();

    let scrollback = state.config.scrollback_lines;
    let size = portable_pty::PtySize { rows, cols, pixel_width: 0, pixel_height: 0 };

    for serialized_tab in serialized.tabs {
        let layout = Layout::from_tree(build_pane_tree(serialized_tab.layout, &sockets, size, scrollback)?);
        let tab = Tab { id: TabId(serialized_tab.id), name: serialized_tab.name, layout, realm: Realm::default() };
        state.tabs.push(tab);
    }
    if state.tabs.is_empty() {
        return Err(Error::DaemonProtocol("attach_session: session has no tabs".into()));
    }

    for sf in serialized.floats {
        let socket_path = sockets
            .get(&sf.pane.uuid)
            .ok_or_else(|| Error::DaemonProtocol(format!("no socket for float {}", sf.pane.uuid)))?;
        let mut pane = Pane::new_daemon(state::next_numeric_id(), socket_path, size, scrollback)?;
        pane.id = crate::types::PaneId(sf.pane.uuid.clone());
        pane.numeric_id = sf.pane.numeric_id;
        pane.cached_cwd = sf.pane.cached_cwd.clone();
        pane.float_parent_tab = sf.tab_parent;
        pane.visibility = Some(Visibility::from(sf.visibility));
        pane.float_meta = Some(FloatMeta {
            // Titles aren't part of the round-tripped state (§8); a
            // reattached float shows a blank title until re-toggled.
            title: String::new(),
            float_key: sf.float_key,
            pct_x: sf.pct_x,
            pct_y: sf.pct_y,
            pct_w: sf.pct_w,
            pct_h: sf.pct_h,
            per_cwd_dir: sf.per_cwd_dir,
            sticky: sf.sticky,
        });
        state.floats.floats.push(Float { pane });
    }

    state.active_tab = serialized.active_tab.min(state.tabs.len() - 1);
    state.floats.active_floating = serialized.active_floating;
    state.resize_all(cols, rows)?;
    Ok(state)
}

/// Rebuilds a pane-bearing [`LayoutTree`] from its serialized,
/// UUID-only form by reconnecting each leaf to the daemon-hosted pane
/// it names.
fn build_pane_tree(
    tree: LayoutTree<SerializedPane>,
    sockets: &std::collections::HashMap<String, PathBuf>,
    size: portable_pty::PtySize,
    scrollback: usize,
) -> Result<LayoutTree<Pane>> {
    match tree {
        LayoutTree::Leaf(sp) => {
            let socket_path = sockets
                .get(&sp.uuid)
                .ok_or_else(|| Error::DaemonProtocol(format!("no socket for pane {}", sp.uuid)))?;
            let mut pane = Pane::new_daemon(state::next_numeric_id(), socket_path, size, scrollback)?;
            pane.id = crate::types::PaneId(sp.uuid);
            pane.numeric_id = sp.numeric_id;
            pane.cached_cwd = sp.cached_cwd;
            Ok(LayoutTree::Leaf(pane))
        }
        LayoutTree::Split { kind, ratio, first, second } => Ok(LayoutTree::Split {
            kind,
            ratio,
            first: Box::new(build_pane_tree(*first, sockets, size, scrollback)?),
            second: Box::new(build_pane_tree(*second, sockets, size, scrollback)?),
        }),
    }
}

/// Initializes `tracing` to a rotating file under the XDG state
/// directory, never stdout/stderr (which the renderer owns exclusively
/// once raw mode is entered). Verbosity bumps from `-v` raise the
/// default filter; `RUST_LOG` always takes precedence if set.
fn init_logging(verbose: u8) -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("hexe");
    let _ = std::fs::create_dir_all(&log_dir);
    let appender = tracing_appender::rolling::daily(&log_dir, "hexe.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("hexe={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    guard
}
