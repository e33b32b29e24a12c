//! Pane backend abstraction (§4.2): a pane's IO source is either a
//! local PTY or a daemon-hosted process reached over a framed socket.
//! Represented as a tagged union per §9 "Tagged backend" — the pane
//! code branches on the tag exactly once, at each call boundary, never
//! deeper.

pub mod daemon;
pub mod local;

use crate::error::Result;

pub use daemon::DaemonBackend;
pub use local::LocalBackend;

pub enum Backend {
    Local(LocalBackend),
    Daemon(DaemonBackend),
}

impl Backend {
    /// The fd the main loop should poll for readability.
    pub fn fd(&self) -> std::os::fd::RawFd {
        match self {
            Backend::Local(b) => b.fd(),
            Backend::Daemon(b) => b.fd(),
        }
    }

    /// Reads available bytes into `buf`, returning `Some(n)` if any
    /// data was consumed (including runs of zero or more complete
    /// frames for the daemon variant), `None` on would-block.
    pub fn poll(&mut self, buf: &mut [u8]) -> Result<Option<PollResult>> {
        match self {
            Backend::Local(b) => b.poll(buf),
            Backend::Daemon(b) => b.poll(buf),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Backend::Local(b) => b.write(bytes),
            Backend::Daemon(b) => b.write(bytes),
        }
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        match self {
            Backend::Local(b) => b.resize(cols, rows),
            Backend::Daemon(b) => b.resize(cols, rows),
        }
    }

    pub fn is_alive(&mut self) -> bool {
        match self {
            Backend::Local(b) => b.is_alive(),
            Backend::Daemon(b) => b.is_alive(),
        }
    }

    /// The exit code a dead local backend reaped, if any. Daemon-backed
    /// panes never report one here (§4.2): lifecycle belongs to the daemon.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Backend::Local(b) => b.exit_code(),
            Backend::Daemon(_) => None,
        }
    }

    pub fn close(&mut self) {
        match self {
            Backend::Local(b) => b.close(),
            Backend::Daemon(b) => b.close(),
        }
    }
}

/// Output from a single `poll()` call: raw bytes read from the
/// backend, destined for the output pipeline, plus whether the
/// backend observed end-of-replay (daemon `backlog_end`).
pub struct PollResult {
    pub bytes: Vec<u8>,
    pub backlog_end: bool,
}
