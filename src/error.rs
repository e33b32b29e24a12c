//! Crate-level error type.
//!
//! Per the error-handling design, nothing in the core panics: every
//! fallible operation either recovers locally or is converted into a
//! MUX-realm notification by the caller. This enum exists so those
//! callers have something concrete to match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("spawn pane: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("pty i/o: {0}")]
    Pty(#[source] std::io::Error),

    #[error("daemon i/o: {0}")]
    Daemon(#[source] std::io::Error),

    #[error("daemon sent malformed message: {0}")]
    DaemonProtocol(String),

    #[error("ipc i/o: {0}")]
    Ipc(#[source] std::io::Error),

    #[error("ipc request malformed: {0}")]
    IpcProtocol(String),

    #[error("frame too large: {0} bytes (max {max})", max = crate::protocol::MAX_FRAME_LEN)]
    FrameTooLarge(u32),

    #[error("serialize session state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
