//! Local IPC server (§4.4 "Ad-hoc float (IPC)"): a Unix-domain,
//! line-delimited JSON server. One connection is accepted per main
//! loop iteration and at most one buffered request is completed and
//! handed back to the caller per iteration.

use std::collections::HashMap;
use std::io::{Read as _, Write as _};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::PaneId;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawRequest {
    Notify {
        message: String,
        #[serde(default = "default_duration_ms")]
        duration_ms: u64,
    },
    Float {
        command: String,
        cwd: Option<String>,
        env: Option<Vec<String>>,
        extra_env: Option<Vec<String>>,
        env_file: Option<String>,
        #[serde(default)]
        wait: bool,
        result_file: Option<String>,
    },
}

fn default_duration_ms() -> u64 {
    3_000
}

pub enum IpcRequest {
    Notify { message: String, duration_ms: u64 },
    Float(FloatRequest),
}

#[derive(Debug)]
pub struct FloatRequest {
    pub command: String,
    pub cwd: Option<String>,
    pub env_lines: Vec<String>,
    pub wait: bool,
    pub result_file: Option<PathBuf>,
}

struct PendingConnection {
    stream: UnixStream,
    buf: Vec<u8>,
}

pub struct IpcServer {
    listener: UnixListener,
    fd: RawFd,
    incoming: Vec<PendingConnection>,
    /// Connections held open for a `wait` float, keyed by the spawned
    /// pane's UUID so the main loop can look them up on pane death.
    pub waiting: HashMap<String, UnixStream>,
}

impl IpcServer {
    pub fn bind(socket_path: &std::path::Path) -> Result<Self> {
        if socket_path.exists() {
            let _ = std::fs::remove_file(socket_path);
        }
        let listener = UnixListener::bind(socket_path).map_err(Error::Ipc)?;
        listener.set_nonblocking(true).map_err(Error::Ipc)?;
        let fd = listener.as_raw_fd();
        Ok(IpcServer { listener, fd, incoming: Vec::new(), waiting: HashMap::new() })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Accepts at most one new connection (§4.1 step (d)); non-blocking,
    /// so "nothing waiting" is not an error.
    pub fn accept_one(&mut self) {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                let _ = stream.set_nonblocking(true);
                self.incoming.push(PendingConnection { stream, buf: Vec::new() });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(_) => {}
        }
    }

    /// Reads whatever is available from each buffered connection and
    /// completes the first full JSON line it finds, returning it along
    /// with the stream so the caller can reply. Malformed lines get an
    /// immediate `{"type":"error",...}` reply and are dropped.
    pub fn poll_requests(&mut self) -> Option<(IpcRequest, UnixStream)> {
        let mut scratch = [0u8; 4096];
        let mut i = 0;
        while i < self.incoming.len() {
            let done = loop {
                match self.incoming[i].stream.read(&mut scratch) {
                    Ok(0) => break true,
                    Ok(n) => {
                        self.incoming[i].buf.extend_from_slice(&scratch[..n]);
                        if self.incoming[i].buf.contains(&b'\n') {
                            break true;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break false,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break true,
                }
            };

            if !done {
                i += 1;
                continue;
            }

            let pending = self.incoming.remove(i);
            let Some(newline) = pending.buf.iter().position(|&b| b == b'\n') else {
                // Connection closed without sending a full line; drop it.
                continue;
            };
            let line = &pending.buf[..newline];
            match parse_request(line) {
                Ok(req) => return Some((req, pending.stream)),
                Err(msg) => {
                    reply_error(&pending.stream, &msg);
                    continue;
                }
            }
        }
        None
    }
}

fn parse_request(line: &[u8]) -> std::result::Result<IpcRequest, String> {
    let raw: RawRequest = serde_json::from_slice(line).map_err(|e| e.to_string())?;
    match raw {
        RawRequest::Notify { message, duration_ms } => Ok(IpcRequest::Notify { message, duration_ms }),
        RawRequest::Float { command, cwd, env, extra_env, env_file, wait, result_file } => {
            if command.trim().is_empty() {
                return Err("float request requires a non-empty command".to_string());
            }
            let mut env_lines = Vec::new();
            if let Some(e) = env {
                env_lines.extend(e);
            }
            if let Some(e) = extra_env {
                env_lines.extend(e);
            }
            if let Some(path) = env_file {
                if let Ok(contents) = std::fs::read_to_string(&path) {
                    env_lines.extend(contents.lines().map(str::to_string));
                }
                let _ = std::fs::remove_file(&path);
            }
            Ok(IpcRequest::Float(FloatRequest {
                command,
                cwd,
                env_lines,
                wait,
                result_file: result_file.map(PathBuf::from),
            }))
        }
    }
}

pub(crate) fn reply_error(mut stream: &UnixStream, message: &str) {
    let line = serde_json::json!({ "type": "error", "message": message });
    let _ = writeln!(stream, "{line}");
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

pub fn reply_float_created(mut stream: UnixStream, pane_id: &PaneId) {
    let line = serde_json::json!({ "type": "float_created", "uuid": pane_id.0 });
    let _ = writeln!(stream, "{line}");
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

/// Emits the single `float_result` line for a completed wait-float and
/// closes the connection (§4.4 "blocking float completion").
pub fn deliver_float_result(mut stream: UnixStream, pane_id: &PaneId, exit_code: i32, stdout: &str) {
    let line = serde_json::json!({
        "type": "float_result",
        "uuid": pane_id.0,
        "exit_code": exit_code,
        "stdout": stdout,
    });
    let _ = writeln!(stream, "{line}");
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_notify_request_with_default_duration() {
        let req = parse_request(br#"{"type":"notify","message":"hi"}"#).unwrap();
        match req {
            IpcRequest::Notify { message, duration_ms } => {
                assert_eq!(message, "hi");
                assert_eq!(duration_ms, 3_000);
            }
            _ => panic!("expected Notify"),
        }
    }

    #[test]
    fn parses_float_request_with_wait() {
        let req = parse_request(br#"{"type":"float","command":"echo hi","wait":true}"#).unwrap();
        match req {
            IpcRequest::Float(f) => {
                assert_eq!(f.command, "echo hi");
                assert!(f.wait);
            }
            _ => panic!("expected Float"),
        }
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = parse_request(br#"{"type":"float","command":""}"#).unwrap_err();
        assert!(err.contains("non-empty"));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(parse_request(b"not json").is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(parse_request(br#"{"type":"bogus"}"#).is_err());
    }
}
