//! Local backend: a pane that owns a PTY master and its child's pid
//! directly (§4.2 "Local backend"). `poll` is non-blocking; the main
//! loop drives it only when `poll(2)` reports the fd readable.

use std::io::Read as _;
use std::os::fd::{AsRawFd, RawFd};

use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, PtySystem};

use crate::error::{Error, Result};

use super::PollResult;

pub struct LocalBackend {
    master: Box<dyn MasterPty + Send>,
    reader: Box<dyn std::io::Read + Send>,
    writer: Box<dyn std::io::Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    fd: RawFd,
    /// Set once `waitpid` reaps the child; `is_alive` short-circuits
    /// to false forever after, as the real pid is no longer valid.
    reaped: bool,
    last_exit_code: Option<i32>,
}

impl LocalBackend {
    /// Spawns `command` (or the user's `$SHELL` if `None`) at `size`,
    /// in `cwd` if given.
    pub fn spawn(
        pty_system: &dyn PtySystem,
        command: Option<&str>,
        cwd: Option<&str>,
        extra_env: &[String],
        size: PtySize,
    ) -> Result<Self> {
        let pair = pty_system.openpty(size).map_err(|e| Error::Spawn(std::io::Error::other(e)))?;

        let mut builder = build_command(command, extra_env);
        if let Some(cwd) = cwd {
            builder.cwd(cwd);
        }

        let child = pair.slave.spawn_command(builder).map_err(|e| Error::Spawn(std::io::Error::other(e)))?;
        drop(pair.slave);

        let fd = pair
            .master
            .as_raw_fd()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("pty master has no raw fd")))?;
        let reader = pair.master.try_clone_reader().map_err(|e| Error::Pty(std::io::Error::other(e)))?;
        let writer = pair.master.take_writer().map_err(|e| Error::Pty(std::io::Error::other(e)))?;

        Ok(LocalBackend { master: pair.master, reader, writer, child, fd, reaped: false, last_exit_code: None })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    pub fn poll(&mut self, buf: &mut [u8]) -> Result<Option<PollResult>> {
        match self.reader.read(buf) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(PollResult { bytes: buf[..n].to_vec(), backlog_end: false })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(Error::Pty(e)),
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        use std::io::Write as _;
        self.writer.write_all(bytes).map_err(Error::Pty)
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| Error::Pty(std::io::Error::other(e)))
    }

    pub fn is_alive(&mut self) -> bool {
        if self.reaped {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.reaped = true;
                self.last_exit_code = Some(status.exit_code() as i32);
                false
            }
            Ok(None) => true,
            Err(_) => {
                self.reaped = true;
                false
            }
        }
    }

    pub fn close(&mut self) {
        let _ = self.child.kill();
    }

    /// `respawn` (§4.2 "local-only"): closes the PTY and spawns a fresh
    /// shell at the same geometry. Caller is responsible for
    /// reinitializing the pane's VT afterward.
    pub fn respawn(&mut self, pty_system: &dyn PtySystem, command: Option<&str>, size: PtySize) -> Result<()> {
        let _ = self.child.kill();
        let fresh = LocalBackend::spawn(pty_system, command, None, &[], size)?;
        *self = fresh;
        Ok(())
    }
}

/// Builds the child command, applying `TERM`/`COLORTERM` and then each
/// `extra_env` entry (`KEY=VALUE` lines — malformed ones, with no `=`,
/// are skipped) so ad-hoc float requests can pass through their own
/// environment (§4.4 "Ad-hoc float").
fn build_command(command: Option<&str>, extra_env: &[String]) -> CommandBuilder {
    let mut builder = match command {
        Some(cmd) => {
            let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
            let mut b = CommandBuilder::new(shell);
            b.args(["-c", cmd]);
            b
        }
        None => {
            let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
            CommandBuilder::new(shell)
        }
    };
    builder.env("TERM", "xterm-256color");
    builder.env("COLORTERM", "truecolor");
    for line in extra_env {
        if let Some((key, value)) = line.split_once('=') {
            builder.env(key, value);
        }
    }
    builder
}
