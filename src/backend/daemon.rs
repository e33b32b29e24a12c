//! Daemon backend: a pane that is a thin client of a daemon-hosted
//! process, reached over a dedicated per-pane Unix socket speaking the
//! framed binary protocol in [`crate::protocol`] (§4.2 "Daemon
//! backend").

use std::io::{Read as _, Write as _};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::error::{Error, Result};
use crate::protocol::{self, Frame, FrameType};

use super::PollResult;

pub struct DaemonBackend {
    socket: UnixStream,
    fd: RawFd,
    /// Bytes read but not yet enough to complete a frame header/payload.
    read_buf: Vec<u8>,
}

impl DaemonBackend {
    pub fn connect(socket_path: &std::path::Path) -> Result<Self> {
        let socket = UnixStream::connect(socket_path).map_err(Error::Daemon)?;
        socket.set_nonblocking(true).map_err(Error::Daemon)?;
        let fd = socket.as_raw_fd();
        Ok(DaemonBackend { socket, fd, read_buf: Vec::new() })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Reads whatever raw bytes are available, appends to `read_buf`,
    /// then drains as many complete frames as are buffered. Only
    /// `output` frame payloads are returned as bytes for the output
    /// pipeline; `backlog_end` sets the flag on the result; other
    /// frame types are ignored here (§4.2).
    pub fn poll(&mut self, scratch: &mut [u8]) -> Result<Option<PollResult>> {
        let mut any = false;
        loop {
            match self.socket.read(scratch) {
                Ok(0) => break,
                Ok(n) => {
                    self.read_buf.extend_from_slice(&scratch[..n]);
                    any = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Daemon(e)),
            }
        }
        if !any && self.read_buf.is_empty() {
            return Ok(None);
        }

        let mut output = Vec::new();
        let mut backlog_end = false;
        while let Some((frame, consumed)) = protocol::try_parse_frame(&self.read_buf)? {
            match frame.kind {
                FrameType::Output => output.extend_from_slice(&frame.payload),
                FrameType::BacklogEnd => backlog_end = true,
                FrameType::Input | FrameType::Resize => {}
            }
            self.read_buf.drain(..consumed);
        }

        if output.is_empty() && !backlog_end {
            return Ok(None);
        }
        Ok(Some(PollResult { bytes: output, backlog_end }))
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        protocol::write_frame(&mut self.socket, &Frame::input(bytes.to_vec()))
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        protocol::write_frame(&mut self.socket, &Frame::resize(cols, rows))
    }

    /// The daemon owns process lifecycle; from the pane's perspective a
    /// daemon-backed pane is always alive until explicitly closed.
    pub fn is_alive(&mut self) -> bool {
        true
    }

    pub fn close(&mut self) {
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
    }
}
