//! Per-pane binary frame protocol spoken over the daemon's Unix-domain
//! socket (§4.2, §6): a 1-byte frame type, a 4-byte big-endian payload
//! length, then the payload itself, capped at [`MAX_FRAME_LEN`].

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// 16 MiB — the largest payload a single frame may carry.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Bytes the backend wrote to the pane's underlying process.
    Output,
    /// Bytes to deliver to the pane's stdin.
    Input,
    /// New (cols, rows) — payload is 2x u16 big-endian.
    Resize,
    /// Marks the end of replayed backlog on an adopt/reattach; empty payload.
    BacklogEnd,
}

impl FrameType {
    fn to_byte(self) -> u8 {
        match self {
            FrameType::Output => 0,
            FrameType::Input => 1,
            FrameType::Resize => 2,
            FrameType::BacklogEnd => 3,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(FrameType::Output),
            1 => Ok(FrameType::Input),
            2 => Ok(FrameType::Resize),
            3 => Ok(FrameType::BacklogEnd),
            other => Err(Error::DaemonProtocol(format!("unknown frame type byte {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn output(bytes: Vec<u8>) -> Self {
        Frame { kind: FrameType::Output, payload: bytes }
    }

    pub fn input(bytes: Vec<u8>) -> Self {
        Frame { kind: FrameType::Input, payload: bytes }
    }

    pub fn resize(cols: u16, rows: u16) -> Self {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&cols.to_be_bytes());
        payload.extend_from_slice(&rows.to_be_bytes());
        Frame { kind: FrameType::Resize, payload }
    }

    pub fn backlog_end() -> Self {
        Frame { kind: FrameType::BacklogEnd, payload: Vec::new() }
    }

    /// Decodes a `resize` frame's payload into `(cols, rows)`;
    /// panics-free, returns `None` on malformed length since callers
    /// treat this as advisory.
    pub fn as_resize(&self) -> Option<(u16, u16)> {
        if self.kind != FrameType::Resize || self.payload.len() != 4 {
            return None;
        }
        let cols = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        let rows = u16::from_be_bytes([self.payload[2], self.payload[3]]);
        Some((cols, rows))
    }
}

/// Encodes `frame` onto `out`. Returns [`Error::FrameTooLarge`] rather
/// than writing a truncated frame if the payload exceeds the cap.
pub fn write_frame<W: Write>(out: &mut W, frame: &Frame) -> Result<()> {
    let len = frame.payload.len();
    if len as u64 > MAX_FRAME_LEN as u64 {
        return Err(Error::FrameTooLarge(len as u32));
    }
    let mut header = [0u8; HEADER_LEN];
    header[0] = frame.kind.to_byte();
    header[1..5].copy_from_slice(&(len as u32).to_be_bytes());
    out.write_all(&header).map_err(Error::Daemon)?;
    out.write_all(&frame.payload).map_err(Error::Daemon)?;
    Ok(())
}

/// Parses one frame out of an in-memory buffer that may hold less than
/// a full frame (e.g. a socket's accumulated-but-undrained read
/// buffer). Returns `Ok(None)` if `buf` doesn't yet hold a complete
/// frame, rather than treating a short buffer as EOF — callers own
/// retrying once more bytes arrive.
pub fn try_parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let kind = FrameType::from_byte(buf[0])?;
    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    let total = HEADER_LEN + len as usize;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some((Frame { kind, payload: buf[HEADER_LEN..total].to_vec() }, total)))
}

/// Reads one frame from `input`. Returns `Ok(None)` on clean EOF at a
/// frame boundary (the socket was closed between frames); any other
/// I/O error, or an EOF mid-header/mid-payload, is propagated.
pub fn read_frame<R: Read>(input: &mut R) -> Result<Option<Frame>> {
    let mut header = [0u8; HEADER_LEN];
    match read_exact_or_eof(input, &mut header)? {
        false => return Ok(None),
        true => {}
    }
    let kind = FrameType::from_byte(header[0])?;
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    input.read_exact(&mut payload).map_err(Error::Daemon)?;
    Ok(Some(Frame { kind, payload }))
}

/// Like `Read::read_exact`, but returns `Ok(false)` if the stream is
/// already at EOF before any byte of `buf` is read, instead of erroring.
fn read_exact_or_eof<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(Error::Daemon(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "frame header/payload truncated",
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Daemon(e)),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_output_frame() {
        let frame = Frame::output(b"hello pane".to_vec());
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded.kind, FrameType::Output);
        assert_eq!(decoded.payload, b"hello pane");
    }

    #[test]
    fn round_trip_resize_frame() {
        let frame = Frame::resize(120, 40);
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded.as_resize(), Some((120, 40)));
    }

    #[test]
    fn oversized_payload_rejected() {
        let huge = vec![0u8; MAX_FRAME_LEN as usize + 1];
        let frame = Frame::output(huge);
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, &frame).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge(_)));
    }

    #[test]
    fn clean_eof_at_boundary_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn truncated_header_is_error() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0]);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn try_parse_frame_waits_for_full_buffer() {
        let frame = Frame::output(b"partial".to_vec());
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).unwrap();

        assert!(try_parse_frame(&buf[..3]).unwrap().is_none());
        let (parsed, consumed) = try_parse_frame(&buf).unwrap().unwrap();
        assert_eq!(parsed.payload, b"partial");
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn multiple_frames_back_to_back() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::output(b"a".to_vec())).unwrap();
        write_frame(&mut buf, &Frame::input(b"bb".to_vec())).unwrap();
        write_frame(&mut buf, &Frame::backlog_end()).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap().kind, FrameType::Output);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap().kind, FrameType::Input);
        let last = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(last.kind, FrameType::BacklogEnd);
        assert!(last.payload.is_empty());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }
}
