//! Per-pane output pipeline (§4.2.1): runs on every byte block read
//! from a pane's backend, before the bytes reach the VT. Handles
//! terminal-query autoresponse, OSC interception/passthrough, and
//! clear-screen detection across read-boundary splits.

use std::io::Write as _;

use crate::clipboard;
use crate::vt::{CursorStyle, Vt};

const OSC_MAX: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Idle,
    Esc,
    Csi,
    Dcs,
    DcsEsc,
    Osc,
    OscEsc,
}

/// Per-pane transient parsing state carried across `process` calls so a
/// sequence split across two reads is handled correctly.
pub struct OutputPipeline {
    state: ScanState,
    csi_buf: Vec<u8>,
    dcs_buf: Vec<u8>,
    osc_buf: Vec<u8>,
    /// Last up-to-3 raw bytes of the previous block, for clear-screen
    /// sequences straddling a read boundary.
    tail: Vec<u8>,
    /// Set when an OSC passthrough expects the outer terminal's reply
    /// to be routed back to this pane rather than treated as user input.
    pub osc_expect_response: bool,
}

impl Default for OutputPipeline {
    fn default() -> Self {
        OutputPipeline {
            state: ScanState::Idle,
            csi_buf: Vec::new(),
            dcs_buf: Vec::new(),
            osc_buf: Vec::new(),
            tail: Vec::new(),
            osc_expect_response: false,
        }
    }
}

pub struct ProcessOutcome {
    /// OSC passthrough bytes to write directly to the outer terminal's
    /// stdout, bypassing the differential renderer (title/CWD/clipboard/
    /// palette sequences the cell grid can't represent). Color-query
    /// synthesis replies are NOT here — those go back to `to_backend`.
    pub to_outer: Vec<u8>,
    /// Bytes to write back to the pane's own backend (query autoresponses).
    pub to_backend: Vec<u8>,
    /// True if any clear-screen sequence was observed in this block.
    pub did_clear: bool,
}

impl OutputPipeline {
    /// Processes one block of raw pane output. `vt` supplies cursor
    /// position/style for query autoresponses.
    pub fn process(&mut self, block: &[u8], vt: &Vt) -> ProcessOutcome {
        let mut outcome = ProcessOutcome { to_outer: Vec::new(), to_backend: Vec::new(), did_clear: false };

        self.scan_clear_screen(block, &mut outcome);

        let mut i = 0;
        while i < block.len() {
            let b = block[i];
            match self.state {
                ScanState::Idle => {
                    if b == 0x1b {
                        self.state = ScanState::Esc;
                    }
                    // Plain content bytes are left for the caller's
                    // separate, unmodified `vt.feed()` of the whole
                    // block; this scanner only needs to find the
                    // query/OSC/DCS sequences within it.
                }
                ScanState::Esc => match b {
                    b'[' => {
                        self.csi_buf.clear();
                        self.state = ScanState::Csi;
                    }
                    b']' => {
                        self.osc_buf.clear();
                        self.state = ScanState::Osc;
                    }
                    b'P' => {
                        self.dcs_buf.clear();
                        self.state = ScanState::Dcs;
                    }
                    _ => {
                        self.state = ScanState::Idle;
                    }
                },
                ScanState::Csi => {
                    self.csi_buf.push(b);
                    if b.is_ascii_alphabetic() || b == b'~' {
                        self.handle_csi(vt, &mut outcome);
                        self.state = ScanState::Idle;
                    } else if self.csi_buf.len() > 64 {
                        // malformed: give up and resync on idle (§7 "OSC/ANSI malformed input").
                        self.state = ScanState::Idle;
                    }
                }
                ScanState::Dcs => {
                    if b == 0x1b {
                        self.state = ScanState::DcsEsc;
                    } else {
                        self.dcs_buf.push(b);
                        if self.dcs_buf.len() > 256 {
                            self.state = ScanState::Idle;
                        }
                    }
                }
                ScanState::DcsEsc => {
                    if b == b'\\' {
                        self.handle_dcs(vt, &mut outcome);
                        self.state = ScanState::Idle;
                    } else {
                        self.dcs_buf.push(0x1b);
                        self.dcs_buf.push(b);
                        self.state = ScanState::Dcs;
                    }
                }
                ScanState::Osc => {
                    if b == 0x07 {
                        self.handle_osc(&mut outcome);
                        self.state = ScanState::Idle;
                    } else if b == 0x1b {
                        self.state = ScanState::OscEsc;
                    } else {
                        self.osc_buf.push(b);
                        if self.osc_buf.len() > OSC_MAX {
                            // §7 "OSC overflow (> 64 KiB)": drop, reset, never emit partial output.
                            self.osc_buf.clear();
                            self.state = ScanState::Idle;
                        }
                    }
                }
                ScanState::OscEsc => {
                    if b == b'\\' {
                        self.handle_osc(&mut outcome);
                        self.state = ScanState::Idle;
                    } else {
                        self.osc_buf.push(0x1b);
                        self.osc_buf.push(b);
                        self.state = ScanState::Osc;
                    }
                }
            }
            i += 1;
        }

        let keep = block.len().min(3);
        self.tail = block[block.len() - keep..].to_vec();
        outcome
    }

    fn scan_clear_screen(&mut self, block: &[u8], outcome: &mut ProcessOutcome) {
        let mut combined = Vec::with_capacity(self.tail.len() + block.len());
        combined.extend_from_slice(&self.tail);
        combined.extend_from_slice(block);

        const PATTERNS: &[&[u8]] = &[
            b"\x0c",
            b"\x1b[2J",
            b"\x1b[3J",
            b"\x1b[J",
            b"\x1b[0J",
            b"\x1b[H\x1b[2J",
            b"\x1b[H\x1b[J",
        ];
        for pat in PATTERNS {
            if contains(&combined, pat) {
                outcome.did_clear = true;
                return;
            }
        }
    }

    fn handle_csi(&mut self, vt: &Vt, outcome: &mut ProcessOutcome) {
        let buf = self.csi_buf.clone();
        let final_byte = *buf.last().unwrap();
        let params = &buf[..buf.len() - 1];
        match (params, final_byte) {
            (b"5", b'n') => outcome.to_backend.extend_from_slice(b"\x1b[0n"),
            (b"6", b'n') => {
                let (row, col) = vt.get_cursor();
                outcome.to_backend.extend_from_slice(format!("\x1b[{};{}R", row + 1, col + 1).as_bytes());
            }
            (b"", b'c') => outcome.to_backend.extend_from_slice(b"\x1b[?1;2c"),
            (b">", b'c') => outcome.to_backend.extend_from_slice(b"\x1b[>0;0;0c"),
            _ => {}
        }
    }

    fn handle_dcs(&mut self, vt: &Vt, outcome: &mut ProcessOutcome) {
        // DECRQSS request: "$q<final>" where <final> names the setting queried.
        let buf = self.dcs_buf.clone();
        if buf.len() < 3 || &buf[..2] != b"$q" {
            return;
        }
        let final_byte = buf[buf.len() - 1];
        let reply = match final_byte {
            b'q' => format!("\x1bP1$r{} q\x1b\\", vt.get_cursor_style().decscusr_param()),
            b'm' => "\x1bP1$r0m\x1b\\".to_string(),
            b'r' => {
                let (rows, _) = vt.get_cursor();
                let _ = rows;
                "\x1bP1$r1;24r\x1b\\".to_string()
            }
            _ => "\x1bP0$r\x1b\\".to_string(),
        };
        outcome.to_backend.extend_from_slice(reply.as_bytes());
    }

    fn handle_osc(&mut self, outcome: &mut ProcessOutcome) {
        let payload = self.osc_buf.clone();
        let text = String::from_utf8_lossy(&payload);
        let mut parts = text.splitn(2, ';');
        let code: u32 = match parts.next().and_then(|s| s.parse().ok()) {
            Some(c) => c,
            None => return,
        };
        let rest = parts.next().unwrap_or("");

        let passthrough = matches!(code, 0..=2 | 7 | 52 | 4 | 104 | 10..=19 | 110..=119);
        if !passthrough {
            return;
        }

        let is_query = rest.contains(";?") || rest == "?";
        if is_query && matches!(code, 10..=19 | 110..=119) {
            let synthesized = match code {
                10 => "rgb:ffff/ffff/ffff",
                11 => "rgb:0000/0000/0000",
                12 => "rgb:ffff/ffff/ffff",
                _ => "rgb:0000/0000/0000",
            };
            outcome
                .to_backend
                .extend_from_slice(format!("\x1b]{code};{synthesized}\x07").as_bytes());
            return;
        }

        outcome.to_outer.extend_from_slice(b"\x1b]");
        outcome.to_outer.extend_from_slice(&payload);
        outcome.to_outer.extend_from_slice(b"\x07");

        if is_query {
            self.osc_expect_response = true;
        }

        if code == 52 {
            if let Some((_, b64)) = rest.split_once(';') {
                if let Ok(decoded) = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64) {
                    clipboard::push_best_effort(&decoded);
                }
            }
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len().max(1)).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vt() -> Vt {
        Vt::init(24, 80, 1000)
    }

    #[test]
    fn dsr_5n_is_autoresponded() {
        let mut p = OutputPipeline::default();
        let out = p.process(b"\x1b[5n", &vt());
        assert_eq!(out.to_backend, b"\x1b[0n");
        assert!(out.to_outer.is_empty());
    }

    #[test]
    fn cursor_position_report_uses_vt_cursor() {
        let v = vt();
        v.feed(b"hello\r\nworld");
        let mut p = OutputPipeline::default();
        let out = p.process(b"\x1b[6n", &v);
        assert!(out.to_backend.starts_with(b"\x1b["));
        assert!(out.to_backend.ends_with(b"R"));
    }

    #[test]
    fn clear_screen_sets_did_clear() {
        let mut p = OutputPipeline::default();
        let out = p.process(b"hello\x1b[2Jworld", &vt());
        assert!(out.did_clear);
    }

    #[test]
    fn clear_screen_straddling_two_blocks_sets_did_clear_once() {
        let mut p = OutputPipeline::default();
        let first = p.process(b"abc\x1b[2", &vt());
        assert!(!first.did_clear);
        let second = p.process(b"Jdef", &vt());
        assert!(second.did_clear);
    }

    #[test]
    fn osc_overflow_drops_without_emitting() {
        let mut p = OutputPipeline::default();
        let mut block = b"\x1b]0;".to_vec();
        block.extend(std::iter::repeat(b'x').take(OSC_MAX + 10));
        block.push(0x07);
        let out = p.process(&block, &vt());
        assert!(out.to_outer.is_empty());
    }

    #[test]
    fn osc_title_passes_through() {
        let mut p = OutputPipeline::default();
        let out = p.process(b"\x1b]0;my title\x07", &vt());
        assert_eq!(out.to_outer, b"\x1b]0;my title\x07");
    }

    #[test]
    fn unrecognized_osc_is_swallowed() {
        let mut p = OutputPipeline::default();
        let out = p.process(b"\x1b]9999;whatever\x07", &vt());
        assert!(out.to_outer.is_empty());
    }
}
