//! System clipboard push (OSC 52 "set", §4.2.1 step 3). Best-effort and
//! silent on failure (§7, §9 open question (c)): spawns a short-lived
//! helper process and writes the bytes to its stdin, the way the
//! teacher shells out to a platform clipboard tool rather than linking
//! a clipboard crate.

use std::io::Write as _;
use std::process::{Command, Stdio};

/// Pushes `bytes` to the system clipboard if a usable backend is
/// reachable. Never reports failure to the caller.
pub fn push_best_effort(bytes: &[u8]) {
    let Some(mut cmd) = writer_command() else { return };
    let Ok(mut child) = cmd.stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::null()).spawn() else {
        return;
    };
    if let Some(stdin) = child.stdin.as_mut() {
        let _ = stdin.write_all(bytes);
    }
    drop(child.stdin.take());
    let _ = child.wait();
}

fn writer_command() -> Option<Command> {
    if std::env::var_os("WAYLAND_DISPLAY").is_some() {
        if which::which("wl-copy").is_ok() {
            return Some(Command::new("wl-copy"));
        }
    }
    if std::env::var_os("DISPLAY").is_some() {
        if which::which("xclip").is_ok() {
            let mut cmd = Command::new("xclip");
            cmd.args(["-selection", "clipboard"]);
            return Some(cmd);
        }
        if which::which("xsel").is_ok() {
            let mut cmd = Command::new("xsel");
            cmd.args(["--clipboard", "--input"]);
            return Some(cmd);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_display_env_yields_no_writer() {
        // SAFETY-equivalent: this test only reads process env state it
        // doesn't rely on other tests to have set.
        std::env::remove_var("WAYLAND_DISPLAY");
        std::env::remove_var("DISPLAY");
        assert!(writer_command().is_none());
    }
}
