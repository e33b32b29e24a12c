//! Configuration (ambient stack): a small serde/TOML-deserializable
//! struct for the handful of core knobs this engine actually reads —
//! named float definitions, scrollback limit, frame pacing, and the
//! last-tab-close policy. Key-binding tables, status-bar formatting,
//! and the rest of the user-facing config surface are external
//! collaborators (§1) and aren't modeled here.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LastTabClosePolicy {
    /// Show an exit-confirm popup (§4.1 step "after lifecycle").
    Confirm,
    /// Set `running = false` immediately.
    Exit,
}

impl Default for LastTabClosePolicy {
    fn default() -> Self {
        LastTabClosePolicy::Confirm
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FloatDef {
    /// Single byte keying the named-float toggle (§4.4).
    pub key: u8,
    pub command: String,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub per_cwd: bool,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default = "default_float_pct")]
    pub pct_w: u16,
    #[serde(default = "default_float_pct")]
    pub pct_h: u16,
}

fn default_float_pct() -> u16 {
    70
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_scrollback")]
    pub scrollback_lines: usize,
    #[serde(default = "default_frame_pacing_ms")]
    pub frame_pacing_ms: u64,
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    #[serde(default)]
    pub last_tab_close: LastTabClosePolicy,
    #[serde(default)]
    pub floats: Vec<FloatDef>,
    #[serde(default)]
    pub daemon_socket: Option<PathBuf>,
}

fn default_scrollback() -> usize {
    10_000
}

fn default_frame_pacing_ms() -> u64 {
    16
}

fn default_idle_poll_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scrollback_lines: default_scrollback(),
            frame_pacing_ms: default_frame_pacing_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            last_tab_close: LastTabClosePolicy::default(),
            floats: Vec::new(),
            daemon_socket: None,
        }
    }
}

impl Config {
    /// Loads `path` if given, else the first of `$XDG_CONFIG_HOME/hexe/hexe.toml`
    /// and `~/.config/hexe/hexe.toml` that exists. Missing files fall back
    /// to defaults silently; malformed ones are a hard `Error::Config`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let Some(candidate) = candidate else {
            info!("no config file found, using defaults");
            return Ok(Config::default());
        };

        match std::fs::read_to_string(&candidate) {
            Ok(content) => {
                let config: Config = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("{}: {e}", candidate.display())))?;
                if config.floats.iter().any(|f| f.pct_w == 0 || f.pct_h == 0) {
                    warn!("float definition with zero-percent geometry in {}", candidate.display());
                }
                info!(path = %candidate.display(), "loaded config");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(Error::Config(format!("{}: {e}", candidate.display()))),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    let dir = dirs::config_dir()?.join("hexe");
    let path = dir.join("hexe.toml");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.scrollback_lines, 10_000);
        assert_eq!(c.frame_pacing_ms, 16);
        assert!(c.floats.is_empty());
    }

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            scrollback_lines = 5000

            [[floats]]
            key = 108
            command = "lazygit"
            exclusive = true
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.scrollback_lines, 5000);
        assert_eq!(config.floats.len(), 1);
        assert_eq!(config.floats[0].key, b'l');
        assert!(config.floats[0].exclusive);
        assert_eq!(config.floats[0].pct_w, 70);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let result = Config::load(Some(Path::new("/nonexistent/hexe-test.toml")));
        assert_eq!(result.unwrap(), Config::default());
    }
}
