//! Command-line surface (§6 "CLI"): bare invocation starts a new
//! session; `--attach <uuid-prefix>` reattaches to one the daemon kept
//! alive.

use std::path::PathBuf;

use clap::Parser;

use crate::types::VERSION;

#[derive(Debug, Parser)]
#[command(name = "hexe", version = VERSION, about = "Terminal multiplexer with daemon-backed session persistence")]
pub struct Cli {
    /// Reattach to a previously detached session, matched by UUID prefix.
    #[arg(long, value_name = "UUID_PREFIX")]
    pub attach: Option<String>,

    /// Path to a config file; overrides the default search path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Command to run in the initial pane instead of the user's shell.
    #[arg(long)]
    pub command: Option<String>,

    /// Increase log verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_parses() {
        let cli = Cli::parse_from(["hexe"]);
        assert!(cli.attach.is_none());
    }

    #[test]
    fn attach_flag_parses_prefix() {
        let cli = Cli::parse_from(["hexe", "--attach", "a1b2c3"]);
        assert_eq!(cli.attach.as_deref(), Some("a1b2c3"));
    }
}
