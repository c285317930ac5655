use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hive::session::SessionStatus;

#[derive(Debug, Parser)]
#[command(
    name = "hive",
    version,
    about = "Run long multi-agent tasks as persisted, resumable sessions"
)]
pub struct Cli {
    /// Extra config file layered over config/default.toml
    #[arg(long, global = true, env = "HIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG still wins)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Create a session for a task and run it")]
    Run {
        description: String,
        /// Team definition (TOML); defaults to [app].default_team
        #[arg(long)]
        team: Option<PathBuf>,
        #[arg(long)]
        max_rounds: Option<u32>,
    },
    #[command(about = "Resume a session; finished sessions continue in a new session")]
    Resume {
        id: String,
        /// Additional rounds to grant
        #[arg(long)]
        max_rounds: Option<u32>,
    },
    #[command(about = "List sessions, newest first")]
    List {
        #[arg(long, default_value_t = false)]
        compact: bool,
        #[arg(long, value_parser = parse_status)]
        status: Option<SessionStatus>,
    },
    #[command(about = "Show a session with its history and stored error")]
    Details { id: String },
    #[command(about = "Find sessions with a similar description")]
    Find { description: String },
}

fn parse_status(s: &str) -> Result<SessionStatus, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["hive", "run", "write docs", "--max-rounds", "3"]).unwrap();
        match cli.command {
            Commands::Run {
                description,
                max_rounds,
                team,
            } => {
                assert_eq!(description, "write docs");
                assert_eq!(max_rounds, Some(3));
                assert!(team.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_list_status() {
        let cli = Cli::try_parse_from(["hive", "list", "--compact", "--status", "paused"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List {
                compact: true,
                status: Some(SessionStatus::Paused)
            }
        ));
        assert!(Cli::try_parse_from(["hive", "list", "--status", "weird"]).is_err());
    }
}
