//! Operator commands

pub mod checks;
pub mod logs;
pub mod stats;
pub mod users;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::orchestrator::{Orchestrator, Storage};

#[derive(Parser)]
#[command(name = "upwatch", version, about = "Uptime checks with SMS alerts")]
pub struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/upwatch/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the monitoring engine until Ctrl-C
    Run,

    /// Inspect and manage checks
    Checks {
        #[command(subcommand)]
        command: checks::CheckCommands,
    },

    /// Inspect users
    Users {
        #[command(subcommand)]
        command: users::UserCommands,
    },

    /// Inspect audit logs
    Logs {
        #[command(subcommand)]
        command: logs::LogCommands,
    },

    /// Record counts
    Stats,

    /// Configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
}

pub async fn run(config: Config, command: Commands) -> Result<()> {
    match command {
        Commands::Run => Orchestrator::start(config).await,
        Commands::Config { command: ConfigCommands::Show } => {
            print!("{config}");
            Ok(())
        }
        Commands::Checks { command } => checks::run(&config, &Storage::open(&config).await?, command).await,
        Commands::Users { command } => users::run(&Storage::open(&config).await?, command).await,
        Commands::Logs { command } => logs::run(&Storage::open(&config).await?, command).await,
        Commands::Stats => stats::run(&Storage::open(&config).await?).await,
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max <= 3 {
        s.chars().take(max).collect()
    } else {
        format!("{}...", s.chars().take(max - 3).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from(["upwatch", "--config", "/tmp/x.toml", "checks", "list", "--state", "up"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
        assert!(matches!(
            cli.command,
            Commands::Checks { command: checks::CheckCommands::List(ref args) } if args.state.as_deref() == Some("up")
        ));

        let cli = Cli::try_parse_from(["upwatch", "config", "show"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { command: ConfigCommands::Show }));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["upwatch", "stats", "--config", "a.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["upwatch", "explode"]).is_err());
    }

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hello", 2), "he");
    }
}
