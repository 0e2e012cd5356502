//! CLI module — command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod agent;
pub mod common;
pub mod config;
pub mod cron;
pub mod gateway;
pub mod session;

use anyhow::Result;
use clap::{ArgGroup, CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "femtoclaw")]
#[command(version)]
#[command(about = "Personal AI agent runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the agent directly (interactive unless --message is given)
    Agent {
        /// Single message to process (non-interactive mode)
        #[arg(short, long)]
        message: Option<String>,
        /// Session key to use, as channel:chat_id
        #[arg(short, long, default_value = femtoclaw::agent::DIRECT_SESSION_KEY)]
        session: String,
    },
    /// Run the bus, agent loop, console channel and scheduler until Ctrl+C
    Gateway,
    /// Manage scheduled jobs
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },
    /// Inspect stored sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum CronAction {
    /// List scheduled jobs
    List {
        /// Include disabled jobs
        #[arg(long)]
        all: bool,
    },
    /// Add a job
    #[command(group(ArgGroup::new("schedule").required(true).args(["every", "cron", "at"])))]
    Add {
        /// Job name
        #[arg(long)]
        name: String,
        /// Message injected when the job fires
        #[arg(short, long)]
        message: String,
        /// Repeat every N seconds
        #[arg(long)]
        every: Option<u64>,
        /// Five-field cron expression (UTC)
        #[arg(long)]
        cron: Option<String>,
        /// Run once at an RFC 3339 or `YYYY-MM-DDTHH:MM:SS` time
        #[arg(long)]
        at: Option<String>,
        /// Target channel
        #[arg(long, default_value = "cli")]
        channel: String,
        /// Target chat id
        #[arg(long, default_value = "direct")]
        chat_id: String,
    },
    /// Remove a job by id
    Remove {
        /// Job id
        id: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum SessionAction {
    /// List stored session keys
    List,
    /// Print the turns of one session
    Show {
        /// Session key, as channel:chat_id
        key: String,
        /// Only show the last N turns
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete a session
    Delete {
        /// Session key, as channel:chat_id
        key: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Print the effective configuration with secrets redacted
    Show,
    /// Print the configuration file path
    Path,
}

/// Entry point for the CLI — parses args and dispatches to command handlers.
pub async fn run() -> Result<()> {
    // Load config early so logging settings apply; fall back to defaults if
    // the file is missing or unreadable.
    let logging_cfg = femtoclaw::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    femtoclaw::utils::logging::init_logging(&logging_cfg);

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Agent { message, session }) => {
            agent::cmd_agent(message, session).await?;
        }
        Some(Commands::Gateway) => {
            gateway::cmd_gateway().await?;
        }
        Some(Commands::Cron { action }) => {
            cron::cmd_cron(action).await?;
        }
        Some(Commands::Session { action }) => {
            session::cmd_session(action).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_agent_defaults_to_direct_session() {
        let cli = Cli::try_parse_from(["femtoclaw", "agent", "-m", "hi"]).unwrap();
        match cli.command {
            Some(Commands::Agent { message, session }) => {
                assert_eq!(message.as_deref(), Some("hi"));
                assert_eq!(session, "cli:direct");
            }
            _ => panic!("expected agent command"),
        }
    }

    #[test]
    fn test_cron_add_requires_exactly_one_schedule() {
        assert!(Cli::try_parse_from(["femtoclaw", "cron", "add", "--name", "x", "-m", "y"]).is_err());
        assert!(Cli::try_parse_from([
            "femtoclaw", "cron", "add", "--name", "x", "-m", "y", "--every", "60", "--cron",
            "* * * * *",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "femtoclaw", "cron", "add", "--name", "x", "-m", "y", "--every", "60",
        ])
        .is_ok());
    }
}
