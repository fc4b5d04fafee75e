//! rigger
//!
//! Provisions worker agents on remote hosts over SSH, or on the local machine

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use rigger_core::Operation;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod factory;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "rigger")]
#[command(about = "Remote provisioning of worker agents", long_about = None)]
struct Cli {
    /// Configuration file (defaults to rigger.toml, then system and user paths)
    #[arg(long, global = true, env = "RIGGER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level; RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct AgentSelection {
    /// Agent to operate on (repeatable); all configured agents if omitted
    #[arg(long = "agent")]
    agents: Vec<String>,
}

#[derive(clap::Args)]
struct AgentCommand {
    /// Configured agent whose target runs the command
    agent: String,
    /// Command line
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install agents and create their daemons
    Create(AgentSelection),
    /// Configure agent daemons
    Configure(AgentSelection),
    /// Start agent daemons
    Start(AgentSelection),
    /// Stop agent daemons
    Stop(AgentSelection),
    /// Delete agent daemons
    Delete(AgentSelection),
    /// Restart agent daemons
    Restart(AgentSelection),
    /// Run a command on an agent's target
    Run(AgentCommand),
    /// Run a command under sudo on an agent's target
    Sudo(AgentCommand),
    /// Check an agent's target is reachable
    Ping {
        agent: String,
    },
    /// Print the operating system distribution of an agent's target
    Distro {
        agent: String,
    },
    /// Copy a local file to an agent's target
    Put {
        agent: String,
        src: PathBuf,
        /// Destination path; a fresh temp directory if omitted
        dst: Option<String>,
        /// Write the destination as root
        #[arg(long)]
        sudo: bool,
    },
    /// Copy a file from an agent's target
    Get {
        agent: String,
        src: String,
        /// Local destination; a fresh temp directory if omitted
        dst: Option<PathBuf>,
    },
    /// Write a JSON object as a sourceable environment file and print its path
    EnvFile {
        /// JSON object, e.g. '{"KEY": "value"}'
        json: String,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let (config, config_path) = Config::discover(cli.config.as_deref())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_tracing(&level, cli.json);

    match &config_path {
        Some(path) => tracing::debug!(path = %path.display(), "loaded configuration"),
        None => tracing::warn!("no config file found, using defaults"),
    }

    let result = match cli.command {
        Commands::Create(sel) => commands::lifecycle(&config, Operation::Create, sel.agents).await,
        Commands::Configure(sel) => {
            commands::lifecycle(&config, Operation::Configure, sel.agents).await
        }
        Commands::Start(sel) => commands::lifecycle(&config, Operation::Start, sel.agents).await,
        Commands::Stop(sel) => commands::lifecycle(&config, Operation::Stop, sel.agents).await,
        Commands::Delete(sel) => commands::lifecycle(&config, Operation::Delete, sel.agents).await,
        Commands::Restart(sel) => {
            commands::lifecycle(&config, Operation::Restart, sel.agents).await
        }
        Commands::Run(cmd) => commands::run(&config, &cmd.agent, &cmd.command.join(" "), false).await,
        Commands::Sudo(cmd) => commands::run(&config, &cmd.agent, &cmd.command.join(" "), true).await,
        Commands::Ping { agent } => commands::ping(&config, &agent).await,
        Commands::Distro { agent } => commands::distro(&config, &agent).await,
        Commands::Put {
            agent,
            src,
            dst,
            sudo,
        } => commands::put(&config, &agent, &src, dst.as_deref(), sudo).await,
        Commands::Get { agent, src, dst } => {
            commands::get(&config, &agent, &src, dst.as_deref()).await
        }
        Commands::EnvFile { json } => commands::env_file(&json),
    };

    rigger_exec::registry::close_all().await;
    result
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fan_out_selection() {
        let cli = Cli::parse_from([
            "rigger", "--json", "start", "--agent", "a", "--agent", "b",
        ]);

        assert!(cli.json);
        match cli.command {
            Commands::Start(sel) => assert_eq!(sel.agents, vec!["a", "b"]),
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn test_parse_run_keeps_command_flags() {
        let cli = Cli::parse_from(["rigger", "run", "worker-1", "ls", "-la", "/tmp"]);

        match cli.command {
            Commands::Run(cmd) => {
                assert_eq!(cmd.agent, "worker-1");
                assert_eq!(cmd.command.join(" "), "ls -la /tmp");
            }
            _ => panic!("expected run"),
        }
    }
}
