//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod chat;
pub mod common;
pub mod config;
pub mod sessions;
pub mod tools;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agentforge")]
#[command(version)]
#[command(about = "Assemble agents from declarative tool and session configuration", long_about = None)]
struct Cli {
    /// Config file (JSON, YAML or TOML). Defaults to ~/.agentforge/config.json
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, activate and inspect tool providers
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
    /// Manage persisted sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Chat with an assembled agent (offline echo runtime)
    Chat {
        /// Direct message to process (non-interactive mode)
        #[arg(short, long)]
        message: Option<String>,
        /// Session to activate
        #[arg(long)]
        session: Option<String>,
        #[command(flatten)]
        tools: ToolArgs,
    },
    /// Validate configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

/// Extra tool configuration files, added to those in the config.
#[derive(Args, Clone, Debug, Default)]
pub struct ToolArgs {
    /// Tool configuration file (repeatable)
    #[arg(long = "tool-config", value_name = "PATH")]
    pub tool_config: Vec<PathBuf>,
}

#[derive(Subcommand)]
pub enum ToolsAction {
    /// Activate every provider and list the merged capabilities
    List {
        #[command(flatten)]
        tools: ToolArgs,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Activate every provider and invoke one tool
    Call {
        /// Tool name
        name: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        #[command(flatten)]
        tools: ToolArgs,
    },
}

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List stored sessions
    List {
        /// Sessions directory (overrides config)
        #[arg(long)]
        home: Option<PathBuf>,
    },
    /// Show delegator state and stored sessions
    Info {
        #[arg(long)]
        home: Option<PathBuf>,
    },
    /// Permanently delete a stored session
    Delete {
        /// Session name
        name: String,
        #[arg(long)]
        home: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Check configuration for errors and warnings
    Check,
}

/// Entry point for the CLI - called from main().
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Logging follows the loaded config; a broken config still gets
    // default logging so the error below is reported.
    let logging_cfg = common::load_config(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = agentforge::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Tools { action }) => {
            tools::cmd_tools(cli.config.as_deref(), action).await?;
        }
        Some(Commands::Sessions { action }) => {
            sessions::cmd_sessions(cli.config.as_deref(), action).await?;
        }
        Some(Commands::Chat {
            message,
            session,
            tools,
        }) => {
            chat::cmd_chat(cli.config.as_deref(), message, session, tools).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(cli.config.as_deref(), action).await?;
        }
    }

    Ok(())
}

fn cmd_version() {
    println!("agentforge {}", env!("CARGO_PKG_VERSION"));
}
