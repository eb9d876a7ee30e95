//! # kbwire CLI Module
//!
//! ## Available Commands
//!
//! - `check` - Show the type of elements
//! - `resolve` - Resolve system identifiers to addresses
//! - `content` - Read or write link content
//! - `delete` - Delete elements
//! - `watch` - Print event notifications until interrupted
//! - `members` - Mirror a set and optionally follow it

mod commands;

use crate::config::ClientConfig;
use clap::{Parser, Subcommand};
use kbwire_core::KbError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// kbwire - client for graph knowledge stores
#[derive(Parser, Debug)]
#[command(name = "kbwire")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Store endpoint (host:port); overrides config file and environment
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Per-call timeout in milliseconds
    #[arg(short, long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show element types
    Check {
        /// Element addresses
        #[arg(required = true)]
        addrs: Vec<u64>,
    },

    /// Resolve system identifiers
    Resolve {
        /// Identifiers to look up
        #[arg(required = true)]
        idtfs: Vec<String>,

        /// Create missing identifiers as constant nodes
        #[arg(long)]
        create: bool,
    },

    /// Read or write link content
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },

    /// Delete elements
    Delete {
        /// Element addresses
        #[arg(required = true)]
        addrs: Vec<u64>,
    },

    /// Print event notifications until Ctrl-C
    Watch {
        /// Element to watch
        #[arg(short, long)]
        addr: u64,

        /// Event types (add_outgoing_edge, remove_outgoing_edge, ...)
        #[arg(short = 'E', long = "event", default_value = "add_outgoing_edge")]
        events: Vec<String>,
    },

    /// List the members of a set
    Members {
        /// Host element of the set
        #[arg(short = 'H', long)]
        host: u64,

        /// Only admit members whose type contains this mask
        #[arg(short, long)]
        filter: Option<u32>,

        /// Keep printing changes until Ctrl-C
        #[arg(long)]
        follow: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ContentAction {
    /// Print the content of links
    Get {
        #[arg(required = true)]
        addrs: Vec<u64>,
    },
    /// Replace the content of a link with a string
    Set { addr: u64, value: String },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Assemble configuration: file (or defaults), then environment, then flags.
pub fn build_config(cli: &Cli) -> Result<ClientConfig, KbError> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    config.apply_env()?;
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.call_timeout_ms = timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), KbError> {
    let config = build_config(&cli)?;
    let output = Output {
        json: cli.json_mode,
        quiet: cli.quiet,
    };
    let client = connect(config, output).await?;

    let result = match cli.command {
        Commands::Check { addrs } => cmd_check(&client, output, &addrs).await,
        Commands::Resolve { idtfs, create } => cmd_resolve(&client, output, idtfs, create).await,
        Commands::Content { action } => match action {
            ContentAction::Get { addrs } => cmd_content_get(&client, output, &addrs).await,
            ContentAction::Set { addr, value } => {
                cmd_content_set(&client, output, addr, value).await
            }
        },
        Commands::Delete { addrs } => cmd_delete(&client, output, &addrs).await,
        Commands::Watch { addr, events } => cmd_watch(&client, output, addr, &events).await,
        Commands::Members {
            host,
            filter,
            follow,
        } => cmd_members(&client, output, host, filter, follow).await,
    };

    client.close().await;
    result
}
