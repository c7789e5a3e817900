// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Mesh CLI
//!
//! The `mesh` binary runs an agent node and drives its swarm operations.
//!
//! ## Commands
//!
//! - `mesh init` - generate identity and write the node config
//! - `mesh serve` - run the node (receive pipeline + wake endpoint)
//! - `mesh swarm create|invite|join|leave|kick|transfer|approve|reject`
//! - `mesh message send|list|read`
//! - `mesh mute agent|swarm` / `mesh unmute agent|swarm`
//! - `mesh state status|export|import|purge`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod context;

use commands::{MessageCommand, MuteCommand, StateCommand, SwarmCommand, UnmuteCommand};

/// AEGIS Mesh - peer-to-peer messaging for autonomous agents
#[derive(Parser)]
#[command(name = "mesh")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the node configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "MESH_CONFIG",
        default_value = "mesh.yaml",
        value_name = "FILE"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "MESH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an identity and write the node configuration
    Init {
        /// Stable agent identifier
        #[arg(long)]
        agent_id: String,
        /// Public HTTPS endpoint of this node
        #[arg(long)]
        endpoint: String,
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Run the node
    Serve,

    /// Swarm membership operations
    Swarm {
        #[command(subcommand)]
        command: SwarmCommand,
    },

    /// Send and inspect messages
    Message {
        #[command(subcommand)]
        command: MessageCommand,
    },

    /// Mute an agent or swarm locally
    Mute {
        #[command(subcommand)]
        command: MuteCommand,
    },

    /// Remove a local mute
    Unmute {
        #[command(subcommand)]
        command: UnmuteCommand,
    },

    /// Node state: status, export, import, purge
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Init {
            agent_id,
            endpoint,
            force,
        } => commands::init::run(&cli.config, &agent_id, &endpoint, force).await,
        Commands::Serve => commands::serve::run(&cli.config).await,
        Commands::Swarm { command } => commands::swarm::handle_command(command, &cli.config).await,
        Commands::Message { command } => {
            commands::message::handle_command(command, &cli.config).await
        }
        Commands::Mute { command } => commands::mute::handle_mute(command, &cli.config).await,
        Commands::Unmute { command } => commands::mute::handle_unmute(command, &cli.config).await,
        Commands::State { command } => commands::state::handle_command(command, &cli.config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
