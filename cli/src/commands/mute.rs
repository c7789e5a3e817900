// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `mesh mute` / `mesh unmute` - local mute sets.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::Path;
use uuid::Uuid;

use crate::context;

#[derive(Subcommand)]
pub enum MuteCommand {
    /// Mute every message from an agent
    Agent {
        agent_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Mute every message in a swarm
    Swarm {
        swarm_id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UnmuteCommand {
    Agent { agent_id: String },
    Swarm { swarm_id: Uuid },
}

pub async fn handle_mute(command: MuteCommand, config_path: &Path) -> Result<()> {
    let services = context::load(config_path).await?;
    match command {
        MuteCommand::Agent { agent_id, reason } => {
            services
                .membership
                .mute_agent(&agent_id, reason.as_deref())
                .await?;
            println!("{} {}", "Muted agent".green(), agent_id);
        }
        MuteCommand::Swarm { swarm_id, reason } => {
            services
                .membership
                .mute_swarm(swarm_id, reason.as_deref())
                .await?;
            println!("{} {}", "Muted swarm".green(), swarm_id);
        }
    }
    Ok(())
}

pub async fn handle_unmute(command: UnmuteCommand, config_path: &Path) -> Result<()> {
    let services = context::load(config_path).await?;
    match command {
        UnmuteCommand::Agent { agent_id } => {
            let removed = services.membership.unmute_agent(&agent_id).await?;
            println!(
                "{}",
                if removed {
                    format!("Unmuted agent {agent_id}")
                } else {
                    format!("Agent {agent_id} was not muted")
                }
            );
        }
        UnmuteCommand::Swarm { swarm_id } => {
            let removed = services.membership.unmute_swarm(swarm_id).await?;
            println!(
                "{}",
                if removed {
                    format!("Unmuted swarm {swarm_id}")
                } else {
                    format!("Swarm {swarm_id} was not muted")
                }
            );
        }
    }
    Ok(())
}
