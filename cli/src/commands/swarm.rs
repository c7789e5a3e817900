// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `mesh swarm` - membership operations.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::Path;
use uuid::Uuid;

use mesh_core::application::membership::JoinOutcome;
use mesh_core::domain::swarm::{SwarmMembership, SwarmSettings};

use crate::context;

#[derive(Subcommand)]
pub enum SwarmCommand {
    /// Create a new swarm with this node as master
    Create {
        name: String,
        #[arg(long)]
        allow_member_invite: bool,
        #[arg(long)]
        require_approval: bool,
    },
    /// Issue an invite token
    Invite {
        swarm_id: Uuid,
        /// Token lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,
        /// Number of joins the token admits
        #[arg(long)]
        max_uses: Option<u32>,
    },
    /// Join a swarm with an invite URL
    Join { invite_url: String },
    /// Leave a swarm (a leaving master dissolves it)
    Leave { swarm_id: Uuid },
    /// Remove a member (master only)
    Kick {
        swarm_id: Uuid,
        agent_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Offer the master role to a member (master only)
    Transfer { swarm_id: Uuid, agent_id: String },
    /// Accept or decline a pending master transfer offer
    RespondTransfer {
        swarm_id: Uuid,
        #[arg(long)]
        decline: bool,
    },
    /// Complete a transfer after the target accepted (master only)
    CompleteTransfer { swarm_id: Uuid, agent_id: String },
    /// Approve a pending join (master only)
    Approve { swarm_id: Uuid, agent_id: String },
    /// Reject a pending join (master only)
    Reject { swarm_id: Uuid, agent_id: String },
    /// List swarms this node belongs to
    List,
}

pub async fn handle_command(command: SwarmCommand, config_path: &Path) -> Result<()> {
    let services = context::load(config_path).await?;
    match command {
        SwarmCommand::Create {
            name,
            allow_member_invite,
            require_approval,
        } => {
            let swarm = services
                .membership
                .create_swarm(
                    &name,
                    SwarmSettings {
                        allow_member_invite,
                        require_approval,
                    },
                )
                .await?;
            println!("{} {}", "Created swarm".green(), swarm.swarm_id);
            print_swarm(&swarm);
        }
        SwarmCommand::Invite {
            swarm_id,
            expires_in,
            max_uses,
        } => {
            let invite = services
                .membership
                .generate_invite(
                    swarm_id,
                    expires_in.map(chrono::Duration::seconds),
                    max_uses,
                )
                .await?;
            println!("{}", "Invite issued".green());
            println!("  url:  {}", invite.url.bold());
            println!("  hash: {}", invite.token_hash);
        }
        SwarmCommand::Join { invite_url } => {
            match services.membership.join_remote(&invite_url).await? {
                JoinOutcome::Accepted(swarm) | JoinOutcome::AlreadyMember(swarm) => {
                    println!("{} {}", "Joined swarm".green(), swarm.swarm_id);
                    print_swarm(&swarm);
                }
                JoinOutcome::Pending { swarm_id } => {
                    println!(
                        "{} {} (requires master approval)",
                        "Join pending for".yellow(),
                        swarm_id
                    );
                }
            }
        }
        SwarmCommand::Leave { swarm_id } => {
            services.membership.leave(swarm_id).await?;
            println!("{} {}", "Left swarm".green(), swarm_id);
        }
        SwarmCommand::Kick {
            swarm_id,
            agent_id,
            reason,
        } => {
            let swarm = services
                .membership
                .kick(swarm_id, &agent_id, reason.as_deref())
                .await?;
            println!("{} {}", "Kicked".green(), agent_id);
            print_swarm(&swarm);
        }
        SwarmCommand::Transfer { swarm_id, agent_id } => {
            services
                .membership
                .initiate_transfer(swarm_id, &agent_id)
                .await?;
            println!("Transfer offered to {agent_id}; waiting for acceptance");
        }
        SwarmCommand::RespondTransfer { swarm_id, decline } => {
            services.membership.respond_transfer(swarm_id, !decline).await?;
            println!(
                "Transfer {}",
                if decline { "declined" } else { "accepted" }
            );
        }
        SwarmCommand::CompleteTransfer { swarm_id, agent_id } => {
            let swarm = services
                .membership
                .complete_transfer(swarm_id, &agent_id)
                .await?;
            println!("{} {}", "Master is now".green(), swarm.master.bold());
        }
        SwarmCommand::Approve { swarm_id, agent_id } => {
            let swarm = services.membership.approve_join(swarm_id, &agent_id).await?;
            println!("{} {}", "Approved".green(), agent_id);
            print_swarm(&swarm);
        }
        SwarmCommand::Reject { swarm_id, agent_id } => {
            let removed = services.membership.reject_join(swarm_id, &agent_id).await?;
            if removed {
                println!("Rejected pending join from {agent_id}");
            } else {
                println!("No pending join from {agent_id}");
            }
        }
        SwarmCommand::List => {
            let swarms = mesh_core::infrastructure::repositories::MembershipRepository::new(
                services.db.clone(),
            )
            .list_swarms()
            .await
            .context("failed to list swarms")?;
            if swarms.is_empty() {
                println!("No swarms");
            }
            for swarm in swarms {
                print_swarm(&swarm);
            }
        }
    }
    Ok(())
}

fn print_swarm(swarm: &SwarmMembership) {
    println!(
        "{} {} ({} members, master {})",
        swarm.swarm_id,
        swarm.name.bold(),
        swarm.members.len(),
        swarm.master
    );
    for member in &swarm.members {
        let marker = if member.agent_id == swarm.master {
            "*"
        } else {
            " "
        };
        println!("  {marker} {} {}", member.agent_id, member.endpoint.dimmed());
    }
}
