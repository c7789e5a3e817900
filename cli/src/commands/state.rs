// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `mesh state` - status, export, import, purge.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use mesh_core::infrastructure::export::{export_state, import_state};
use mesh_core::infrastructure::repositories::{
    InboxRepository, MembershipRepository, MuteRepository, SdkSessionRepository,
};

use crate::context;

#[derive(Subcommand)]
pub enum StateCommand {
    /// Show node identity and store summary
    Status,
    /// Export all state to a JSON document
    Export { path: PathBuf },
    /// Import state from a JSON document
    Import {
        path: PathBuf,
        /// Merge into existing state instead of replacing it
        #[arg(long)]
        merge: bool,
    },
    /// Drop deleted inbox rows past retention and stale sessions
    Purge {
        #[arg(long, default_value = "24")]
        retention_hours: i64,
        #[arg(long, default_value = "60")]
        session_idle_minutes: i64,
    },
}

pub async fn handle_command(command: StateCommand, config_path: &Path) -> Result<()> {
    let services = context::load(config_path).await?;
    match command {
        StateCommand::Status => {
            let swarms = MembershipRepository::new(services.db.clone())
                .list_swarms()
                .await?;
            let unread = InboxRepository::new(services.db.clone()).count_unread().await?;
            let mutes = MuteRepository::new(services.db.clone()).list().await?;
            println!("{}", services.config.identity.agent_id.bold());
            println!("  endpoint:   {}", services.config.identity.endpoint);
            println!("  public key: {}", services.keypair.public_key_b64());
            println!("  swarms:     {}", swarms.len());
            for swarm in &swarms {
                println!(
                    "    {} {} ({} members)",
                    swarm.swarm_id,
                    swarm.name,
                    swarm.members.len()
                );
            }
            println!("  unread:     {unread}");
            println!("  mutes:      {}", mutes.len());
        }
        StateCommand::Export { path } => {
            let state = export_state(&services.db, &services.config.identity.agent_id).await?;
            let raw = serde_json::to_string_pretty(&state)?;
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&path, raw)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{} {} swarms, {} inbox entries -> {}",
                "Exported".green(),
                state.swarms.len(),
                state.inbox.len(),
                path.display()
            );
        }
        StateCommand::Import { path, merge } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let document: serde_json::Value = serde_json::from_str(&raw)?;
            let stats = import_state(&services.db, &document, merge).await?;
            println!(
                "{} {} swarms, {} mutes, {} keys, {} inbox, {} outbox ({})",
                "Imported".green(),
                stats.swarms,
                stats.mutes,
                stats.public_keys,
                stats.inbox,
                stats.outbox,
                if merge { "merged" } else { "replaced" }
            );
        }
        StateCommand::Purge {
            retention_hours,
            session_idle_minutes,
        } => {
            let purged = InboxRepository::new(services.db.clone())
                .purge_deleted(retention_hours)
                .await?;
            let expired = SdkSessionRepository::new(services.db.clone())
                .expire(session_idle_minutes)
                .await?;
            println!("Purged {purged} inbox rows, expired {expired} sessions");
        }
    }
    Ok(())
}
