// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `mesh message` - send and inspect messages.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::Path;
use uuid::Uuid;

use mesh_core::domain::envelope::Priority;
use mesh_core::domain::inbox::InboxStatus;
use mesh_core::infrastructure::repositories::{InboxRepository, OutboxRepository};

use crate::context;

#[derive(Subcommand)]
pub enum MessageCommand {
    /// Send a message to one member or to `broadcast`
    Send {
        swarm_id: Uuid,
        recipient: String,
        content: String,
        #[arg(long, value_parser = parse_priority, default_value = "normal")]
        priority: Priority,
        #[arg(long)]
        in_reply_to: Option<Uuid>,
    },
    /// List inbox entries
    List {
        #[arg(long)]
        swarm_id: Option<Uuid>,
        /// unread, read, archived, deleted
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Mark an inbox entry read
    Read { message_id: Uuid },
    /// Archive an inbox entry
    Archive { message_id: Uuid },
    /// Mark an inbox entry deleted (purged after the retention window)
    Delete { message_id: Uuid },
    /// Show outbox delivery records
    Sent {
        #[arg(long)]
        swarm_id: Option<Uuid>,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    match raw {
        "low" => Ok(Priority::Low),
        "normal" => Ok(Priority::Normal),
        "high" => Ok(Priority::High),
        other => Err(format!("unknown priority '{other}'")),
    }
}

pub async fn handle_command(command: MessageCommand, config_path: &Path) -> Result<()> {
    let services = context::load(config_path).await?;
    match command {
        MessageCommand::Send {
            swarm_id,
            recipient,
            content,
            priority,
            in_reply_to,
        } => {
            let report = services
                .messaging
                .send(swarm_id, &recipient, content, priority, in_reply_to)
                .await?;
            println!("{} {}", "Sent".green(), report.message_id);
            for agent in &report.delivered {
                println!("  {} {agent}", "delivered".green());
            }
            for (agent, reason) in &report.failed {
                println!("  {} {agent}: {reason}", "failed".red());
            }
        }
        MessageCommand::List {
            swarm_id,
            status,
            limit,
        } => {
            let status = match status.as_deref() {
                Some(raw) => Some(
                    InboxStatus::parse(raw)
                        .with_context(|| format!("unknown status '{raw}'"))?,
                ),
                None => None,
            };
            let entries = InboxRepository::new(services.db.clone())
                .list(swarm_id, status, limit)
                .await?;
            if entries.is_empty() {
                println!("Inbox is empty");
            }
            for entry in entries {
                println!(
                    "{} [{}] {} from {}: {}",
                    entry.message_id,
                    entry.status.as_str(),
                    entry.received_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.sender_id.bold(),
                    preview(&entry.content)
                );
            }
        }
        MessageCommand::Read { message_id } => {
            let changed = InboxRepository::new(services.db.clone())
                .mark_read(message_id)
                .await?;
            println!(
                "{}",
                if changed {
                    "Marked read"
                } else {
                    "No unread entry with that id"
                }
            );
        }
        MessageCommand::Archive { message_id } => {
            let changed = InboxRepository::new(services.db.clone())
                .archive(message_id)
                .await?;
            println!(
                "{}",
                if changed { "Archived" } else { "Nothing to archive" }
            );
        }
        MessageCommand::Delete { message_id } => {
            let changed = InboxRepository::new(services.db.clone())
                .mark_deleted(message_id)
                .await?;
            println!(
                "{}",
                if changed { "Marked deleted" } else { "Nothing to delete" }
            );
        }
        MessageCommand::Sent { swarm_id, limit } => {
            let entries = OutboxRepository::new(services.db.clone())
                .list(swarm_id, limit)
                .await?;
            if entries.is_empty() {
                println!("Outbox is empty");
            }
            for entry in entries {
                let status = match entry.status {
                    mesh_core::domain::inbox::OutboxStatus::Delivered => {
                        entry.status.as_str().green()
                    }
                    mesh_core::domain::inbox::OutboxStatus::Failed => entry.status.as_str().red(),
                    mesh_core::domain::inbox::OutboxStatus::Queued => {
                        entry.status.as_str().yellow()
                    }
                };
                println!(
                    "{} -> {} [{}] attempts={}{}",
                    entry.message_id,
                    entry.recipient,
                    status,
                    entry.attempts,
                    entry
                        .last_error
                        .as_deref()
                        .map(|e| format!(" ({e})"))
                        .unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn preview(raw_envelope: &str) -> String {
    let content = serde_json::from_str::<serde_json::Value>(raw_envelope)
        .ok()
        .and_then(|v| v.get("content").and_then(|c| c.as_str()).map(str::to_string))
        .unwrap_or_else(|| raw_envelope.to_string());
    if content.chars().count() > 80 {
        let truncated: String = content.chars().take(80).collect();
        format!("{truncated}…")
    } else {
        content
    }
}
