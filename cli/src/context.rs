// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service wiring shared by every command.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use mesh_core::application::membership::MembershipService;
use mesh_core::application::messaging::MessagingService;
use mesh_core::application::notifications::NotificationService;
use mesh_core::domain::node_config::NodeConfig;
use mesh_core::infrastructure::crypto::NodeKeypair;
use mesh_core::infrastructure::db::Database;
use mesh_core::infrastructure::transport::Transport;

/// Everything a command needs, constructed once from the config file.
pub struct NodeServices {
    pub config: NodeConfig,
    pub db: Database,
    pub keypair: NodeKeypair,
    pub transport: Transport,
    pub membership: Arc<MembershipService>,
    pub messaging: MessagingService,
}

pub async fn load(config_path: &Path) -> Result<NodeServices> {
    let config = NodeConfig::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let keypair = NodeKeypair::load_or_generate(&config.identity.keys_dir)
        .context("failed to load node keypair")?;
    let db = Database::connect(&config.db_path)
        .await
        .context("failed to open node database")?;
    let transport =
        Transport::new(&config.identity.agent_id).context("failed to build transport")?;

    let notifications = Arc::new(NotificationService::new(
        db.clone(),
        keypair.clone(),
        &config.identity.agent_id,
        &config.identity.endpoint,
        transport.clone(),
    ));
    let membership = Arc::new(MembershipService::new(
        db.clone(),
        keypair.clone(),
        &config.identity.agent_id,
        &config.identity.endpoint,
        notifications.clone(),
        transport.clone(),
    ));
    let messaging = MessagingService::new(
        db.clone(),
        keypair.clone(),
        &config.identity.agent_id,
        &config.identity.endpoint,
        transport.clone(),
    );

    Ok(NodeServices {
        config,
        db,
        keypair,
        transport,
        membership,
        messaging,
    })
}
