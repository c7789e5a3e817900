// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `mesh init` - generate identity and write the node configuration.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;

use mesh_core::domain::node_config::{IdentityConfig, NodeConfig};
use mesh_core::infrastructure::crypto::NodeKeypair;

pub async fn run(config_path: &Path, agent_id: &str, endpoint: &str, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "config file {} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let config = NodeConfig {
        identity: IdentityConfig {
            agent_id: agent_id.to_string(),
            endpoint: endpoint.to_string(),
            keys_dir: "data/identity".into(),
        },
        ..base_config()
    };
    config.validate().context("invalid identity")?;

    let keypair = NodeKeypair::load_or_generate(&config.identity.keys_dir)
        .context("failed to generate keypair")?;

    let raw = serde_yaml::to_string(&config).context("failed to serialize config")?;
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(config_path, raw)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    println!("{} {}", "Initialized node".green(), agent_id.bold());
    println!("  config:     {}", config_path.display());
    println!("  keys:       {}", config.identity.keys_dir.display());
    println!("  public key: {}", keypair.public_key_b64());
    Ok(())
}

fn base_config() -> NodeConfig {
    // Round-trip through YAML picks up every default the schema declares.
    serde_yaml::from_str(
        r#"
identity:
  agent_id: placeholder
  endpoint: https://placeholder.invalid
"#,
    )
    .expect("baseline config is valid")
}
