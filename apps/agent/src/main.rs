//! Stratus client agent.
//!
//! Loads the agent configuration, restores the node from its state
//! directory and serves dynamic metadata updates until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use stratus_client::{ClientConfig, ControlPlane, NodeAgent, PropagateError};
use stratus_core::{Node, NodeStatus};

/// Stratus client agent.
#[derive(Parser, Debug)]
#[command(name = "stratus-agent", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "STRATUS_CONFIG")]
    config: Option<PathBuf>,

    /// Override `state_dir` from the configuration.
    #[arg(long, env = "STRATUS_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Override `node.name` from the configuration.
    #[arg(long)]
    node_name: Option<String>,
}

/// Control plane stand-in that logs every registration.
struct LoggingControlPlane;

#[async_trait]
impl ControlPlane for LoggingControlPlane {
    async fn update_node(&self, node: Arc<Node>) -> Result<(), PropagateError> {
        tracing::info!(
            node_id = %node.id,
            modify_index = node.modify_index,
            status = %node.status,
            meta = ?node.meta,
            "node registered with control plane"
        );
        Ok(())
    }
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(dir) = &args.state_dir {
        config.state_dir.clone_from(dir);
    }
    if let Some(name) = &args.node_name {
        config.node.name.clone_from(name);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    stratus_log::init_with(config.log.clone()).context("initializing logging")?;

    let agent = NodeAgent::start(&config, config.auth.resolver(), Arc::new(LoggingControlPlane))
        .await
        .context("starting node agent")?;
    agent.set_status(NodeStatus::Ready).await;
    tracing::info!(
        state_dir = %config.state_dir.display(),
        auth_enabled = config.auth.enabled,
        "agent ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    agent.set_status(NodeStatus::Down).await;
    agent.shutdown().await;
    Ok(())
}
