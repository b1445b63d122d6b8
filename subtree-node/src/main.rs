//! `subtree-node`: process wiring for the block-assembly subtree processor
//! and block validation pipeline (§2). Loads configuration, initializes
//! tracing, spawns the owner tasks, and waits for a shutdown signal.
//! Deliberately has no command subsystem of its own — administrative CLI
//! surfaces are an explicit Non-goal (§1).

mod config;
mod runtime;

use std::path::PathBuf;

use tracing_subscriber::prelude::*;

use config::NodeConfig;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };

    init_tracing(&config);

    tracing::info!("starting subtree-node");
    let node = runtime::build(&config)?;
    tracing::info!(
        double_spend_window_millis = config.assembler.double_spend_window_millis,
        leaf_capacity = config.assembler.initial_merkle_items_per_subtree,
        "subtree processor running",
    );

    // The notification channel announces every subtree the processor
    // seals (§3 "Lifecycle"); a production deployment publishes these on
    // the `subtree` gossip topic (§6). Standalone mode just logs them.
    let mut notifications = node.notifications;
    tokio::spawn(async move {
        while let Some(subtree) = notifications.recv().await {
            tracing::debug!(root = %subtree.root_hash(), len = subtree.len(), "subtree sealed");
        }
    });

    // `node.intake` is the producer side of C2 (§4.2): a live deployment
    // forwards transactions received over the gossip transport onto it
    // (out of scope, §1). Bound to a named variable, not `_`, so the
    // handles (and the sender/channels they own) stay alive for the life
    // of the process rather than dropping as soon as this statement runs.
    let _handles = (node.intake, node.processor, node.validator, node.mined_status);

    wait_for_shutdown().await;
    tracing::info!("shutting down subtree-node");
    Ok(())
}

fn init_tracing(config: &NodeConfig) {
    let filter = config
        .tracing
        .filter
        .clone()
        .map(tracing_subscriber::EnvFilter::new)
        .unwrap_or_else(tracing_subscriber::EnvFilter::from_default_env);

    tracing_subscriber::registry()
        .with(tracing_error::ErrorLayer::default())
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received ctrl-c");
}
