//! 🚀 osink: the write-path brain of a search-cluster sink.
//!
//! Turns alias expressions into concrete index names (provisioning templates, lifecycle
//! policies and initial indices on the way) and keeps duplicate documents from being
//! written twice. The bulk writer itself lives elsewhere. This crate tells it where to
//! write, and whether to bother.
//!
//! 🦆 Start at [`IndexWriteCoordinator`]. Everything else is something it owns.

pub mod app_config;
pub mod backends;
pub mod cluster_settings;
pub mod common;
pub mod coordinator;
pub mod dedup;
pub mod errors;
pub mod index;
pub mod metrics;
mod workers;

use std::sync::Arc;

use anyhow::{Context, Result};

pub use app_config::{AppConfig, load_config};
pub use backends::{ClusterClient, ClusterConfig, HttpClusterClient};
pub use common::{Acknowledgement, Hit, Releasable};
pub use coordinator::IndexWriteCoordinator;
pub use dedup::{DedupConfig, DedupQueryManager};
pub use errors::{ClusterError, SinkError};
pub use index::{AliasState, Clock, IndexType, SystemClock};
pub use metrics::{InMemoryMetrics, MetricsSink, TracingMetrics};

/// 🔌 A coordinator talking HTTP to the configured cluster, on the system clock.
pub fn connect(config: &AppConfig) -> Result<IndexWriteCoordinator<Hit>> {
    let client = HttpClusterClient::new(config.cluster.clone())
        .context("💀 Could not build the cluster client. Check [cluster] in your config.")?;
    IndexWriteCoordinator::from_config(
        config,
        Arc::new(client),
        Arc::new(TracingMetrics),
        Arc::new(SystemClock),
    )
    .context("💀 The configuration was read, but it does not describe a sink we can build.")
}

/// 📅 Provision `alias` (or the configured one) and return today's concrete index name.
pub async fn resolve(config: &AppConfig, alias: Option<&str>) -> Result<String> {
    let coordinator = connect(config)?;
    let alias = alias.unwrap_or(coordinator.alias()).to_string();
    coordinator
        .resolve_index_name(&alias)
        .await
        .with_context(|| format!("💀 Failed to resolve and provision '{alias}'"))
}

/// 🔍 Provision `alias` (or the configured one) and report whether it is a cluster alias.
pub async fn check(config: &AppConfig, alias: Option<&str>) -> Result<(String, AliasState)> {
    let coordinator = connect(config)?;
    let alias = alias.unwrap_or(coordinator.alias()).to_string();
    let state = coordinator
        .is_alias(&alias)
        .await
        .with_context(|| format!("💀 Failed to check '{alias}'"))?;
    let name = coordinator.resolve_index_name(&alias).await?;
    Ok((name, state))
}
