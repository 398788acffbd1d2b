// ai
//! 🚦 The write coordinator: the one object a bulk writer actually talks to.
//!
//! 🎬 *[a bulk writer has a batch of documents. it knows where they should go, roughly.]*
//! *["roughly" is not an index name. "roughly" does not survive contact with a cluster.]*
//! *[it hands the batch to the coordinator and waits for something more precise.]*
//!
//! [`IndexWriteCoordinator`] wires the pieces together from one [`AppConfig`]:
//!
//! - 🧭 index names come out of a [`DynamicIndexCache`], so every distinct alias (static or
//!   filled in from event fields) is provisioned once and then served from memory
//! - 🔁 when a `[dedup]` section is present, writes can be parked in a
//!   [`DedupQueryManager`] and a `DedupQueryWorker` polls the cluster in the background
//! - 🛑 one [`CancellationToken`] stops both the worker and any provisioning retry loop
//! - 📦 [`IndexWriteCoordinator::prepare_document`] stamps a [`Hit`] with its index, id and
//!   routing key before the writer serializes it
//!
//! The coordinator never submits documents itself. The writer asks for a name, optionally
//! parks the write, and later drains whatever came back cleared.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app_config::AppConfig;
use crate::backends::ClusterClient;
use crate::common::{Hit, Releasable};
use crate::dedup::DedupQueryManager;
use crate::errors::{Result, SinkError};
use crate::index::{
    AliasExpression, AliasState, Clock, DynamicIndexCache, IsmPolicyStrategy,
    LifecyclePolicyStrategy, NoIsmPolicyStrategy, ResolverFactory, template_strategy_for,
};
use crate::metrics::MetricsSink;
use crate::workers::{DedupQueryWorker, Worker};

/// 🚦 Index names and duplicate suppression for one sink.
#[derive(Debug)]
pub struct IndexWriteCoordinator<W: Releasable> {
    alias: String,
    document_id: Option<String>,
    routing: Option<String>,
    cache: Arc<DynamicIndexCache>,
    dedup: Option<Arc<DedupQueryManager<W>>>,
    cancel: CancellationToken,
    dedup_worker: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl<W: Releasable> IndexWriteCoordinator<W> {
    /// 🏗️ Build everything the config asks for. Reads the template and policy files, and
    /// rejects a malformed alias expression, but does not talk to the cluster yet.
    pub fn from_config(
        config: &AppConfig,
        client: Arc<dyn ClusterClient>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let index_type = config.index.effective_index_type();
        let alias = config.index.effective_alias();
        // 🔤 placeholders are filled per document, the rest can be checked right now
        if !alias.contains("${") {
            AliasExpression::parse(&alias)?;
        }

        let policy_strategy: Arc<dyn LifecyclePolicyStrategy> =
            match (&config.index.ism_policy_file, index_type.builtin_policy()) {
                (Some(path), builtin) => {
                    let strategy = IsmPolicyStrategy::from_file(client.clone(), path)?;
                    Arc::new(match builtin {
                        Some((policy_id, _)) => strategy.with_policy_id(policy_id),
                        None => strategy,
                    })
                }
                (None, Some((policy_id, policy))) => Arc::new(
                    IsmPolicyStrategy::new(client.clone(), policy)?.with_policy_id(policy_id),
                ),
                (None, None) => Arc::new(NoIsmPolicyStrategy::new(client.clone())),
            };
        let factory = ResolverFactory {
            client: client.clone(),
            template: config.index.load_template()?,
            template_strategy: template_strategy_for(config.index.effective_template_type(), client.clone()),
            policy_strategy,
            clock,
            managed: index_type.is_managed(),
        };

        let cancel = CancellationToken::new();
        let cache = Arc::new(DynamicIndexCache::new(
            factory,
            &config.dynamic_index,
            config.index.normalize_index,
            cancel.clone(),
        ));
        let dedup = config
            .dedup
            .as_ref()
            .map(|dedup| {
                DedupQueryManager::new(client.clone(), metrics.clone(), dedup, cancel.clone()).map(Arc::new)
            })
            .transpose()?;

        info!(
            alias = %alias,
            ?index_type,
            dedup_field = dedup.as_ref().map(|d| d.query_field()),
            "🚦 write coordinator ready"
        );
        Ok(Self {
            alias,
            document_id: config.index.effective_document_id(),
            routing: config.index.routing.clone(),
            cache,
            dedup,
            cancel,
            dedup_worker: Mutex::new(None),
        })
    }

    /// 🏷️ The configured alias expression, placeholders and all.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// 📅 Concrete index name for an alias with its `${...}` placeholders already filled.
    /// Provisions the alias on first sight and suspends until that is done.
    pub async fn resolve_index_name(&self, alias: &str) -> Result<String> {
        self.cache.get_index_name(alias).await
    }

    /// 📦 Concrete index name for one document: the configured alias with its
    /// placeholders filled from the document, then resolved.
    pub async fn resolve_index_for(&self, hit: &Hit) -> Result<String> {
        let alias = hit.format_string(&self.alias)?;
        self.resolve_index_name(&alias).await
    }

    /// 📦 Fill in everything the writer needs on the hit: its resolved index, and its id
    /// and routing key when those are configured. Placeholders come from the document, so
    /// a missing field is a configuration error for this document.
    pub async fn prepare_document(&self, hit: &mut Hit) -> Result<()> {
        if let Some(template) = &self.document_id {
            hit.id = Some(hit.format_string(template)?);
        }
        if let Some(template) = &self.routing {
            hit.routing = Some(hit.format_string(template)?);
        }
        hit.index = Some(self.resolve_index_for(hit).await?);
        Ok(())
    }

    /// 🔍 Whether `alias` currently resolves to an alias on the cluster.
    pub async fn is_alias(&self, alias: &str) -> Result<AliasState> {
        Ok(self.cache.resolver(alias).await?.is_alias().await)
    }

    /// 🔁 The dedup field, when duplicate suppression is on.
    pub fn dedup_field(&self) -> Option<&str> {
        self.dedup.as_ref().map(|d| d.query_field())
    }

    /// 🔑 The document's dedup value, when dedup is on and the document has one.
    pub fn dedup_value_of(&self, hit: &Hit) -> Option<String> {
        self.dedup_field().and_then(|field| hit.field_as_string(field))
    }

    /// 🪑 Park a write until the cluster has been asked about `value` in `index`.
    pub async fn add_for_dedup_check(&self, write: W, index: &str, value: &str) -> Result<()> {
        let dedup = self
            .dedup
            .as_ref()
            .ok_or_else(|| SinkError::config("dedup check requested but no [dedup] section is configured"))?;
        dedup.add_entry(write, index, value).await;
        Ok(())
    }

    /// 📤 Writes cleared for submission since the last drain. Suspends while too many
    /// entries are still waiting on a verdict. Always empty when dedup is off.
    pub async fn drain_ready_writes(&self) -> Vec<W> {
        match &self.dedup {
            Some(dedup) => dedup.get_and_clear_ready_entries().await,
            None => Vec::new(),
        }
    }

    /// 🚀 Start the background dedup worker. No-op without dedup, or when already running.
    pub async fn start(&self) {
        let Some(dedup) = &self.dedup else {
            return;
        };
        let mut worker = self.dedup_worker.lock().await;
        if worker.is_none() {
            *worker = Some(DedupQueryWorker::new(dedup.clone(), self.cancel.clone()).start());
        }
    }

    /// 🛑 Stop the worker and any provisioning retry loop, then wait for the worker to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        let handle = self.dedup_worker.lock().await.take();
        if let Some(handle) = handle {
            handle.await.map_err(|e| SinkError::Worker(e.to_string()))??;
        }
        debug!("🏁 write coordinator shut down");
        Ok(())
    }
}
