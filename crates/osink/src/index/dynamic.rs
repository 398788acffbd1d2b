// ai
//! 🗂️ The dynamic index cache: one resolver per tenant, provisioned once, forgotten eventually.
//!
//! 🎬 *[a document arrives for `logs-acme`. nobody has written to `logs-acme` before.]*
//! *[nine more arrive for `logs-acme` in the same millisecond. they all want to know.]*
//! *[only one of them is allowed to ask the cluster. the rest wait in line, like adults.]*
//!
//! Aliases built from event fields (`logs-${tenant}`) arrive here already substituted. The
//! first time a distinct alias shows up, a fresh [`IndexResolver`] is built for it and
//! provisioned in a retry loop that only ends on success, a configuration error, or
//! cancellation. Callers for the same alias share that one attempt. Callers for other
//! aliases do not wait on it.
//!
//! 🧠 Knowledge graph:
//! - Cache: `lru::LruCache` with an access-based TTL and an approximate byte budget.
//!   Eviction is harmless: provisioning is idempotent, a miss just re-checks the cluster.
//! - Single flight: a map of per-key `tokio::sync::OnceCell`s, removed once they settle.
//!   The cell holds the settled outcome, failure included, so a caller that queued behind
//!   a rejected run gets the same rejection instead of starting the run over.
//! - Time: `tokio::time::Instant`, so tests can fast-forward to expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use serde::Deserialize;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Result, SinkError};
use crate::index::date_pattern::normalize_alias;
use crate::index::resolver::{IndexResolver, ResolverFactory};

/// ⚖️ Rough cost of one cached resolver beyond its key. Approximate on purpose.
const RESOLVER_WEIGHT_BYTES: usize = 1024;

/// 🔧 `[dynamic_index]` settings.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DynamicIndexConfig {
    /// ⏱️ Idle time before a cached resolver is dropped.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// ⚖️ Approximate memory budget for cached resolvers.
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: usize,
    /// 🔁 Pause between provisioning attempts for a new alias.
    #[serde(default = "default_retry_delay_millis")]
    pub retry_delay_millis: u64,
}

fn default_cache_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_cache_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_retry_delay_millis() -> u64 {
    1000
}

impl Default for DynamicIndexConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            max_cache_bytes: default_max_cache_bytes(),
            retry_delay_millis: default_retry_delay_millis(),
        }
    }
}

#[derive(Debug)]
struct CachedResolver {
    resolver: Arc<IndexResolver>,
    last_access: Instant,
    weight: usize,
}

#[derive(Debug)]
struct ResolverCache {
    entries: LruCache<String, CachedResolver>,
    total_weight: usize,
}

/// 🏁 How one provisioning run ended. Shared with everyone who waited on it.
#[derive(Debug, Clone)]
enum Settled {
    Ready(Arc<IndexResolver>),
    Rejected(String),
    Cancelled,
}

impl Settled {
    fn into_result(self) -> Result<Arc<IndexResolver>> {
        match self {
            Settled::Ready(resolver) => Ok(resolver),
            Settled::Rejected(message) => Err(SinkError::Configuration(message)),
            Settled::Cancelled => Err(SinkError::Cancelled),
        }
    }
}

impl From<SinkError> for Settled {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Configuration(message) => Settled::Rejected(message),
            _ => Settled::Cancelled,
        }
    }
}

type InFlight = Arc<OnceCell<Settled>>;

/// 🗂️ Alias → provisioned resolver, with single-flight provisioning per alias.
#[derive(Debug)]
pub struct DynamicIndexCache {
    factory: ResolverFactory,
    ttl: Duration,
    max_bytes: usize,
    retry_delay: Duration,
    normalize: bool,
    cache: Mutex<ResolverCache>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    cancel: CancellationToken,
}

impl DynamicIndexCache {
    pub fn new(
        factory: ResolverFactory,
        config: &DynamicIndexConfig,
        normalize: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            factory,
            ttl: Duration::from_secs(config.cache_ttl_secs),
            max_bytes: config.max_cache_bytes,
            retry_delay: Duration::from_millis(config.retry_delay_millis),
            normalize,
            cache: Mutex::new(ResolverCache {
                entries: LruCache::unbounded(),
                total_weight: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    /// 📅 Concrete index name for an alias whose field placeholders are already filled in.
    /// Suspends until the alias is provisioned.
    pub async fn get_index_name(&self, alias: &str) -> Result<String> {
        Ok(self.resolver(alias).await?.resolve_index_name())
    }

    /// 🧭 The provisioned resolver for `alias`, building and provisioning it on first sight.
    pub async fn resolver(&self, alias: &str) -> Result<Arc<IndexResolver>> {
        let key = if self.normalize {
            normalize_alias(alias)
        } else {
            alias.to_string()
        };

        if let Some(resolver) = self.lookup(&key).await {
            return Ok(resolver);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            // 🔍 look again under the lock: a run may have settled since the first miss
            if let Some(resolver) = self.lookup(&key).await {
                return Ok(resolver);
            }
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let outcome = cell
            .get_or_init(|| async {
                self.provision(&key).await.map_or_else(Settled::from, Settled::Ready)
            })
            .await
            .clone()
            .into_result();

        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            in_flight.remove(&key);
        }
        outcome
    }

    /// 🔢 Number of cached resolvers, expired ones included until somebody trips over them.
    pub async fn len(&self) -> usize {
        self.cache.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn lookup(&self, key: &str) -> Option<Arc<IndexResolver>> {
        let mut cache = self.cache.lock().await;
        let now = Instant::now();
        let expired = cache
            .entries
            .peek(key)
            .is_some_and(|entry| now.duration_since(entry.last_access) >= self.ttl);
        if expired {
            if let Some(stale) = cache.entries.pop(key) {
                cache.total_weight = cache.total_weight.saturating_sub(stale.weight);
            }
            debug!(alias = key, "⏱️ cached resolver expired");
            return None;
        }
        let entry = cache.entries.get_mut(key)?;
        entry.last_access = now;
        Some(entry.resolver.clone())
    }

    async fn insert(&self, key: &str, resolver: Arc<IndexResolver>) {
        let mut cache = self.cache.lock().await;
        let now = Instant::now();
        let weight = key.len() + RESOLVER_WEIGHT_BYTES;

        // 🧹 least recently used sits at the tail; expired entries are all back there
        while cache
            .entries
            .peek_lru()
            .is_some_and(|(_, entry)| now.duration_since(entry.last_access) >= self.ttl)
        {
            if let Some((_, stale)) = cache.entries.pop_lru() {
                cache.total_weight = cache.total_weight.saturating_sub(stale.weight);
            }
        }
        while cache.total_weight + weight > self.max_bytes {
            let Some((evicted, stale)) = cache.entries.pop_lru() else {
                break;
            };
            cache.total_weight = cache.total_weight.saturating_sub(stale.weight);
            debug!(alias = %evicted, "⚖️ evicted resolver to stay under the cache budget");
        }

        let previous = cache.entries.put(
            key.to_string(),
            CachedResolver {
                resolver,
                last_access: now,
                weight,
            },
        );
        if let Some(previous) = previous {
            cache.total_weight = cache.total_weight.saturating_sub(previous.weight);
        }
        cache.total_weight += weight;
    }

    /// 🔁 Build the resolver and provision until it works. Config errors end the loop
    /// immediately, everything else waits `retry_delay` and tries again. The only errors
    /// that leave here are configuration and cancellation.
    async fn provision(&self, key: &str) -> Result<Arc<IndexResolver>> {
        let resolver = Arc::new(self.factory.resolver_for(key)?);
        let mut attempts: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(SinkError::Cancelled);
            }
            match resolver.ensure_provisioned().await {
                Ok(()) => break,
                Err(e) if e.is_fatal_configuration() => return Err(e),
                Err(e) => {
                    attempts += 1;
                    warn!(alias = key, attempts, error = %e, "🔁 provisioning failed, retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(SinkError::Cancelled),
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
        debug!(alias = key, attempts, "✅ alias provisioned");
        self.insert(key, resolver.clone()).await;
        Ok(resolver)
    }
}
