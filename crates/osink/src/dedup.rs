// ai
//! 🔁 Dedup: "have we seen this document before?" asked in bulk, every twenty seconds.
//!
//! 🎬 COLD OPEN. INT. WAITING ROOM, CONTINUOUS
//!
//! Writes sit in chairs, grouped by the index they want to go to and the value of their
//! dedup field. Every so often a nurse walks in with a clipboard (a multi-search) and reads
//! out the values the cluster already has. Those writes are sent home with a note that says
//! "duplicate". Writes that have waited long enough without being called are sent on to
//! the bulk stage. Nobody is ever sent both ways. Nobody is ever sent twice.
//!
//! 🧠 Knowledge graph:
//! - `waiting`: index → dedup value → entries. Guarded by its own lock.
//! - `ready`: writes cleared to ingest. Guarded by a second lock. The two locks are never
//!   held at the same time, so draining never stalls `add_entry` and vice versa.
//! - `in_flight`: number of waiting entries. `get_and_clear_ready_entries` holds the
//!   caller while it is over the limit, which keeps the next query round from ballooning.
//! - A round drops matches first and promotes timeouts second, so an entry that both
//!   matched and ran out of grace is dropped, never promoted.
//! - An index whose sub-query failed keeps all its entries waiting for the next round.
//!
//! 🦆 The duck was added twice. The second duck was released as a duplicate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backends::ClusterClient;
use crate::common::Releasable;
use crate::errors::{Result, SinkError};
use crate::metrics::MetricsSink;

mod query;

use query::{SubQueryOutcome, parse_msearch, plan_queries, render_msearch};

pub const DOCUMENTS_ADDED: &str = "dedupDocumentsAdded";
pub const DOCUMENTS_DROPPED: &str = "dedupDocumentsDropped";
pub const DOCUMENTS_READY: &str = "dedupDocumentsReady";
pub const DOCUMENTS_IN_FLIGHT: &str = "dedupDocumentsInFlight";

/// 🔧 `[dedup]` settings. The section being present is what turns dedup on.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DedupConfig {
    /// 🔑 Field whose value identifies a duplicate.
    pub query_field: String,
    /// ⏱️ Time between query rounds, also the backpressure poll interval.
    #[serde(default = "default_query_interval_secs")]
    pub query_interval_secs: u64,
    /// ⏳ How long an unmatched entry waits before it is cleared to ingest.
    #[serde(default = "default_query_duration_secs")]
    pub query_duration_secs: u64,
    /// 🚦 Waiting entries above which draining holds the caller.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_query_interval_secs() -> u64 {
    20
}

fn default_query_duration_secs() -> u64 {
    60
}

fn default_max_in_flight() -> usize {
    5000
}

impl DedupConfig {
    pub fn for_field(query_field: impl Into<String>) -> Self {
        Self {
            query_field: query_field.into(),
            query_interval_secs: default_query_interval_secs(),
            query_duration_secs: default_query_duration_secs(),
            max_in_flight: default_max_in_flight(),
        }
    }

    pub fn query_interval(&self) -> Duration {
        Duration::from_secs(self.query_interval_secs)
    }
}

#[derive(Debug)]
struct PendingEntry<W> {
    write: W,
    enqueued_at: Instant,
}

type WaitingMap<W> = HashMap<String, HashMap<String, Vec<PendingEntry<W>>>>;

/// 🔁 Holds writes until the cluster confirms they are new, or until grace runs out.
#[derive(Debug)]
pub struct DedupQueryManager<W: Releasable> {
    client: Arc<dyn ClusterClient>,
    metrics: Arc<dyn MetricsSink>,
    query_field: String,
    query_interval: Duration,
    grace: Duration,
    max_in_flight: usize,
    waiting: Mutex<WaitingMap<W>>,
    ready: Mutex<Vec<W>>,
    in_flight: AtomicUsize,
    cancel: CancellationToken,
}

impl<W: Releasable> DedupQueryManager<W> {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        metrics: Arc<dyn MetricsSink>,
        config: &DedupConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if config.query_field.trim().is_empty() {
            return Err(SinkError::config("dedup query_field must not be empty"));
        }
        if config.query_interval_secs == 0 {
            return Err(SinkError::config("dedup query_interval_secs must be at least 1"));
        }
        Ok(Self {
            client,
            metrics,
            query_field: config.query_field.clone(),
            query_interval: config.query_interval(),
            grace: Duration::from_secs(config.query_duration_secs),
            max_in_flight: config.max_in_flight,
            waiting: Mutex::new(HashMap::new()),
            ready: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            cancel,
        })
    }

    pub fn query_field(&self) -> &str {
        &self.query_field
    }

    pub fn query_interval(&self) -> Duration {
        self.query_interval
    }

    /// 🔢 Entries still waiting on a verdict.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 🔍 Is anything waiting under `(index, value)`?
    pub async fn is_waiting(&self, index: &str, value: &str) -> bool {
        self.waiting
            .lock()
            .await
            .get(index)
            .is_some_and(|values| values.contains_key(value))
    }

    /// 🪑 Park a write until the next rounds decide its fate.
    pub async fn add_entry(&self, write: W, index: &str, value: &str) {
        let in_flight = {
            let mut waiting = self.waiting.lock().await;
            waiting
                .entry(index.to_string())
                .or_default()
                .entry(value.to_string())
                .or_default()
                .push(PendingEntry {
                    write,
                    enqueued_at: Instant::now(),
                });
            // 🔒 counted under the same guard a round settles under, so it can never go negative
            self.in_flight.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.metrics.increment_counter(DOCUMENTS_ADDED, 1);
        self.metrics.set_gauge(DOCUMENTS_IN_FLIGHT, gauge_value(in_flight));
    }

    /// 🔎 One round: search for every waiting value, drop what was found, promote what
    /// has waited past its grace period. A failed multi-search leaves everything waiting.
    pub async fn run_query_round(&self) -> Result<()> {
        let round_started = Instant::now();
        let snapshot: Vec<(String, Vec<String>)> = {
            let waiting = self.waiting.lock().await;
            waiting
                .iter()
                .map(|(index, values)| (index.clone(), values.keys().cloned().collect()))
                .collect()
        };
        if snapshot.is_empty() {
            return Ok(());
        }

        let queries = plan_queries(snapshot);
        let body = render_msearch(&self.query_field, &queries);
        let response = self
            .client
            .multi_search(body)
            .await
            .map_err(|e| SinkError::cluster("dedup multi-search failed", e))?;
        let outcomes = parse_msearch(&self.query_field, &response, queries.len())
            .map_err(|e| SinkError::cluster("dedup multi-search answer was unusable", e))?;

        let mut found: Vec<(String, String)> = Vec::new();
        let mut failed_indices: HashSet<String> = HashSet::new();
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                SubQueryOutcome::Found(values) => {
                    found.extend(values.into_iter().map(|v| (query.index.clone(), v)));
                }
                SubQueryOutcome::Failed(reason) => {
                    warn!(index = %query.index, %reason, "⚠️ dedup sub-query failed, entries stay waiting");
                    failed_indices.insert(query.index.clone());
                }
            }
        }

        let (dropped, promoted, in_flight) = {
            let mut waiting = self.waiting.lock().await;
            let dropped = take_matches(&mut waiting, &found);
            let promoted = take_expired(&mut waiting, &failed_indices, self.grace, round_started);
            let settled = dropped.len() + promoted.len();
            let in_flight = self
                .in_flight
                .fetch_sub(settled, Ordering::SeqCst)
                .saturating_sub(settled);
            (dropped, promoted, in_flight)
        };

        self.metrics.set_gauge(DOCUMENTS_IN_FLIGHT, gauge_value(in_flight));

        if !dropped.is_empty() {
            self.metrics.increment_counter(DOCUMENTS_DROPPED, dropped.len() as u64);
            for write in &dropped {
                write.release(true);
            }
        }
        if !promoted.is_empty() {
            self.metrics.increment_counter(DOCUMENTS_READY, promoted.len() as u64);
            self.ready.lock().await.extend(promoted);
        }
        debug!(dropped = dropped.len(), in_flight, "🔎 dedup query round complete");
        Ok(())
    }

    /// 📤 Take everything cleared to ingest. Holds the caller, polling every query
    /// interval, while more than `max_in_flight` entries are waiting. Once cancelled,
    /// nothing will thin the waiting room out anymore, so it stops holding and hands over
    /// whatever is ready.
    pub async fn get_and_clear_ready_entries(&self) -> Vec<W> {
        while self.in_flight() > self.max_in_flight {
            debug!(
                in_flight = self.in_flight(),
                max = self.max_in_flight,
                "🚦 too many dedup entries in flight, holding the drain"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("🛑 dedup cancelled, releasing the drain over the limit");
                    break;
                }
                _ = tokio::time::sleep(self.query_interval) => {}
            }
        }
        std::mem::take(&mut *self.ready.lock().await)
    }
}

/// 🗑️ Remove every entry whose `(index, value)` the cluster reported.
fn take_matches<W>(waiting: &mut WaitingMap<W>, found: &[(String, String)]) -> Vec<W> {
    let mut dropped = Vec::new();
    for (index, value) in found {
        let Some(values) = waiting.get_mut(index) else {
            continue;
        };
        if let Some(entries) = values.remove(value) {
            dropped.extend(entries.into_iter().map(|entry| entry.write));
        }
        if values.is_empty() {
            waiting.remove(index);
        }
    }
    dropped
}

/// ⏳ Remove every entry that waited past grace, skipping indices whose query failed.
fn take_expired<W>(
    waiting: &mut WaitingMap<W>,
    failed_indices: &HashSet<String>,
    grace: Duration,
    round_started: Instant,
) -> Vec<W> {
    let mut promoted = Vec::new();
    for (index, values) in waiting.iter_mut() {
        if failed_indices.contains(index) {
            continue;
        }
        for entries in values.values_mut() {
            let (expired, still_waiting): (Vec<_>, Vec<_>) = std::mem::take(entries)
                .into_iter()
                .partition(|entry| entry.enqueued_at + grace < round_started);
            *entries = still_waiting;
            promoted.extend(expired.into_iter().map(|entry| entry.write));
        }
        values.retain(|_, entries| !entries.is_empty());
    }
    waiting.retain(|_, values| !values.is_empty());
    promoted
}

fn gauge_value(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
