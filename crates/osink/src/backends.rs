//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Everything in this crate that talks to the search cluster talks through one trait:
//! [`ClusterClient`]. The resolver asks it about templates and aliases, the lifecycle
//! strategies ask it to upload policies, the dedup engine asks it to multi-search.
//! Nobody above this line knows whether the bytes travel over HTTP or live in a `HashMap`.
//!
//! 🎭 Casting call:
//! - [`opensearch::HttpClusterClient`]: the real deal. reqwest, auth headers, status codes.
//! - `in_mem::InMemoryCluster` (tests only): a cluster that fits in a Mutex and does what
//!   the test script tells it to, including failing on cue.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ClusterError;

pub(crate) mod common_config;
pub(crate) mod opensearch;
#[cfg(test)]
pub(crate) mod in_mem;

pub use common_config::ClusterConfig;
pub use opensearch::HttpClusterClient;

/// 📡 Every remote call the write-path coordination layer makes.
///
/// # Contract
/// - Absent things are `Ok(None)` / `Ok(false)`, never an error. 404 is an answer.
/// - Every non-2xx that is not "absent" becomes [`ClusterError::Api`] with the
///   cluster's own error type attached, so callers can tell races from real failures.
/// - One call, one request. No retries in here. Retries are a policy decision and
///   policy lives upstairs.
#[async_trait]
pub trait ClusterClient: std::fmt::Debug + Send + Sync {
    /// 🔧 Cluster settings including defaults (`persistent`, `transient`, `defaults`).
    async fn get_cluster_settings(&self) -> Result<Value, ClusterError>;

    /// 📜 Legacy template by name: the raw `{name: {...}}` response, or `None`.
    async fn get_legacy_template(&self, name: &str) -> Result<Option<Value>, ClusterError>;

    /// 📜 Create or replace a legacy template.
    async fn put_legacy_template(&self, name: &str, body: &Value) -> Result<(), ClusterError>;

    /// 🧩 Composable template by name: the raw `{"index_templates": [...]}` response, or `None`.
    async fn get_index_template(&self, name: &str) -> Result<Option<Value>, ClusterError>;

    /// 🧩 Create or replace a composable template.
    async fn put_index_template(&self, name: &str, body: &Value) -> Result<(), ClusterError>;

    /// 🔍 Does an index, or an alias, answer to this name?
    async fn index_or_alias_exists(&self, name: &str) -> Result<bool, ClusterError>;

    /// 🔍 Does an alias (specifically an alias) answer to this name?
    async fn alias_exists(&self, name: &str) -> Result<bool, ClusterError>;

    /// 🏗️ Create an index with the given settings/mappings/aliases body.
    async fn create_index(&self, name: &str, body: &Value) -> Result<(), ClusterError>;

    /// 📋 Create a named index state management policy.
    async fn put_ism_policy(&self, policy_id: &str, body: &Value) -> Result<(), ClusterError>;

    /// 🔎 Multi-search. `body` is the NDJSON header/body pairs; the answer is the raw
    /// `{"responses": [...]}` document, one entry per query in request order.
    async fn multi_search(&self, body: String) -> Result<Value, ClusterError>;
}
