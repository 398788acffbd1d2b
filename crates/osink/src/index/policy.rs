// ai
//! 📋 Lifecycle policy strategies: does this alias roll over, and who is in charge of it?
//!
//! 🎬 *[two indices meet in a template. one is plain. one has a policy, an alias, and a
//! six-digit generation number. they do not have much to talk about.]*
//!
//! - [`NoIsmPolicyStrategy`]: no policy, plain indices, `{alias}*` patterns.
//! - [`IsmPolicyStrategy`]: uploads `{alias}-policy` (or a fixed id), creates `{alias}-000001` behind a
//!   write alias, `{alias}-*` patterns. Tolerates clusters that already have the policy and
//!   clusters that never heard of `ism_template`.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::backends::ClusterClient;
use crate::errors::{ClusterError, Result, SinkError};

const ISM_TEMPLATE_FIELD: &str = "ism_template";
const FIRST_GENERATION_SUFFIX: &str = "-000001";

/// 🏗️ The index a provisioning run should create, and the body to create it with.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexRequest {
    pub index: String,
    pub body: Value,
}

/// 📋 How an alias family is laid out on the cluster.
#[async_trait]
pub trait LifecyclePolicyStrategy: Debug + Send + Sync {
    /// Make sure the policy exists. `Some(policy_id)` when there is one to attach.
    async fn check_and_create_policy(&self, alias: &str) -> Result<Option<String>>;

    /// Index patterns the template for `alias` should match.
    fn index_patterns(&self, alias: &str) -> Vec<String>;

    /// Is `name` already backed by something on the cluster?
    async fn index_exists(&self, name: &str) -> Result<bool>;

    /// What to create when `name` is not there yet.
    fn build_create_index_request(&self, name: &str) -> CreateIndexRequest;
}

/// 🚫 Plain indices, no policy.
#[derive(Debug, Clone)]
pub struct NoIsmPolicyStrategy {
    client: Arc<dyn ClusterClient>,
}

impl NoIsmPolicyStrategy {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LifecyclePolicyStrategy for NoIsmPolicyStrategy {
    async fn check_and_create_policy(&self, _alias: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn index_patterns(&self, alias: &str) -> Vec<String> {
        vec![format!("{alias}*")]
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        self.client
            .index_or_alias_exists(name)
            .await
            .map_err(|e| SinkError::cluster(format!("failed to check whether index '{name}' exists"), e))
    }

    fn build_create_index_request(&self, name: &str) -> CreateIndexRequest {
        CreateIndexRequest {
            index: name.to_string(),
            body: json!({}),
        }
    }
}

/// 🔄 Rollover-managed indices governed by an index state management policy.
#[derive(Debug, Clone)]
pub struct IsmPolicyStrategy {
    client: Arc<dyn ClusterClient>,
    policy: Value,
    policy_id: Option<String>,
}

impl IsmPolicyStrategy {
    /// `policy` is the full policy document, `{"policy": {...}}`.
    pub fn new(client: Arc<dyn ClusterClient>, policy: Value) -> Result<Self> {
        if !policy.get("policy").is_some_and(Value::is_object) {
            return Err(SinkError::config(
                "an ISM policy document must have a top-level \"policy\" object",
            ));
        }
        Ok(Self {
            client,
            policy,
            policy_id: None,
        })
    }

    /// 🏷️ Upload under `policy_id` instead of `{alias}-policy`. Built-in policies have
    /// a name of their own.
    pub fn with_policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }

    /// 📂 Load the policy document from a JSON file.
    pub fn from_file(client: Arc<dyn ClusterClient>, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SinkError::config(format!("cannot read ISM policy file '{}': {e}", path.display()))
        })?;
        let policy: Value = serde_json::from_str(&raw).map_err(|e| {
            SinkError::config(format!("ISM policy file '{}' is not valid JSON: {e}", path.display()))
        })?;
        Self::new(client, policy)
    }

    /// The policy scoped to `{alias}*`, or as-is when it has no `ism_template` block.
    fn scoped_policy(&self, alias: &str) -> Value {
        let mut body = self.policy.clone();
        let pattern = json!([format!("{alias}*")]);
        if let Some(template) = body["policy"].get_mut(ISM_TEMPLATE_FIELD) {
            match template {
                Value::Array(templates) => {
                    for entry in templates.iter_mut().filter(|t| t.is_object()) {
                        entry["index_patterns"] = pattern.clone();
                    }
                }
                Value::Object(_) => template["index_patterns"] = pattern,
                _ => {}
            }
        }
        body
    }

    /// 🏁 Success and "already there" both mean the policy is in place.
    fn settle(
        &self,
        policy_id: &str,
        outcome: std::result::Result<(), ClusterError>,
    ) -> Result<Option<String>> {
        match outcome {
            Ok(()) => {
                info!(policy = policy_id, "📋 created ISM policy");
                Ok(Some(policy_id.to_string()))
            }
            Err(e) if e.is_already_exists() => {
                debug!(policy = policy_id, "🏁 ISM policy already exists, someone beat us to it");
                Ok(Some(policy_id.to_string()))
            }
            Err(e) => Err(SinkError::cluster(
                format!("failed to create ISM policy '{policy_id}'"),
                e,
            )),
        }
    }
}

#[async_trait]
impl LifecyclePolicyStrategy for IsmPolicyStrategy {
    async fn check_and_create_policy(&self, alias: &str) -> Result<Option<String>> {
        let policy_id = self
            .policy_id
            .clone()
            .unwrap_or_else(|| format!("{alias}-policy"));
        let body = self.scoped_policy(alias);

        match self.client.put_ism_policy(&policy_id, &body).await {
            Err(e) if e.is_unsupported_policy_field(ISM_TEMPLATE_FIELD) => {
                // 🧬 older ISM: same policy, minus the block it can't parse. one retry only.
                warn!(policy = %policy_id, "🧬 cluster rejected ism_template, retrying without it");
                let mut reduced = body;
                if let Some(policy) = reduced["policy"].as_object_mut() {
                    policy.remove(ISM_TEMPLATE_FIELD);
                }
                let retried = self.client.put_ism_policy(&policy_id, &reduced).await;
                self.settle(&policy_id, retried)
            }
            first => self.settle(&policy_id, first),
        }
    }

    fn index_patterns(&self, alias: &str) -> Vec<String> {
        vec![format!("{alias}-*")]
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        self.client
            .alias_exists(name)
            .await
            .map_err(|e| SinkError::cluster(format!("failed to check whether alias '{name}' exists"), e))
    }

    fn build_create_index_request(&self, name: &str) -> CreateIndexRequest {
        CreateIndexRequest {
            index: format!("{name}{FIRST_GENERATION_SUFFIX}"),
            body: json!({"aliases": {name: {"is_write_index": true}}}),
        }
    }
}
