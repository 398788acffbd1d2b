//! # Previously, on Osink...
//!
//! 🎬 The cluster was down. The cluster was always down when you needed a test to pass.
//! Someone had to be brave. Someone had to write a cluster so simple it lives entirely
//! in RAM, gone the moment the test ends.
//!
//! That someone was this module.
//!
//! `InMemoryCluster` implements [`ClusterClient`] over a handful of maps behind a Mutex:
//! templates, indices, aliases, policies and searchable documents. It records every call
//! in order so tests can assert on "exactly one template PUT", and it can be told to fail
//! a specific operation on cue with a specific cluster error, because races don't
//! schedule themselves.
//!
//! ⚠️ Test-only. If this ends up in prod, please also deploy a therapist.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::backends::ClusterClient;
use crate::common::value_at_path;
use crate::errors::ClusterError;

/// 📦 The world's most cooperative search cluster.
#[derive(Debug, Default)]
pub(crate) struct InMemoryCluster {
    state: Mutex<ClusterState>,
}

#[derive(Debug, Default)]
struct ClusterState {
    settings: Value,
    legacy_templates: HashMap<String, Value>,
    index_templates: HashMap<String, Value>,
    indices: HashMap<String, Value>,
    aliases: HashSet<String>,
    policies: HashMap<String, Value>,
    documents: HashMap<String, Vec<Value>>,
    reject_ism_template: bool,
    broken_search_indices: HashSet<String>,
    scripted_failures: HashMap<&'static str, VecDeque<ClusterError>>,
    latency: Duration,
    calls: Vec<String>,
}

impl InMemoryCluster {
    pub(crate) fn new() -> Self {
        let cluster = Self::default();
        cluster.with_state(|s| {
            s.settings = json!({"persistent": {}, "transient": {}, "defaults": {}});
        });
        cluster
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ClusterState) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .expect("💀 InMemoryCluster lock poisoned. A previous test panicked mid-thought.");
        f(&mut state)
    }

    /// 🔧 Flip ISM on via the `defaults` scope, like a freshly installed plugin would.
    pub(crate) fn enable_ism(&self) {
        self.with_state(|s| {
            s.settings["defaults"]["plugins.index_state_management.enabled"] = json!("true");
        });
    }

    /// 🧬 Pretend to be an older ISM that has never heard of `ism_template`.
    pub(crate) fn reject_ism_template(&self) {
        self.with_state(|s| s.reject_ism_template = true);
    }

    /// 💥 Sub-queries against `index` answer with a shard failure from now on.
    pub(crate) fn break_searches_on(&self, index: &str) {
        self.with_state(|s| {
            s.broken_search_indices.insert(index.to_string());
        });
    }

    pub(crate) fn seed_legacy_template(&self, name: &str, body: Value) {
        self.with_state(|s| {
            s.legacy_templates.insert(name.to_string(), body);
        });
    }

    pub(crate) fn seed_index_template(&self, name: &str, body: Value) {
        self.with_state(|s| {
            s.index_templates.insert(name.to_string(), body);
        });
    }

    pub(crate) fn seed_index(&self, name: &str) {
        self.with_state(|s| {
            s.indices.insert(name.to_string(), json!({}));
        });
    }

    pub(crate) fn seed_alias(&self, name: &str) {
        self.with_state(|s| {
            s.aliases.insert(name.to_string());
        });
    }

    /// 📄 Make a document searchable in `index`.
    pub(crate) fn index_document(&self, index: &str, source: Value) {
        self.with_state(|s| s.documents.entry(index.to_string()).or_default().push(source));
    }

    /// 💣 The next call to `operation` fails with `error`. Queue several for several failures.
    pub(crate) fn fail_next(&self, operation: &'static str, error: ClusterError) {
        self.with_state(|s| {
            s.scripted_failures
                .entry(operation)
                .or_default()
                .push_back(error)
        });
    }

    /// 🐌 Every call takes `latency` to answer, so concurrent callers actually overlap.
    pub(crate) fn slow_down(&self, latency: Duration) {
        self.with_state(|s| s.latency = latency);
    }

    /// 📒 Every call so far, as `operation:argument`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    /// 🔢 How many calls started with `prefix`.
    pub(crate) fn count_calls(&self, prefix: &str) -> usize {
        self.with_state(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
    }

    pub(crate) fn legacy_template(&self, name: &str) -> Option<Value> {
        self.with_state(|s| s.legacy_templates.get(name).cloned())
    }

    pub(crate) fn index_template(&self, name: &str) -> Option<Value> {
        self.with_state(|s| s.index_templates.get(name).cloned())
    }

    pub(crate) fn index_body(&self, name: &str) -> Option<Value> {
        self.with_state(|s| s.indices.get(name).cloned())
    }

    pub(crate) fn policy(&self, id: &str) -> Option<Value> {
        self.with_state(|s| s.policies.get(id).cloned())
    }

    /// 📒 Log the call, take our time, then blow up if the script says so.
    async fn enter(&self, operation: &'static str, argument: &str) -> Result<(), ClusterError> {
        let latency = self.with_state(|s| s.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.with_state(|s| {
            s.calls.push(format!("{operation}:{argument}"));
            match s.scripted_failures.get_mut(operation).and_then(VecDeque::pop_front) {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}

/// 🏗️ A cluster-shaped API error, for scripting failures without ceremony.
pub(crate) fn api_error(status: u16, error_type: &str, reason: &str) -> ClusterError {
    ClusterError::Api {
        status,
        error_type: Some(error_type.to_string()),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn get_cluster_settings(&self) -> Result<Value, ClusterError> {
        self.enter("get_cluster_settings", "").await?;
        Ok(self.with_state(|s| s.settings.clone()))
    }

    async fn get_legacy_template(&self, name: &str) -> Result<Option<Value>, ClusterError> {
        self.enter("get_legacy_template", name).await?;
        Ok(self.with_state(|s| {
            s.legacy_templates
                .get(name)
                .map(|body| json!({ name: body }))
        }))
    }

    async fn put_legacy_template(&self, name: &str, body: &Value) -> Result<(), ClusterError> {
        self.enter("put_legacy_template", name).await?;
        self.with_state(|s| s.legacy_templates.insert(name.to_string(), body.clone()));
        Ok(())
    }

    async fn get_index_template(&self, name: &str) -> Result<Option<Value>, ClusterError> {
        self.enter("get_index_template", name).await?;
        Ok(self.with_state(|s| {
            s.index_templates.get(name).map(|body| {
                json!({"index_templates": [{"name": name, "index_template": body}]})
            })
        }))
    }

    async fn put_index_template(&self, name: &str, body: &Value) -> Result<(), ClusterError> {
        self.enter("put_index_template", name).await?;
        self.with_state(|s| s.index_templates.insert(name.to_string(), body.clone()));
        Ok(())
    }

    async fn index_or_alias_exists(&self, name: &str) -> Result<bool, ClusterError> {
        self.enter("index_or_alias_exists", name).await?;
        Ok(self.with_state(|s| s.indices.contains_key(name) || s.aliases.contains(name)))
    }

    async fn alias_exists(&self, name: &str) -> Result<bool, ClusterError> {
        self.enter("alias_exists", name).await?;
        Ok(self.with_state(|s| s.aliases.contains(name)))
    }

    async fn create_index(&self, name: &str, body: &Value) -> Result<(), ClusterError> {
        self.enter("create_index", name).await?;
        self.with_state(|s| {
            if s.indices.contains_key(name) {
                return Err(api_error(
                    400,
                    "resource_already_exists_exception",
                    &format!("index [{name}] already exists"),
                ));
            }
            if let Some(aliases) = body.get("aliases").and_then(Value::as_object) {
                for alias in aliases.keys() {
                    if s.indices.contains_key(alias) {
                        return Err(api_error(
                            400,
                            "invalid_alias_name_exception",
                            &format!(
                                "Invalid alias name [{alias}], an index exists with the same name as the alias"
                            ),
                        ));
                    }
                    s.aliases.insert(alias.clone());
                }
            }
            s.indices.insert(name.to_string(), body.clone());
            Ok(())
        })
    }

    async fn put_ism_policy(&self, policy_id: &str, body: &Value) -> Result<(), ClusterError> {
        self.enter("put_ism_policy", policy_id).await?;
        self.with_state(|s| {
            if s.reject_ism_template && body["policy"].get("ism_template").is_some() {
                return Err(ClusterError::Api {
                    status: 400,
                    error_type: Some("illegal_argument_exception".to_string()),
                    reason: "Invalid field: [ism_template] found in Policy.".to_string(),
                });
            }
            if s.policies.contains_key(policy_id) {
                return Err(api_error(
                    409,
                    "version_conflict_engine_exception",
                    &format!("[{policy_id}]: version conflict, document already exists"),
                ));
            }
            s.policies.insert(policy_id.to_string(), body.clone());
            Ok(())
        })
    }

    async fn multi_search(&self, body: String) -> Result<Value, ClusterError> {
        self.enter("multi_search", "").await?;
        let lines: Vec<Value> = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()
            .map_err(|e| ClusterError::UnexpectedResponse(format!("bad msearch NDJSON: {e}")))?;

        let responses: Vec<Value> = lines
            .chunks(2)
            .map(|pair| {
                let index = pair[0]["index"].as_str().unwrap_or_default().to_string();
                if self.with_state(|s| s.broken_search_indices.contains(&index)) {
                    return json!({
                        "error": {"type": "search_phase_execution_exception", "reason": "all shards failed"},
                        "status": 500
                    });
                }
                let search = pair.get(1).cloned().unwrap_or_default();
                let terms = search["query"]["terms"].as_object().cloned().unwrap_or_default();
                let size = search["size"].as_u64().map_or(usize::MAX, |n| n as usize);
                let collapse = search["collapse"]["field"].as_str().map(str::to_string);
                let hits: Vec<Value> = self.with_state(|s| {
                    let docs = s.documents.get(&index).cloned().unwrap_or_default();
                    let mut seen: Vec<Value> = Vec::new();
                    docs.into_iter()
                        .filter(|doc| {
                            terms.iter().any(|(field, values)| {
                                values
                                    .as_array()
                                    .is_some_and(|vs| value_at_path(doc, field).is_some_and(|v| vs.contains(v)))
                            })
                        })
                        // 🗜️ one hit per distinct collapse key, like the real thing
                        .filter(|doc| match &collapse {
                            Some(field) => {
                                let key = value_at_path(doc, field).cloned().unwrap_or_default();
                                if seen.contains(&key) {
                                    false
                                } else {
                                    seen.push(key);
                                    true
                                }
                            }
                            None => true,
                        })
                        .take(size)
                        .map(|doc| json!({"_index": index, "_source": doc}))
                        .collect()
                });
                json!({"hits": {"hits": hits}, "status": 200})
            })
            .collect();
        Ok(json!({ "responses": responses }))
    }
}
