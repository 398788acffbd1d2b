//! 📜 Template strategies: two API generations, one question: "which version is up there?"
//!
//! The cluster has two ways to store an index template:
//!
//! - **legacy** (`/_template`): the body is one flat document, `settings` at the top level,
//!   and a GET answers `{name: {..., "version": n}}`.
//! - **composable** (`/_index_template`): settings live under `template.settings`, and a GET
//!   answers `{"index_templates": [{"name": .., "index_template": {..., "version": n}}]}`.
//!
//! Which one a sink uses is decided once from configuration, never per document.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::backends::ClusterClient;
use crate::errors::{ClusterError, Result, SinkError};

/// 🏷️ Which template API family to speak.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateType {
    /// `/_template`
    #[default]
    V1,
    /// `/_index_template`
    IndexTemplate,
}

/// 📦 A template body on its way to the cluster, owned by one provisioning attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDescriptor {
    name: String,
    body: Value,
    flavor: TemplateType,
}

impl TemplateDescriptor {
    /// Wrap a configured template body. Non-object bodies are a configuration error.
    pub fn new(flavor: TemplateType, body: Value) -> Result<Self> {
        if !body.is_object() {
            return Err(SinkError::config("index template content must be a JSON object"));
        }
        Ok(Self {
            name: String::new(),
            body,
            flavor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// 🔢 Declared `version`, if the template has one.
    pub fn version(&self) -> Option<i64> {
        self.body.get("version").and_then(Value::as_i64)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_index_patterns(&mut self, patterns: Vec<String>) {
        if let Some(map) = self.body.as_object_mut() {
            map.insert("index_patterns".to_string(), Value::from(patterns));
        }
    }

    /// 🔧 Put a flat `key: value` into the settings block for this flavor, creating the
    /// block if the configured body had none.
    pub fn put_custom_setting(&mut self, key: &str, value: impl Into<Value>) {
        let settings = match self.flavor {
            TemplateType::V1 => child_object(&mut self.body, "settings"),
            TemplateType::IndexTemplate => {
                child_object(child_object(&mut self.body, "template"), "settings")
            }
        };
        if let Some(map) = settings.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
    }
}

/// Descend into `parent[key]`, turning it into an object when it was missing or not one.
fn child_object<'v>(parent: &'v mut Value, key: &str) -> &'v mut Value {
    if !parent.is_object() {
        *parent = Value::Object(Map::new());
    }
    let child = &mut parent[key];
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    child
}

/// 🧩 One template API family.
#[async_trait]
pub trait TemplateStrategy: std::fmt::Debug + Send + Sync {
    /// Version of the template stored under `name`, `None` if it is absent or unversioned.
    async fn existing_version(&self, name: &str) -> Result<Option<i64>>;

    /// Create or replace the template.
    async fn put_template(&self, descriptor: &TemplateDescriptor) -> Result<()>;

    /// Wrap a configured body in the right flavor.
    fn descriptor(&self, body: Value) -> Result<TemplateDescriptor>;
}

/// 📜 `/_template`.
#[derive(Debug, Clone)]
pub struct LegacyTemplateStrategy {
    client: Arc<dyn ClusterClient>,
}

impl LegacyTemplateStrategy {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TemplateStrategy for LegacyTemplateStrategy {
    async fn existing_version(&self, name: &str) -> Result<Option<i64>> {
        let response = self
            .client
            .get_legacy_template(name)
            .await
            .map_err(|e| SinkError::cluster(format!("failed to read index template '{name}'"), e))?;
        Ok(response.and_then(|r| r.get(name).and_then(|t| t.get("version")).and_then(Value::as_i64)))
    }

    async fn put_template(&self, descriptor: &TemplateDescriptor) -> Result<()> {
        self.client
            .put_legacy_template(descriptor.name(), descriptor.body())
            .await
            .map_err(|e| {
                SinkError::cluster(format!("failed to create index template '{}'", descriptor.name()), e)
            })
    }

    fn descriptor(&self, body: Value) -> Result<TemplateDescriptor> {
        TemplateDescriptor::new(TemplateType::V1, body)
    }
}

/// 🧩 `/_index_template`.
#[derive(Debug, Clone)]
pub struct ComposableTemplateStrategy {
    client: Arc<dyn ClusterClient>,
}

impl ComposableTemplateStrategy {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TemplateStrategy for ComposableTemplateStrategy {
    async fn existing_version(&self, name: &str) -> Result<Option<i64>> {
        let Some(response) = self
            .client
            .get_index_template(name)
            .await
            .map_err(|e| SinkError::cluster(format!("failed to read index template '{name}'"), e))?
        else {
            return Ok(None);
        };
        let templates = response
            .get("index_templates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        match templates {
            [] => Ok(None),
            [only] => Ok(only
                .get("index_template")
                .and_then(|t| t.get("version"))
                .and_then(Value::as_i64)),
            many => Err(SinkError::cluster(
                format!("failed to read index template '{name}'"),
                ClusterError::UnexpectedResponse(format!(
                    "found {} index templates when querying for '{name}'",
                    many.len()
                )),
            )),
        }
    }

    async fn put_template(&self, descriptor: &TemplateDescriptor) -> Result<()> {
        self.client
            .put_index_template(descriptor.name(), descriptor.body())
            .await
            .map_err(|e| {
                SinkError::cluster(format!("failed to create index template '{}'", descriptor.name()), e)
            })
    }

    fn descriptor(&self, body: Value) -> Result<TemplateDescriptor> {
        TemplateDescriptor::new(TemplateType::IndexTemplate, body)
    }
}

/// 🏭 Pick the strategy for a template type.
pub fn template_strategy_for(
    template_type: TemplateType,
    client: Arc<dyn ClusterClient>,
) -> Arc<dyn TemplateStrategy> {
    match template_type {
        TemplateType::V1 => Arc::new(LegacyTemplateStrategy::new(client)),
        TemplateType::IndexTemplate => Arc::new(ComposableTemplateStrategy::new(client)),
    }
}
