//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." said every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Sections:
//! - `[cluster]`: where the cluster lives and how to log in
//! - `[index]`: alias expression, index type, template, ISM policy file, template API
//!   flavor, document id and routing templates
//! - `[dedup]`: present means "suppress duplicates", absent means "write everything"
//! - `[dynamic_index]`: cache and retry knobs for per-event aliases

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::backends::ClusterConfig;
use crate::dedup::DedupConfig;
use crate::errors::{Result, SinkError};
use crate::index::{DynamicIndexConfig, IndexType, TemplateType};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub index: IndexConfig,
    /// 🔁 `None` means dedup is off. No field, no dedup. Simple as.
    #[serde(default)]
    pub dedup: Option<DedupConfig>,
    #[serde(default)]
    pub dynamic_index: DynamicIndexConfig,
}

/// 🏷️ Which cluster generation we're talking to, as far as templates care.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistributionVersion {
    #[default]
    Default,
    /// Only knows legacy templates.
    Es6,
}

/// 🧭 `[index]`: what to write to and what to provision for it.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// 🏷️ Alias expression, `%{...}` date suffix allowed. Ignored by the trace types.
    #[serde(default = "default_index")]
    pub index: String,
    /// 🏷️ Unset means `custom`, or `management-disabled` when `serverless` is on.
    #[serde(default)]
    pub index_type: Option<IndexType>,
    /// ☁️ Writing to a serverless collection: composable templates only, and nothing is
    /// provisioned unless `index_type` says otherwise.
    #[serde(default)]
    pub serverless: bool,
    #[serde(default)]
    pub template_type: TemplateType,
    #[serde(default)]
    pub distribution_version: DistributionVersion,
    /// 📜 Template as inline JSON. Beats `template_file` when both are set.
    #[serde(default)]
    pub template_content: Option<String>,
    /// 📜 Template as a path to a JSON file.
    #[serde(default)]
    pub template_file: Option<PathBuf>,
    /// 📋 ISM policy document. Set means rollover-managed indices.
    #[serde(default)]
    pub ism_policy_file: Option<PathBuf>,
    /// 🧽 Clean up dynamic alias values instead of rejecting them.
    #[serde(default)]
    pub normalize_index: bool,
    /// 🔑 Document id template, `${field}` placeholders allowed.
    #[serde(default)]
    pub document_id: Option<String>,
    /// 🧭 Routing template, `${field}` placeholders allowed.
    #[serde(default)]
    pub routing: Option<String>,
}

fn default_index() -> String {
    "osink-%{yyyy.MM.dd}".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index: default_index(),
            index_type: None,
            serverless: false,
            template_type: TemplateType::default(),
            distribution_version: DistributionVersion::default(),
            template_content: None,
            template_file: None,
            ism_policy_file: None,
            normalize_index: false,
            document_id: None,
            routing: None,
        }
    }
}

impl IndexConfig {
    /// 🏷️ The index type in force, serverless default included.
    pub fn effective_index_type(&self) -> IndexType {
        IndexType::effective(self.index_type, self.serverless)
    }

    /// 🏷️ The template API to use. Serverless only speaks composable, ES6 only speaks
    /// legacy, whatever the config says.
    pub fn effective_template_type(&self) -> TemplateType {
        if self.serverless {
            return TemplateType::IndexTemplate;
        }
        match self.distribution_version {
            DistributionVersion::Es6 => TemplateType::V1,
            DistributionVersion::Default => self.template_type,
        }
    }

    /// 🏷️ The alias expression to write to. Trace types have a fixed one.
    pub fn effective_alias(&self) -> String {
        self.effective_index_type()
            .fixed_alias()
            .map_or_else(|| self.index.clone(), str::to_string)
    }

    /// 🔑 The document id template. Trace types have a fixed one.
    pub fn effective_document_id(&self) -> Option<String> {
        self.effective_index_type()
            .fixed_document_id()
            .map(str::to_string)
            .or_else(|| self.document_id.clone())
    }

    /// 📜 The template to provision: the configured body, else the one the index type
    /// ships with, else none.
    pub fn load_template(&self) -> Result<Option<Value>> {
        match self.load_configured_template()? {
            Some(template) => Ok(Some(template)),
            None => Ok(self
                .effective_index_type()
                .builtin_template(self.effective_template_type())),
        }
    }

    fn load_configured_template(&self) -> Result<Option<Value>> {
        let raw = match (&self.template_content, &self.template_file) {
            (Some(content), Some(file)) => {
                warn!(
                    file = %file.display(),
                    "⚠️ both template_content and template_file are set, using template_content"
                );
                content.clone()
            }
            (Some(content), None) => content.clone(),
            (None, Some(file)) => std::fs::read_to_string(file).map_err(|e| {
                SinkError::config(format!("cannot read template file '{}': {e}", file.display()))
            })?,
            (None, None) => return Ok(None),
        };
        let template: Value = serde_json::from_str(&raw)
            .map_err(|e| SinkError::config(format!("index template is not valid JSON: {e}")))?;
        if !template.is_object() {
            return Err(SinkError::config("index template must be a JSON object"));
        }
        Ok(Some(template))
    }
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`OSINK_*`, `__` between nesting levels, so
/// `OSINK_CLUSTER__URL` is `cluster.url`) with an optional TOML file. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("OSINK_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (OSINK_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (OSINK_*). \
                 No file was provided, so this one is squarely on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_test_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp file. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_every_section_shows_up_in_its_sunday_best() {
        let file = write_test_config(
            r#"
            [cluster]
            url = "https://search.internal:9200"
            api_key = "k3y"

            [index]
            index = "logs-%{yyyy.MM}"
            template_type = "index-template"
            ism_policy_file = "/etc/osink/policy.json"
            normalize_index = true

            [dedup]
            query_field = "event.id"
            max_in_flight = 10

            [dynamic_index]
            cache_ttl_secs = 5
            "#,
        );

        let config = load_config(Some(file.path())).expect("💀 Full config should parse.");

        assert_eq!(config.cluster.url, "https://search.internal:9200");
        assert_eq!(config.cluster.api_key.as_deref(), Some("k3y"));
        assert_eq!(config.cluster.request_timeout_secs, 30);
        assert_eq!(config.index.index, "logs-%{yyyy.MM}");
        assert_eq!(config.index.effective_template_type(), TemplateType::IndexTemplate);
        assert!(config.index.normalize_index);
        let dedup = config.dedup.expect("dedup section present");
        assert_eq!(dedup.query_field, "event.id");
        assert_eq!(dedup.max_in_flight, 10);
        assert_eq!(dedup.query_interval_secs, 20);
        assert_eq!(dedup.query_duration_secs, 60);
        assert_eq!(config.dynamic_index.cache_ttl_secs, 5);
        assert_eq!(config.dynamic_index.retry_delay_millis, 1000);
    }

    #[test]
    fn the_one_where_an_empty_file_still_gets_a_working_config() {
        let file = write_test_config("");

        let config: AppConfig = Figment::new()
            .merge(Toml::file(file.path()))
            .extract()
            .expect("💀 Defaults should carry an empty file.");

        assert_eq!(config.cluster.url, "http://localhost:9200");
        assert_eq!(config.index.index, "osink-%{yyyy.MM.dd}");
        assert!(config.dedup.is_none());
        assert_eq!(config.dynamic_index.max_cache_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn the_one_where_es6_only_speaks_legacy_templates() {
        let index = IndexConfig {
            template_type: TemplateType::IndexTemplate,
            distribution_version: DistributionVersion::Es6,
            ..IndexConfig::default()
        };
        assert_eq!(index.effective_template_type(), TemplateType::V1);
    }

    #[test]
    fn the_one_where_serverless_means_hands_off_and_composable() {
        let file = write_test_config(
            r#"
            [index]
            index = "logs"
            serverless = true
            template_type = "v1"
            "#,
        );

        let config = load_config(Some(file.path())).expect("💀 Serverless config should parse.");

        assert_eq!(config.index.effective_index_type(), IndexType::ManagementDisabled);
        assert_eq!(config.index.effective_template_type(), TemplateType::IndexTemplate);
        assert_eq!(config.index.effective_alias(), "logs");
    }

    #[test]
    fn the_one_where_a_trace_type_overrides_the_alias_and_the_document_id() -> Result<()> {
        let index = IndexConfig {
            index: "ignored-%{yyyy}".to_string(),
            index_type: Some(IndexType::TraceAnalyticsRaw),
            document_id: Some("${traceId}".to_string()),
            ..IndexConfig::default()
        };

        assert_eq!(index.effective_alias(), "otel-v1-apm-span");
        assert_eq!(index.effective_document_id().as_deref(), Some("${spanId}"));
        let template = index.load_template()?.expect("built-in template");
        assert_eq!(template["mappings"]["properties"]["traceId"]["type"], "keyword");

        let custom = IndexConfig {
            document_id: Some("${traceId}".to_string()),
            ..IndexConfig::default()
        };
        assert_eq!(custom.effective_document_id().as_deref(), Some("${traceId}"));
        Ok(())
    }

    #[test]
    fn the_one_where_an_unknown_index_type_is_refused_with_the_menu() {
        let file = write_test_config(
            r#"
            [index]
            index_type = "log-analytics"
            "#,
        );

        let err = load_config(Some(file.path())).unwrap_err();

        let chain = format!("{err:#}");
        assert!(chain.contains("trace-analytics-raw"), "valid values should be listed: {chain}");
    }

    #[test]
    fn the_one_where_inline_template_content_beats_the_file() -> Result<()> {
        let file = write_test_config(r#"{"version": 1}"#);
        let index = IndexConfig {
            template_content: Some(r#"{"version": 7}"#.to_string()),
            template_file: Some(file.path().to_path_buf()),
            ..IndexConfig::default()
        };
        assert_eq!(index.load_template()?.expect("template")["version"], 7);

        let from_file = IndexConfig {
            template_file: Some(file.path().to_path_buf()),
            ..IndexConfig::default()
        };
        assert_eq!(from_file.load_template()?.expect("template")["version"], 1);
        assert!(IndexConfig::default().load_template()?.is_none());
        Ok(())
    }

    #[test]
    fn the_one_where_a_template_that_is_not_json_is_a_config_error() {
        let index = IndexConfig {
            template_content: Some("mappings: yes".to_string()),
            ..IndexConfig::default()
        };
        assert!(index.load_template().unwrap_err().is_fatal_configuration());
    }
}
