// ai
//! 🧭 The index resolver: from alias expression to "yes, that index exists, write away".
//!
//! 🎬 *[a sink starts. it has an alias expression, a template, maybe a policy file.]*
//! *[it has never met this cluster. it does not know what is already up there.]*
//! *[it is about to ask four questions, politely, in a very specific order.]*
//!
//! [`IndexResolver::ensure_provisioned`] runs the whole sequence:
//!
//! 1. 🔧 is index state management enabled? (cluster settings)
//! 2. 📋 if so, make sure the lifecycle policy exists
//! 3. 📜 if a template is configured, create it unless the cluster already has the same
//!    or a newer version (policy id and rollover alias injected when ISM is on)
//! 4. 🏗️ create the initial index unless something already answers to its name
//!
//! Every step tolerates losing a race to another writer. None of them tolerates a typo.
//! A resolver built with `managed: false` skips the whole sequence and never calls the
//! cluster: it only turns the alias into a name.
//!
//! 🧠 Knowledge graph:
//! - One resolver, two strategy seams: [`TemplateStrategy`] picks the template API family,
//!   [`LifecyclePolicyStrategy`] picks plain vs rollover-managed indices.
//! - [`ResolverFactory`] holds everything except the alias, so the dynamic cache can mint
//!   one resolver per distinct alias without re-reading config.
//! - [`AliasState`] caches the alias probe forever once it succeeds, and never when it fails.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backends::ClusterClient;
use crate::cluster_settings::ClusterSettingsReader;
use crate::errors::{Result, SinkError};
use crate::index::date_pattern::{AliasExpression, Clock};
use crate::index::policy::LifecyclePolicyStrategy;
use crate::index::template::TemplateStrategy;

const ISM_POLICY_ID_SETTING: &str = "opendistro.index_state_management.policy_id";
const ISM_ROLLOVER_ALIAS_SETTING: &str = "opendistro.index_state_management.rollover_alias";

/// 🏷️ Is the resolved name an alias? Unknown until a probe succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AliasState {
    #[default]
    Unknown,
    Known(bool),
}

/// 🏭 Everything a resolver needs except the alias itself.
#[derive(Debug, Clone)]
pub struct ResolverFactory {
    pub client: Arc<dyn ClusterClient>,
    /// Configured template body. `None` (or an empty object) means "no template".
    pub template: Option<Value>,
    pub template_strategy: Arc<dyn TemplateStrategy>,
    pub policy_strategy: Arc<dyn LifecyclePolicyStrategy>,
    pub clock: Arc<dyn Clock>,
    /// 🔧 `false` for management-disabled indices: resolve names, provision nothing.
    pub managed: bool,
}

impl ResolverFactory {
    /// 🧭 Parse `alias` and build its resolver. Bad expressions fail here, before any I/O.
    pub fn resolver_for(&self, alias: &str) -> Result<IndexResolver> {
        let alias = AliasExpression::parse(alias)?;
        let template = self
            .template
            .clone()
            .filter(|t| !t.as_object().is_some_and(serde_json::Map::is_empty));
        Ok(IndexResolver {
            client: self.client.clone(),
            alias,
            template,
            template_strategy: self.template_strategy.clone(),
            policy_strategy: self.policy_strategy.clone(),
            clock: self.clock.clone(),
            managed: self.managed,
            alias_state: Mutex::new(AliasState::Unknown),
        })
    }
}

/// 🧭 Resolves one alias expression and provisions what it needs on the cluster.
#[derive(Debug)]
pub struct IndexResolver {
    client: Arc<dyn ClusterClient>,
    alias: AliasExpression,
    template: Option<Value>,
    template_strategy: Arc<dyn TemplateStrategy>,
    policy_strategy: Arc<dyn LifecyclePolicyStrategy>,
    clock: Arc<dyn Clock>,
    managed: bool,
    alias_state: Mutex<AliasState>,
}

impl IndexResolver {
    pub fn alias(&self) -> &AliasExpression {
        &self.alias
    }

    /// 📅 The concrete index name right now.
    pub fn resolve_index_name(&self) -> String {
        self.alias.resolve(self.clock.as_ref())
    }

    /// 🏷️ Last known alias state, without probing.
    pub async fn alias_state(&self) -> AliasState {
        *self.alias_state.lock().await
    }

    /// 🏷️ Is the resolved name an alias? Probes the cluster until one probe succeeds, then
    /// answers from memory. A failed probe is logged and reported as `Unknown`.
    pub async fn is_alias(&self) -> AliasState {
        let mut state = self.alias_state.lock().await;
        if let AliasState::Known(_) = *state {
            return *state;
        }
        match self.probe_alias().await {
            Ok(is_alias) => {
                *state = AliasState::Known(is_alias);
                debug!(alias = self.alias.raw(), is_alias, "🏷️ alias state determined");
            }
            Err(e) => warn!(alias = self.alias.raw(), error = %e, "⚠️ alias probe failed, will ask again later"),
        }
        *state
    }

    async fn probe_alias(&self) -> Result<bool> {
        if !self.managed || !self.check_ism_enabled().await? {
            return Ok(false);
        }
        let name = self.resolve_index_name();
        self.client
            .alias_exists(&name)
            .await
            .map_err(|e| SinkError::cluster(format!("failed to check whether alias '{name}' exists"), e))
    }

    /// 🚀 Policy, template, initial index. In that order, every time, idempotently.
    pub async fn ensure_provisioned(&self) -> Result<()> {
        if !self.managed {
            debug!(alias = self.alias.raw(), "🙅 index management disabled, nothing to provision");
            return Ok(());
        }
        let ism_enabled = self.check_ism_enabled().await?;
        let base = self.alias.base_name();
        let policy_id = if ism_enabled {
            self.policy_strategy.check_and_create_policy(base).await?
        } else {
            None
        };
        if let Some(template) = &self.template {
            self.check_and_create_template(template, ism_enabled, policy_id.as_deref())
                .await?;
        }
        self.check_and_create_index().await
    }

    async fn check_ism_enabled(&self) -> Result<bool> {
        let settings = self
            .client
            .get_cluster_settings()
            .await
            .map_err(|e| SinkError::cluster("failed to read cluster settings", e))?;
        Ok(ClusterSettingsReader::new(&settings).is_ism_enabled())
    }

    async fn check_and_create_template(
        &self,
        template: &Value,
        ism_enabled: bool,
        policy_id: Option<&str>,
    ) -> Result<()> {
        let name = self.alias.template_name();
        let mut descriptor = self.template_strategy.descriptor(template.clone())?;
        let configured = descriptor.version().unwrap_or(0);

        match self.template_strategy.existing_version(&name).await? {
            Some(existing) if existing >= configured => {
                info!(
                    template = %name,
                    existing, configured,
                    "📜 index template is current, leaving it alone"
                );
                return Ok(());
            }
            Some(existing) => {
                info!(template = %name, existing, configured, "📜 index template is outdated, replacing it");
            }
            None => info!(template = %name, "📜 index template does not exist, creating it"),
        }

        let base = self.alias.base_name();
        if ism_enabled {
            if let Some(policy_id) = policy_id {
                descriptor.put_custom_setting(ISM_POLICY_ID_SETTING, policy_id);
            }
            descriptor.put_custom_setting(ISM_ROLLOVER_ALIAS_SETTING, base);
        }
        descriptor.set_name(name);
        descriptor.set_index_patterns(self.policy_strategy.index_patterns(base));
        self.template_strategy.put_template(&descriptor).await
    }

    async fn check_and_create_index(&self) -> Result<()> {
        let name = self.resolve_index_name();
        if self.policy_strategy.index_exists(&name).await? {
            return Ok(());
        }
        let request = self.policy_strategy.build_create_index_request(&name);
        match self.client.create_index(&request.index, &request.body).await {
            Ok(()) => {
                info!(index = %request.index, alias = %name, "🏗️ created index");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(index = %request.index, "🏁 index already exists, another writer won the race");
                Ok(())
            }
            Err(e) if e.is_invalid_index_name() => Err(SinkError::config(format!(
                "invalid characters in the index name '{name}'"
            ))),
            Err(e) if e.is_alias_occupied_by_index(&name) => Err(SinkError::config(format!(
                "an index exists with the same name as the reserved index alias name [{name}], please delete or migrate the existing index"
            ))),
            Err(e) => Err(SinkError::cluster(format!("failed to create index '{}'", request.index), e)),
        }
    }
}
