//! 🧭 Index resolution and provisioning.
//!
//! Alias expression in, concrete index name out, with the template, lifecycle policy and
//! initial index created along the way exactly when they need to be.
//!
//! - [`date_pattern`]: parsing and formatting `%{...}` alias expressions
//! - [`index_type`]: how much of the lifecycle the sink owns, and the built-in trace types
//! - [`template`]: legacy vs composable template APIs
//! - [`policy`]: plain indices vs ISM-managed rollover indices
//! - [`resolver`]: the provisioning sequence for one alias
//! - [`dynamic`]: a cache of resolvers for aliases built from event fields

pub mod date_pattern;
pub mod dynamic;
pub mod index_type;
pub mod policy;
pub mod resolver;
pub mod template;

pub use date_pattern::{AliasExpression, Clock, FixedClock, SystemClock};
pub use dynamic::{DynamicIndexCache, DynamicIndexConfig};
pub use index_type::IndexType;
pub use policy::{IsmPolicyStrategy, LifecyclePolicyStrategy, NoIsmPolicyStrategy};
pub use resolver::{AliasState, IndexResolver, ResolverFactory};
pub use template::{TemplateStrategy, TemplateType, template_strategy_for};
