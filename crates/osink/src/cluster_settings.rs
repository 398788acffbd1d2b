//! 🔧 Cluster settings: reading one knob out of a very large settings response.
//!
//! A `GET /_cluster/settings?include_defaults=true` answer has three scopes:
//! `persistent`, `transient` and `defaults`, searched in that order. Inside a scope a
//! setting may be stored flat (`"plugins.index_state_management.enabled": "true"`),
//! fully nested (`{"plugins": {"index_state_management": {"enabled": "true"}}}`), or any
//! mix of the two, depending on who wrote it and how the cluster felt that day.
//! [`ClusterSettingsReader`] handles all of the above.

use serde_json::Value;

use crate::common::value_as_plain_string;

/// 🗂️ Scopes in precedence order. Persistent beats transient beats defaults.
const SCOPES: [&str; 3] = ["persistent", "transient", "defaults"];

/// 🏷️ ISM on/off switch, current and legacy spelling.
pub const ISM_ENABLED_SETTINGS: [&str; 2] = [
    "plugins.index_state_management.enabled",
    "opendistro.index_state_management.enabled",
];

/// 🔍 Reads named settings out of a cluster settings response.
#[derive(Debug, Clone)]
pub struct ClusterSettingsReader<'a> {
    response: &'a Value,
}

impl<'a> ClusterSettingsReader<'a> {
    pub fn new(response: &'a Value) -> Self {
        Self { response }
    }

    /// 📖 First value found for `setting`, searching persistent → transient → defaults.
    /// Returned as a plain string (`true`, `"5"`, ...) because settings are stringly typed
    /// on the wire half the time anyway.
    pub fn get_string(&self, setting: &str) -> Option<String> {
        SCOPES
            .iter()
            .filter_map(|scope| self.response.get(*scope))
            .find_map(|scope| lookup(scope, setting))
            .and_then(value_as_plain_string)
    }

    /// ✅ Is index state management switched on? Any spelling counts, first hit wins.
    pub fn is_ism_enabled(&self) -> bool {
        ISM_ENABLED_SETTINGS
            .iter()
            .find_map(|setting| self.get_string(setting))
            .is_some_and(|value| value == "true")
    }
}

/// 🌲 Walk `node` for a dotted key, trying every flat/nested split along the way.
fn lookup<'v>(node: &'v Value, key: &str) -> Option<&'v Value> {
    let map = node.as_object()?;
    if let Some(found) = map.get(key) {
        return Some(found);
    }
    key.match_indices('.').find_map(|(dot, _)| {
        let (head, tail) = (&key[..dot], &key[dot + 1..]);
        map.get(head).and_then(|child| lookup(child, tail))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_persistent_outranks_defaults() {
        let response = json!({
            "persistent": {"plugins": {"index_state_management": {"enabled": "false"}}},
            "transient": {},
            "defaults": {"plugins.index_state_management.enabled": "true"}
        });
        let reader = ClusterSettingsReader::new(&response);

        assert_eq!(
            reader.get_string("plugins.index_state_management.enabled").as_deref(),
            Some("false")
        );
        assert!(!reader.is_ism_enabled());
    }

    #[test]
    fn the_one_where_half_flat_half_nested_settings_still_get_found() {
        let response = json!({
            "persistent": {},
            "transient": {"opendistro": {"index_state_management.enabled": true}},
        });
        let reader = ClusterSettingsReader::new(&response);

        assert_eq!(
            reader.get_string("opendistro.index_state_management.enabled").as_deref(),
            Some("true")
        );
        assert!(reader.is_ism_enabled());
    }

    #[test]
    fn the_one_where_nobody_mentioned_ism_at_all() {
        let response = json!({"persistent": {}, "transient": {}, "defaults": {"cluster": {"name": "x"}}});
        let reader = ClusterSettingsReader::new(&response);

        assert_eq!(reader.get_string("plugins.index_state_management.enabled"), None);
        assert!(!reader.is_ism_enabled());
        assert_eq!(reader.get_string("cluster.name").as_deref(), Some("x"));
    }
}
