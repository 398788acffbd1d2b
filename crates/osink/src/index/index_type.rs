// ai
//! 🏷️ Index types: how much of the index lifecycle this sink is allowed to own.
//!
//! 🎬 *[a sink arrives at a serverless collection with a template under one arm and a
//! policy under the other. the collection looks at both. "we don't do that here."]*
//!
//! - `custom`: the default. Whatever `[index]` says gets provisioned.
//! - `management-disabled`: nothing is provisioned, ever. Names are still resolved. The
//!   default on serverless, where templates, policies and index creation are not ours.
//! - `trace-analytics-raw`: span documents. Fixed alias, built-in template, rollover under
//!   the built-in `raw-span-policy`, document id from `spanId`.
//! - `trace-analytics-service-map`: service map edges. Fixed alias, built-in template,
//!   plain index, document id from `hashId`.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::index::template::TemplateType;

const RAW_SPAN_ALIAS: &str = "otel-v1-apm-span";
const SERVICE_MAP_ALIAS: &str = "otel-v1-apm-service-map";
const RAW_SPAN_POLICY_ID: &str = "raw-span-policy";

/// 🏷️ `[index].index_type`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IndexType {
    #[default]
    Custom,
    #[serde(alias = "management_disabled")]
    ManagementDisabled,
    TraceAnalyticsRaw,
    TraceAnalyticsServiceMap,
}

impl IndexType {
    /// 🧭 The configured type, or the default for where we are writing.
    pub fn effective(configured: Option<IndexType>, serverless: bool) -> IndexType {
        match configured {
            Some(index_type) => index_type,
            None if serverless => IndexType::ManagementDisabled,
            None => IndexType::Custom,
        }
    }

    /// 🔧 False when the sink must not create templates, policies or indices.
    pub fn is_managed(self) -> bool {
        self != IndexType::ManagementDisabled
    }

    /// 🏷️ Trace types write to a fixed alias, whatever `[index].index` says.
    pub fn fixed_alias(self) -> Option<&'static str> {
        match self {
            IndexType::TraceAnalyticsRaw => Some(RAW_SPAN_ALIAS),
            IndexType::TraceAnalyticsServiceMap => Some(SERVICE_MAP_ALIAS),
            IndexType::Custom | IndexType::ManagementDisabled => None,
        }
    }

    /// 🔑 Trace types take their document id from a fixed field.
    pub fn fixed_document_id(self) -> Option<&'static str> {
        match self {
            IndexType::TraceAnalyticsRaw => Some("${spanId}"),
            IndexType::TraceAnalyticsServiceMap => Some("${hashId}"),
            IndexType::Custom | IndexType::ManagementDisabled => None,
        }
    }

    /// 📜 The template shipped with this type, shaped for `flavor`.
    pub fn builtin_template(self, flavor: TemplateType) -> Option<Value> {
        let (version, mappings) = match self {
            IndexType::TraceAnalyticsRaw => (1, raw_span_mappings()),
            IndexType::TraceAnalyticsServiceMap => (1, service_map_mappings()),
            IndexType::Custom | IndexType::ManagementDisabled => return None,
        };
        Some(match flavor {
            TemplateType::V1 => json!({"version": version, "mappings": mappings}),
            TemplateType::IndexTemplate => {
                json!({"version": version, "template": {"mappings": mappings}})
            }
        })
    }

    /// 📋 The lifecycle policy shipped with this type, as `(policy id, document)`.
    pub fn builtin_policy(self) -> Option<(&'static str, Value)> {
        match self {
            IndexType::TraceAnalyticsRaw => Some((RAW_SPAN_POLICY_ID, raw_span_policy())),
            _ => None,
        }
    }
}

fn raw_span_mappings() -> Value {
    json!({
        "date_detection": false,
        "dynamic_templates": [{
            "resource_attributes_map": {
                "mapping": {"type": "keyword"},
                "path_match": "resource.attributes.*"
            }
        }, {
            "span_attributes_map": {
                "mapping": {"type": "keyword"},
                "path_match": "span.attributes.*"
            }
        }],
        "properties": {
            "traceId": {"type": "keyword", "ignore_above": 256},
            "spanId": {"type": "keyword", "ignore_above": 256},
            "parentSpanId": {"type": "keyword", "ignore_above": 256},
            "name": {"type": "keyword", "ignore_above": 1024},
            "traceGroup": {"type": "keyword", "ignore_above": 1024},
            "traceGroupFields": {
                "properties": {
                    "endTime": {"type": "date_nanos"},
                    "durationInNanos": {"type": "long"},
                    "statusCode": {"type": "integer"}
                }
            },
            "kind": {"type": "keyword", "ignore_above": 128},
            "startTime": {"type": "date_nanos"},
            "endTime": {"type": "date_nanos"},
            "status": {
                "properties": {
                    "code": {"type": "integer"},
                    "message": {"type": "keyword"}
                }
            },
            "serviceName": {"type": "keyword"},
            "durationInNanos": {"type": "long"},
            "events": {
                "type": "nested",
                "properties": {"time": {"type": "date_nanos"}}
            },
            "links": {"type": "nested"}
        }
    })
}

fn service_map_mappings() -> Value {
    json!({
        "date_detection": false,
        "dynamic_templates": [{
            "strings_as_keyword": {
                "mapping": {"ignore_above": 1024, "type": "keyword"},
                "match_mapping_type": "string"
            }
        }],
        "properties": {
            "hashId": {"type": "keyword", "ignore_above": 1024},
            "serviceName": {"type": "keyword", "ignore_above": 1024},
            "kind": {"type": "keyword", "ignore_above": 1024},
            "destination": {
                "properties": {
                    "domain": {"type": "keyword", "ignore_above": 1024},
                    "resource": {"type": "keyword", "ignore_above": 1024}
                }
            },
            "target": {
                "properties": {
                    "domain": {"type": "keyword", "ignore_above": 1024},
                    "resource": {"type": "keyword", "ignore_above": 1024}
                }
            },
            "traceGroupName": {"type": "keyword", "ignore_above": 1024}
        }
    })
}

fn raw_span_policy() -> Value {
    json!({
        "policy": {
            "description": "Managing raw spans for trace analytics",
            "default_state": "current_write_index",
            "states": [{
                "name": "current_write_index",
                "actions": [{
                    "rollover": {"min_size": "50gb", "min_index_age": "24h"}
                }],
                "transitions": []
            }],
            "ism_template": [{
                "index_patterns": [format!("{RAW_SPAN_ALIAS}-*")]
            }]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        index_type: IndexType,
    }

    fn parse(raw: &str) -> std::result::Result<IndexType, serde_json::Error> {
        serde_json::from_str::<Holder>(&format!(r#"{{"index_type": "{raw}"}}"#)).map(|h| h.index_type)
    }

    #[test]
    fn the_one_where_every_spelling_finds_its_variant() {
        assert_eq!(parse("custom").expect("custom"), IndexType::Custom);
        assert_eq!(parse("management-disabled").expect("dash"), IndexType::ManagementDisabled);
        assert_eq!(parse("management_disabled").expect("underscore"), IndexType::ManagementDisabled);
        assert_eq!(parse("trace-analytics-raw").expect("raw"), IndexType::TraceAnalyticsRaw);
        assert_eq!(
            parse("trace-analytics-service-map").expect("service map"),
            IndexType::TraceAnalyticsServiceMap
        );
        let err = parse("log-analytics").unwrap_err().to_string();
        assert!(err.contains("management-disabled"), "error should list the valid values: {err}");
    }

    #[test]
    fn the_one_where_serverless_changes_the_default_but_not_an_explicit_choice() {
        assert_eq!(IndexType::effective(None, false), IndexType::Custom);
        assert_eq!(IndexType::effective(None, true), IndexType::ManagementDisabled);
        assert_eq!(
            IndexType::effective(Some(IndexType::Custom), true),
            IndexType::Custom
        );
        assert!(!IndexType::ManagementDisabled.is_managed());
        assert!(IndexType::TraceAnalyticsRaw.is_managed());
    }

    #[test]
    fn the_one_where_trace_types_bring_their_own_everything() {
        let raw = IndexType::TraceAnalyticsRaw;
        assert_eq!(raw.fixed_alias(), Some("otel-v1-apm-span"));
        assert_eq!(raw.fixed_document_id(), Some("${spanId}"));
        let (policy_id, policy) = raw.builtin_policy().expect("raw spans roll over");
        assert_eq!(policy_id, "raw-span-policy");
        assert_eq!(
            policy["policy"]["ism_template"][0]["index_patterns"][0],
            "otel-v1-apm-span-*"
        );

        let map = IndexType::TraceAnalyticsServiceMap;
        assert_eq!(map.fixed_alias(), Some("otel-v1-apm-service-map"));
        assert_eq!(map.fixed_document_id(), Some("${hashId}"));
        assert!(map.builtin_policy().is_none());

        let legacy = map.builtin_template(TemplateType::V1).expect("template");
        assert_eq!(legacy["mappings"]["properties"]["hashId"]["type"], "keyword");
        let composable = raw.builtin_template(TemplateType::IndexTemplate).expect("template");
        assert_eq!(
            composable["template"]["mappings"]["properties"]["spanId"]["type"],
            "keyword"
        );
        assert!(IndexType::Custom.builtin_template(TemplateType::V1).is_none());
    }
}
