// ai
//! 💀 Errors: the taxonomy of things that go wrong on the way to an index.
//!
//! 🎬 *[a provisioning call returns. it is not Ok. the on-call engineer squints.]*
//! *["is it my config, or is it the cluster?" they ask the void.]*
//! *[the void, for once, answers with an enum.]*
//!
//! 🧠 Knowledge graph:
//! - [`SinkError`]: what the library hands back to callers. Fatal config (never retried),
//!   wrapped remote failure (caller decides), cancellation, and the rare background worker
//!   that did not come home.
//! - [`ClusterError`]: what the wire client hands back. Either the cluster answered with a
//!   structured error body (`Api`) or we never got an answer at all (`Transport`).
//! - The race-tolerance helpers (`is_already_exists` & friends) check the structured
//!   `error.type` first and only fall back to sniffing the reason text when the cluster
//!   gave us no type. Substring matching is the fallback, not the plan.
//!
//! 🦆 The duck has filed a bug report. It was closed as "works as intended".

use thiserror::Error;

/// 📦 Result alias for the library surface. anyhow lives at the edges, this lives inside.
pub type Result<T> = std::result::Result<T, SinkError>;

// 🏷️ Cluster error types we care about. Spelled exactly the way the cluster spells them.
const RESOURCE_ALREADY_EXISTS: &str = "resource_already_exists_exception";
const VERSION_CONFLICT: &str = "version_conflict_engine_exception";
const INVALID_INDEX_NAME: &str = "invalid_index_name_exception";
const INVALID_ALIAS_NAME: &str = "invalid_alias_name_exception";

/// 🚨 Everything the write-path coordination layer can fail with.
#[derive(Debug, Error)]
pub enum SinkError {
    /// 🔧 Bad alias expression, bad template, bad policy file, alias occupied by an index.
    /// Fatal. Retrying a typo does not fix the typo.
    #[error("💀 invalid configuration: {0}")]
    Configuration(String),

    /// 📡 The cluster said no (or said nothing) and it did not match any race we tolerate.
    #[error("💀 {context}")]
    Cluster {
        context: String,
        #[source]
        source: ClusterError,
    },

    /// 🛑 Somebody pulled the plug on a loop that was politely waiting.
    #[error("🛑 operation cancelled before it could finish")]
    Cancelled,

    /// 🧵 A background worker panicked or was aborted instead of returning.
    #[error("💀 background worker ended abnormally: {0}")]
    Worker(String),
}

impl SinkError {
    /// 🔧 Shorthand for the config flavor. Used a lot. Typed a lot less now.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SinkError::Configuration(message.into())
    }

    /// 📡 Wrap a remote failure with a sentence a human can read at 3am.
    pub(crate) fn cluster(context: impl Into<String>, source: ClusterError) -> Self {
        SinkError::Cluster {
            context: context.into(),
            source,
        }
    }

    /// ✅ True when this error must never be retried.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, SinkError::Configuration(_))
    }
}

/// 📡 A failure reported by (or on the way to) the search cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// 🧾 The cluster answered with a non-2xx status. `error_type` is `error.type` from the
    /// response body when present; `reason` is `error.reason`, or the raw body when the
    /// cluster did not bother with structure.
    #[error("cluster responded {status} ({}): {reason}", .error_type.as_deref().unwrap_or("untyped"))]
    Api {
        status: u16,
        error_type: Option<String>,
        reason: String,
    },

    /// 🔌 We never got a response. DNS, TCP, TLS, timeouts. The usual suspects.
    #[error("transport failure talking to the cluster: {0}")]
    Transport(#[from] reqwest::Error),

    /// 🧩 The cluster answered 2xx but the body was not the shape we expected.
    #[error("unexpected response from the cluster: {0}")]
    UnexpectedResponse(String),
}

impl ClusterError {
    /// 🏗️ Build an `Api` error from a status and the raw response body.
    ///
    /// Tries to dig `error.type` / `error.reason` out of the JSON. If the body is not JSON,
    /// or `error` is a bare string (older clusters do that), the raw text becomes the reason.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let error_node = parsed.as_ref().and_then(|v| v.get("error"));
        let error_type = error_node
            .and_then(|e| e.get("type"))
            .and_then(|t| t.as_str())
            .map(str::to_string);
        let reason = error_node
            .and_then(|e| match e {
                serde_json::Value::String(s) => Some(s.clone()),
                other => other.get("reason").and_then(|r| r.as_str()).map(str::to_string),
            })
            .unwrap_or_else(|| body.to_string());
        ClusterError::Api {
            status,
            error_type,
            reason,
        }
    }

    /// 🏷️ The structured error type, when the cluster gave us one.
    pub fn error_type(&self) -> Option<&str> {
        match self {
            ClusterError::Api { error_type, .. } => error_type.as_deref(),
            _ => None,
        }
    }

    /// 🧾 The cluster's own explanation, when it answered at all.
    fn reason(&self) -> Option<&str> {
        match self {
            ClusterError::Api { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// 🔍 Does the error type, or failing that the reason text, mention `needle`?
    fn mentions(&self, needle: &str) -> bool {
        match self {
            ClusterError::Api { reason, .. } => {
                self.error_type() == Some(needle) || reason.contains(needle)
            }
            ClusterError::Transport(e) => e.to_string().contains(needle),
            ClusterError::UnexpectedResponse(msg) => msg.contains(needle),
        }
    }

    /// 🏁 Somebody else created it first. Another writer won the race; we lost gracefully.
    pub fn is_already_exists(&self) -> bool {
        self.mentions(RESOURCE_ALREADY_EXISTS) || self.mentions(VERSION_CONFLICT)
    }

    /// 🚫 The cluster rejected the characters in the name.
    pub fn is_invalid_index_name(&self) -> bool {
        self.mentions(INVALID_INDEX_NAME)
    }

    /// 🪑 A concrete index is squatting on the name we want to use as an alias.
    pub fn is_alias_occupied_by_index(&self, alias: &str) -> bool {
        match self.error_type() {
            Some(INVALID_ALIAS_NAME) => self.reason().is_some_and(|reason| {
                reason.contains(&format!("[{alias}]")) && reason.contains("an index exists with the same name")
            }),
            Some(_) => false,
            None => self.mentions(&format!(
                "Invalid alias name [{alias}], an index exists with the same name as the alias"
            )),
        }
    }

    /// 🧬 The policy schema on this cluster does not know the field we sent.
    pub fn is_unsupported_policy_field(&self, field: &str) -> bool {
        self.mentions(&format!("Invalid field: [{field}]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_structured_error_bodies_get_their_type_read_out_loud() {
        let body = r#"{"error":{"root_cause":[],"type":"resource_already_exists_exception","reason":"index [logs/abc] already exists"},"status":400}"#;
        let err = ClusterError::from_response_body(400, body);

        assert_eq!(err.error_type(), Some("resource_already_exists_exception"));
        assert!(err.is_already_exists());
        assert!(!err.is_invalid_index_name());
    }

    #[test]
    fn the_one_where_untyped_errors_fall_back_to_substring_sniffing() {
        // 🧪 no JSON at all, just vibes and an exception name buried in prose
        let err = ClusterError::from_response_body(
            409,
            "[version_conflict_engine_exception] policy already exists",
        );

        assert_eq!(err.error_type(), None);
        assert!(err.is_already_exists());
    }

    #[test]
    fn the_one_where_an_index_squats_on_the_alias_name() {
        let body = r#"{"error":{"type":"invalid_alias_name_exception","reason":"Invalid alias name [logs], an index exists with the same name as the alias"},"status":400}"#;
        let err = ClusterError::from_response_body(400, body);

        assert!(err.is_alias_occupied_by_index("logs"));
        assert!(!err.is_alias_occupied_by_index("metrics"));
        assert!(!err.is_already_exists());
    }

    #[test]
    fn the_one_where_the_type_is_trusted_before_the_prose() {
        // 🧪 right words, wrong type: a typed error that is not about aliases never counts
        let mislabelled = ClusterError::Api {
            status: 400,
            error_type: Some("illegal_argument_exception".to_string()),
            reason: "Invalid alias name [logs], an index exists with the same name as the alias"
                .to_string(),
        };
        assert!(!mislabelled.is_alias_occupied_by_index("logs"));

        let typed = ClusterError::Api {
            status: 400,
            error_type: Some("invalid_alias_name_exception".to_string()),
            reason: "Invalid alias name [logs]: an index exists with the same name as the alias"
                .to_string(),
        };
        assert!(typed.is_alias_occupied_by_index("logs"));

        let untyped = ClusterError::from_response_body(
            400,
            "Invalid alias name [logs], an index exists with the same name as the alias",
        );
        assert!(untyped.is_alias_occupied_by_index("logs"));
    }

    #[test]
    fn the_one_where_the_error_field_is_just_a_string() {
        let err = ClusterError::from_response_body(400, r#"{"error":"Invalid field: [ism_template]"}"#);

        assert!(err.is_unsupported_policy_field("ism_template"));
        assert_eq!(err.error_type(), None);
    }

    #[test]
    fn the_one_where_config_errors_are_marked_fatal() {
        assert!(SinkError::config("nope").is_fatal_configuration());
        assert!(!SinkError::Cancelled.is_fatal_configuration());
    }
}
