// ai
//! 🎬 *[one config walks into a struct. it carries a URL, two ways to authenticate, and
//! two opinions about how long to wait.]*
//!
//! 📦 **Cluster connection config**: how to reach the cluster and who to say we are.
//!
//! 🧠 Knowledge graph:
//! - Embedded in `AppConfig` under `[cluster]`.
//! - Consumed by `HttpClusterClient::new`, nothing else. The resolver and dedup engine
//!   never see a URL; they see a `ClusterClient`.
//! - Auth is tri-modal: api key, basic auth, or "I hope anonymous works" (it might, locally).
//!
//! "He who hardcodes the cluster URL, migrates only once."
//!   (ancient Rust module proverb) 💀

use serde::Deserialize;

/// 📡 How to reach the search cluster.
#[derive(Debug, Deserialize, Clone)]
pub struct ClusterConfig {
    /// 📡 Scheme, host and port. Yes, all of it. `localhost` alone is a wish, not a URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// 🔒 Basic auth username.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Basic auth password. If this is plaintext in a checked-in file, we need to talk.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key. Wins over basic auth when both are set. Hierarchy is respected here.
    #[serde(default)]
    pub api_key: Option<String>,
    /// ⏱️ TCP/TLS handshake budget.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// ⏱️ Whole-request budget, response body included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

// ⏱️ If the cluster can't shake hands in 10 seconds, it's not having a good day.
fn default_connect_timeout_secs() -> u64 {
    10
}

// ⏱️ 30 seconds covers a slow template PUT and a chunky multi-search. Mostly.
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
