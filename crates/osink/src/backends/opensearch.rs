//! # 📡 THE OPENSEARCH BACKEND
//!
//! 🎬 COLD OPEN. INT. SERVER ROOM, 3:47 AM
//!
//! The monitoring dashboard glows amber. A template PUT returned 400. A HEAD request
//! returned 404, which is good news, except when it isn't. Somewhere a multi-search
//! came back with one response per index and one of them is an error object wearing
//! a response costume.
//!
//! 🚀 This module is the only place in the crate that knows about URLs, status codes and
//! auth headers. It implements [`ClusterClient`] over plain HTTP with `reqwest`:
//!
//! | call                    | request                                          |
//! |-------------------------|--------------------------------------------------|
//! | cluster settings        | `GET /_cluster/settings?include_defaults=true`   |
//! | legacy template         | `GET` / `PUT /_template/{name}`                  |
//! | composable template     | `GET` / `PUT /_index_template/{name}`            |
//! | index or alias exists   | `HEAD /{name}`                                   |
//! | alias exists            | `HEAD /_alias/{name}`                            |
//! | create index            | `PUT /{name}`                                    |
//! | ISM policy              | `PUT /_plugins/_ism/policies/{id}`               |
//! | multi-search            | `POST /_msearch` (NDJSON)                        |
//!
//! ⚠️ This client does not retry. Retrying is a policy, and policy lives upstairs.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, trace};

use crate::backends::{ClusterClient, ClusterConfig};
use crate::errors::ClusterError;

/// 📡 A [`ClusterClient`] that speaks HTTP to a real cluster.
///
/// Holds one `reqwest::Client` for its whole life, because spinning up a new client per
/// request is the networking equivalent of buying a car for every grocery run.
#[derive(Debug, Clone)]
pub struct HttpClusterClient {
    client: reqwest::Client,
    config: ClusterConfig,
}

impl HttpClusterClient {
    /// 🚀 Build the HTTP client with the configured timeouts. No network traffic yet;
    /// the first real request is the first real test.
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// 🔗 `{url}/{path}` with the slash hygiene nobody thanks you for.
    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// 🔒 Start a request with auth applied. API key beats basic auth. Not a democracy.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, self.url(path));
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {api_key}"))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    /// 📬 Send, and turn any non-2xx into a structured [`ClusterError::Api`].
    async fn send_expecting_success(&self, request: RequestBuilder) -> Result<Response, ClusterError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        // 💀 the body usually explains which exception the cluster threw. read it. always.
        let body = response.text().await.unwrap_or_default();
        Err(ClusterError::from_response_body(status.as_u16(), &body))
    }

    /// 📥 GET that treats 404 as "not there" instead of a failure.
    async fn get_optional_json(&self, path: &str) -> Result<Option<Value>, ClusterError> {
        let response = self.request(Method::GET, path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            trace!(path, "🔍 404, nothing to see here");
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClusterError::from_response_body(status, &body));
        }
        Ok(Some(response.json::<Value>().await?))
    }

    /// 🔍 HEAD that maps 200 → true, 404 → false, anything else → error.
    async fn head_exists(&self, path: &str) -> Result<bool, ClusterError> {
        let response = self.request(Method::HEAD, path).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(ClusterError::Api {
                status: status.as_u16(),
                error_type: None,
                reason: format!("HEAD /{} answered {status}", path.trim_start_matches('/')),
            }),
        }
    }

    /// 📤 PUT a JSON body, ignore the (boring) success body.
    async fn put_json(&self, path: &str, body: &Value) -> Result<(), ClusterError> {
        self.send_expecting_success(self.request(Method::PUT, path).json(body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn get_cluster_settings(&self) -> Result<Value, ClusterError> {
        let response = self
            .send_expecting_success(
                self.request(Method::GET, "_cluster/settings?include_defaults=true"),
            )
            .await?;
        Ok(response.json::<Value>().await?)
    }

    async fn get_legacy_template(&self, name: &str) -> Result<Option<Value>, ClusterError> {
        self.get_optional_json(&format!("_template/{name}")).await
    }

    async fn put_legacy_template(&self, name: &str, body: &Value) -> Result<(), ClusterError> {
        debug!(template = name, "📜 PUT legacy template");
        self.put_json(&format!("_template/{name}"), body).await
    }

    async fn get_index_template(&self, name: &str) -> Result<Option<Value>, ClusterError> {
        self.get_optional_json(&format!("_index_template/{name}")).await
    }

    async fn put_index_template(&self, name: &str, body: &Value) -> Result<(), ClusterError> {
        debug!(template = name, "🧩 PUT composable template");
        self.put_json(&format!("_index_template/{name}"), body).await
    }

    async fn index_or_alias_exists(&self, name: &str) -> Result<bool, ClusterError> {
        self.head_exists(name).await
    }

    async fn alias_exists(&self, name: &str) -> Result<bool, ClusterError> {
        self.head_exists(&format!("_alias/{name}")).await
    }

    async fn create_index(&self, name: &str, body: &Value) -> Result<(), ClusterError> {
        debug!(index = name, "🏗️ PUT index");
        self.put_json(name, body).await
    }

    async fn put_ism_policy(&self, policy_id: &str, body: &Value) -> Result<(), ClusterError> {
        debug!(policy = policy_id, "📋 PUT ISM policy");
        self.put_json(&format!("_plugins/_ism/policies/{policy_id}"), body)
            .await
    }

    async fn multi_search(&self, body: String) -> Result<Value, ClusterError> {
        // ⚠️ application/x-ndjson, not application/json. The cluster has opinions.
        let response = self
            .send_expecting_success(
                self.request(Method::POST, "_msearch")
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
            )
            .await?;
        Ok(response.json::<Value>().await?)
    }
}
