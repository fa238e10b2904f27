//! HTTP client for the remote approval-policy service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use quorum_contracts::{
    error::{QuorumError, QuorumResult},
    node::NodeId,
    wire::{PolicyRecord, PolicyRequest, PolicyResponse},
};
use quorum_core::{config::ApiConfig, traits::PolicyApi};

/// `PolicyApi` over JSON/HTTP.
///
/// Routes, relative to `base_url`:
///
/// - `GET    /entities/{entity}/approval_policies`
/// - `POST   /entities/{entity}/approval_policies`
/// - `PATCH  /entities/{entity}/approval_policies/{id}`
/// - `DELETE /entities/{entity}/approval_policies/{id}`
pub struct HttpPolicyApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPolicyApi {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> QuorumResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuorumError::ConfigError {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client from the `[api]` config section, reading the bearer
    /// token from the environment if one is named.
    pub fn from_config(config: &ApiConfig) -> QuorumResult<Self> {
        Self::new(&config.base_url, config.request_timeout(), config.bearer_token())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, entity_id: &str) -> String {
        format!("{}/entities/{}/approval_policies", self.base_url, entity_id)
    }

    fn policy_url(&self, entity_id: &str, policy_id: &NodeId) -> String {
        format!("{}/{}", self.collection_url(entity_id), policy_id)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> QuorumResult<Response> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| QuorumError::RequestFailed {
                reason: format!("{}: {}", what, e),
            })?;

        let status = response.status();
        debug!(%status, request = what, "policy service responded");
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(QuorumError::RequestFailed {
                reason: format!("{}: HTTP {}: {}", what, status.as_u16(), body.trim()),
            })
        }
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> QuorumResult<T> {
        self.send(builder, what)
            .await?
            .json()
            .await
            .map_err(|e| QuorumError::RequestFailed {
                reason: format!("{}: malformed response: {}", what, e),
            })
    }
}

#[async_trait]
impl PolicyApi for HttpPolicyApi {
    async fn list(&self, entity_id: &str) -> QuorumResult<Vec<PolicyRecord>> {
        let url = self.collection_url(entity_id);
        self.json(self.client.get(&url), &format!("GET {}", url)).await
    }

    async fn create(&self, entity_id: &str, request: &PolicyRequest) -> QuorumResult<PolicyResponse> {
        let url = self.collection_url(entity_id);
        self.json(self.client.post(&url).json(request), &format!("POST {}", url))
            .await
    }

    async fn update(
        &self,
        entity_id: &str,
        policy_id: &NodeId,
        request: &PolicyRequest,
    ) -> QuorumResult<PolicyResponse> {
        let url = self.policy_url(entity_id, policy_id);
        self.json(self.client.patch(&url).json(request), &format!("PATCH {}", url))
            .await
    }

    async fn delete(&self, entity_id: &str, policy_id: &NodeId) -> QuorumResult<()> {
        let url = self.policy_url(entity_id, policy_id);
        self.send(self.client.delete(&url), &format!("DELETE {}", url))
            .await
            .map(|_| ())
    }
}
