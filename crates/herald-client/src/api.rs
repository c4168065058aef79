//! HTTP implementation of [`HistoryApi`].

use async_trait::async_trait;
use herald_core::{ClearHistoryResponse, HistoryEntry, QueryError};
use tracing::debug;

use crate::history::HistoryApi;

#[derive(Clone, Debug)]
pub struct HttpHistoryApi {
    client: reqwest::Client,
    base_url: String,
    admin_token: Option<String>,
}

impl HttpHistoryApi {
    pub fn new(base_url: impl Into<String>, admin_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            admin_token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, QueryError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        // Refusals carry `{success, message}`; prefer the message.
        let detail = serde_json::from_str::<ClearHistoryResponse>(&body)
            .map(|r| r.message)
            .unwrap_or(body);
        Err(QueryError::from_status(status, detail))
    }
}

#[async_trait]
impl HistoryApi for HttpHistoryApi {
    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, QueryError> {
        let url = format!("{}/api/history", self.base_url);
        debug!(%url, "fetching history");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QueryError::Network(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| QueryError::Decode(e.to_string()))
    }

    async fn clear_history(&self) -> Result<ClearHistoryResponse, QueryError> {
        let url = format!("{}/api/clear-history", self.base_url);
        let mut request = self.client.post(&url);
        if let Some(token) = &self.admin_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| QueryError::Network(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| QueryError::Decode(e.to_string()))
    }
}
