//! Remote execution against a running REST server.

use anyhow::{anyhow, Result};
use budget_query::{
    api::{DomainsResponse, ErrorResponse},
    ReportOutcome,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Client for the report REST API.
pub struct RestClient {
    base_url: String,
    client: reqwest::Client,
}

impl RestClient {
    /// `base_url` includes the API prefix, e.g. `http://localhost:8080/api/v1`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn ask(&self, query: &str) -> Result<ReportOutcome> {
        self.post("/reports/query", json!({ "query": query })).await
    }

    pub async fn confirm(&self, intent: Value, confirmed: bool) -> Result<ReportOutcome> {
        self.post(
            "/reports/confirm",
            json!({ "intent": intent, "confirmed": confirmed }),
        )
        .await
    }

    pub async fn domains(&self) -> Result<DomainsResponse> {
        let response = self
            .client
            .get(format!("{}/schema/domains", self.base_url))
            .send()
            .await?;
        Self::read(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| anyhow!("Failed to parse response: {}", e));
        }

        match response.json::<ErrorResponse>().await {
            Ok(body) => Err(anyhow!("{} ({}, HTTP {})", body.error, body.code, status)),
            Err(_) => Err(anyhow!("Server returned HTTP {}", status)),
        }
    }
}
