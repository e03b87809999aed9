use async_trait::async_trait;
use bon::Builder;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::core::RetrievalError;
use crate::retrieve::{Retriever, deduplicate};

pub const DEFAULT_COLBERT_URL: &str = "http://20.102.90.50:2017/wiki17_abstracts";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ColBERTv2Hit {
    pub text: String,
    #[serde(default)]
    pub pid: Option<u64>,
    #[serde(default)]
    pub rank: Option<u64>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub prob: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ColBERTv2Response {
    #[serde(default)]
    pub topk: Vec<ColBERTv2Hit>,
}

impl ColBERTv2Response {
    /// Passage texts of the first `k` hits, duplicates removed.
    pub fn into_passages(self, k: usize) -> Vec<String> {
        deduplicate(self.topk.into_iter().take(k).map(|hit| hit.text).collect())
    }
}

/// Client for a hosted ColBERTv2 search endpoint (`GET ?query=..&k=..`).
#[derive(Builder, Clone, Debug)]
pub struct ColBERTv2 {
    #[builder(into, default = DEFAULT_COLBERT_URL.to_string())]
    url: String,
    #[builder(default = Duration::from_secs(10))]
    timeout: Duration,
    #[builder(default)]
    client: Client,
}

impl ColBERTv2 {
    /// Reads the endpoint from `COLBERT_URL`, falling back to the public
    /// wiki17 abstracts index.
    pub fn from_env() -> Self {
        match std::env::var("COLBERT_URL") {
            Ok(url) if !url.trim().is_empty() => Self::builder().url(url).build(),
            _ => Self::builder().build(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn network_error(&self, err: reqwest::Error) -> RetrievalError {
        if err.is_timeout() {
            RetrievalError::Timeout { after: self.timeout }
        } else {
            RetrievalError::Network {
                endpoint: self.url.clone(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Retriever for ColBERTv2 {
    #[tracing::instrument(name = "dsrs.retrieve.colbert", level = "debug", skip(self))]
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        let k_param = k.to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[("query", query), ("k", k_param.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.network_error(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::InvalidResponse {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ColBERTv2Response = response.json().await.map_err(|err| {
            if err.is_decode() {
                RetrievalError::Malformed {
                    message: err.to_string(),
                }
            } else {
                self.network_error(err)
            }
        })?;

        let passages = parsed.into_passages(k);
        debug!(returned = passages.len(), "passages retrieved");
        Ok(passages)
    }
}
