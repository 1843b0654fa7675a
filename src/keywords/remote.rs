//! Remote NLP keyword service client

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{MnemoError, Result};

/// NLP-assisted keyword extraction, provided by an external service.
///
/// Callers bound the call with a timeout and fall back to the local
/// extractor; implementations should not retry internally.
#[async_trait]
pub trait RemoteKeywordService: Send + Sync {
    /// Extract ranked keywords for a query
    async fn extract(&self, query: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct KeywordResponse {
    keywords: Vec<String>,
}

/// HTTP client for a remote keyword extraction endpoint
pub struct HttpKeywordService {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpKeywordService {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl RemoteKeywordService for HttpKeywordService {
    async fn extract(&self, query: &str) -> Result<Vec<String>> {
        let url = format!("{}/keywords", self.base_url.trim_end_matches('/'));

        let mut request = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "query": query }));
        if let Some(ref api_key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MnemoError::KeywordService(format!(
                "Keyword API error {}: {}",
                status, body
            )));
        }

        let data: KeywordResponse = response.json().await?;
        Ok(data.keywords)
    }
}
