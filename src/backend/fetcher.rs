// src/backend/fetcher.rs
//
// Page Fetcher - stateless request/response against the backend.
//
// The trait is the seam the cache and warm-up layers depend on; the reqwest
// implementation lives behind it so tests can script page sequences.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{header, Client};
use serde_json::Value;

use crate::backend::paging::{PageRequest, RawPage};
use crate::error::{AppError, AppResult};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page of a collection. `request.page` must be >= 1.
    async fn fetch_page(&self, request: &PageRequest) -> AppResult<RawPage>;

    /// Fetch a single entity by id, used by the optimistic create path.
    async fn fetch_one(&self, collection: &str, id: i64) -> AppResult<Value>;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub bearer_token: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(30),
            bearer_token: None,
        }
    }
}

/// HTTP Page Fetcher over the backend paging endpoint.
pub struct HttpPageFetcher {
    config: FetcherConfig,
    http_client: Client,
}

impl HttpPageFetcher {
    pub fn new(config: FetcherConfig) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn get_json<T>(&self, url: &str, query: &[(String, String)]) -> AppResult<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let mut request = self
            .http_client
            .get(url)
            .query(query)
            .header(header::ACCEPT, "application/json");

        if let Some(token) = &self.config.bearer_token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> AppResult<RawPage> {
        if request.page < 1 {
            return Err(AppError::Other("page number must be >= 1".to_string()));
        }

        let url = format!("{}/{}", self.config.base_url, request.collection);
        let mut query: Vec<(String, String)> = vec![
            ("page".to_string(), request.page.to_string()),
            ("page_size".to_string(), request.page_size.to_string()),
        ];
        for (key, value) in &request.params {
            query.push((key.clone(), value.clone()));
        }

        self.get_json(&url, &query).await
    }

    async fn fetch_one(&self, collection: &str, id: i64) -> AppResult<Value> {
        let url = format!("{}/{}/{}", self.config.base_url, collection, id);
        self.get_json(&url, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        let fetcher = HttpPageFetcher::new(FetcherConfig::default()).unwrap();
        assert!(fetcher.config.bearer_token.is_none());
    }

    #[tokio::test]
    async fn test_page_zero_is_rejected() {
        let fetcher = HttpPageFetcher::new(FetcherConfig::default()).unwrap();
        let request = PageRequest {
            collection: "customer".to_string(),
            page: 0,
            page_size: 10,
            params: Default::default(),
        };
        let err = fetcher.fetch_page(&request).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
