//! HTTP feed client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{decode_posts, FeedPage, FeedSource};
use crate::config::FeedConfig;
use crate::error::PipelineError;

const USER_AGENT: &str = concat!("idea-forge/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// `GET {base}/feed` response body
#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default, alias = "posts")]
    data: Vec<Value>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Client for the paginated feed API
pub struct HttpFeedClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    page_limit: u32,
}

impl HttpFeedClient {
    pub fn new(config: &FeedConfig) -> Result<Self, PipelineError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::FeedUnavailable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_limit: config.page_limit,
        })
    }

    fn feed_url(&self) -> String {
        format!("{}/feed", self.base_url)
    }
}

#[async_trait]
impl FeedSource for HttpFeedClient {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage, PipelineError> {
        let url = self.feed_url();
        let mut query = vec![("limit", self.page_limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        debug!(url = %url, cursor = ?cursor, "Fetching feed page");

        let mut request = self.http_client.get(&url).query(&query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::FeedUnavailable(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(PipelineError::FeedUnavailable(format!(
                "{} returned {}: {}",
                url, status, snippet
            )));
        }

        let body: FeedResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::FeedUnavailable(format!("invalid feed response: {}", e)))?;

        let (posts, unparsable) = decode_posts(body.data);
        Ok(FeedPage {
            posts,
            unparsable,
            next_cursor: body.next_cursor.filter(|c| !c.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape() {
        let body: FeedResponse = serde_json::from_value(serde_json::json!({
            "data": [{"id": "1", "content": "x"}],
            "next_cursor": "abc"
        }))
        .unwrap();
        assert_eq!(body.data.len(), 1);
        assert_eq!(body.next_cursor.as_deref(), Some("abc"));

        let body: FeedResponse =
            serde_json::from_value(serde_json::json!({"posts": []})).unwrap();
        assert!(body.data.is_empty());
        assert!(body.next_cursor.is_none());
    }

    #[test]
    fn test_base_url_normalized() {
        let config = FeedConfig {
            base_url: "http://localhost:9/api/v1/".to_string(),
            ..Default::default()
        };
        let client = HttpFeedClient::new(&config).unwrap();
        assert_eq!(client.feed_url(), "http://localhost:9/api/v1/feed");
    }

    #[tokio::test]
    async fn test_unreachable_feed_is_unavailable() {
        let config = FeedConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = HttpFeedClient::new(&config).unwrap();
        let result = client.fetch_page(None).await;
        assert!(matches!(result, Err(PipelineError::FeedUnavailable(_))));
    }
}
