//! Core metron client implementation.

use crate::error::{ClientError, Result};
use crate::types::{Membership, Timestamp};
use reqwest::{Client as HttpClient, Response};
use std::time::Duration;

/// A client for one metron cluster.
///
/// Point it at any node: follower nodes answer timestamp requests with a
/// permanent redirect to the leader, which the client follows.
#[derive(Debug, Clone)]
pub struct Client {
    /// Base URL of a cluster node.
    base_url: String,
    /// HTTP client.
    http: HttpClient,
}

impl Client {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the HTTP client cannot
    /// be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self { base_url, http })
    }

    /// Set a custom timeout for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be rebuilt.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = HttpClient::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn url(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_checked(&self, path: &str) -> Result<Response> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Check process liveness (`GET /up`).
    pub async fn up(&self) -> Result<()> {
        self.get_checked("/up").await?;
        Ok(())
    }

    /// Check readiness (`GET /ready`), returning the readiness body.
    pub async fn ready(&self) -> Result<String> {
        Ok(self.get_checked("/ready").await?.text().await?)
    }

    /// Fetch one timestamp.
    pub async fn timestamp(&self) -> Result<Timestamp> {
        let batch = self.timestamps(1).await?;
        batch
            .into_iter()
            .next()
            .ok_or(ClientError::MalformedResponse(0))
    }

    /// Fetch a batch of `count` timestamps.
    pub async fn timestamps(&self, count: u32) -> Result<Vec<Timestamp>> {
        let path = if count == 1 {
            "/timestamp".to_string()
        } else {
            format!("/timestamp?count={count}")
        };
        let body = self.get_checked(&path).await?.bytes().await?;
        Timestamp::parse_batch(&body)
    }

    /// Fetch the cluster membership (`GET /membership`).
    pub async fn membership(&self) -> Result<Membership> {
        Ok(self.get_checked("/membership").await?.json().await?)
    }
}
