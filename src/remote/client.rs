use async_trait::async_trait;
use std::time::Duration;

use super::{FetchError, RemoteFetch};
use crate::directory::Member;
use crate::gateway::protocol::{GET_LOCAL_SEGMENTS, KeyValue};

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 32;

/// HTTP implementation of [`RemoteFetch`].
///
/// Holds one `reqwest::Client`, so connections to a peer are pooled and
/// shared by all in-flight lookups.
#[derive(Clone)]
pub struct HttpFetchClient {
    http_client: reqwest::Client,
}

impl HttpFetchClient {
    pub fn new() -> reqwest::Result<Self> {
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()?;
        Ok(Self::with_client(http_client))
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// `http://{host}:{port}/internal/messages/{key}`, with the key encoded
    /// as a single path segment.
    pub fn lookup_url(&self, member: &Member, key: &str) -> Result<reqwest::Url, FetchError> {
        let mut url = reqwest::Url::parse(&member.base_url())
            .map_err(|e| FetchError::InvalidAddress(format!("{}: {}", member, e)))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidAddress(member.to_string()))?
            .pop_if_empty()
            .extend(GET_LOCAL_SEGMENTS)
            .push(key);
        Ok(url)
    }

    async fn send(&self, url: reqwest::Url, timeout: Duration) -> Result<Option<String>, FetchError> {
        let response = self
            .http_client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body: KeyValue = response.json().await.map_err(|e| {
            if e.is_decode() {
                FetchError::Decode(e.to_string())
            } else {
                classify(e, timeout)
            }
        })?;

        Ok(Some(body.value))
    }
}

#[async_trait]
impl RemoteFetch for HttpFetchClient {
    async fn fetch_remote(
        &self,
        member: &Member,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, FetchError> {
        let url = self.lookup_url(member, key)?;
        tracing::debug!("Forwarding lookup to {}", url);

        // Bounds the whole exchange, body included.
        match tokio::time::timeout(timeout, self.send(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Request(e.to_string())
    }
}
