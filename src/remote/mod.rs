//! Remote Fetch Client
//!
//! Resolves a key on the member that owns it with a single HTTP call to that
//! member's gateway.
//!
//! ## Outcomes
//! - `Ok(Some(value))`: the peer has the key.
//! - `Ok(None)`: the peer answered 404, so the key is absent.
//! - `Err(FetchError)`: the peer could not be reached, timed out, or answered
//!   with anything else. Never reported as absent.
//!
//! There is no retry here. Whether to try again is up to the caller.

pub mod client;

#[cfg(test)]
mod tests;

pub use client::HttpFetchClient;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::directory::Member;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("peer answered with status {0}")]
    Status(u16),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid peer address {0}")]
    InvalidAddress(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

#[async_trait]
pub trait RemoteFetch: Send + Sync {
    /// Performs exactly one lookup call against `member`, bounded by `timeout`.
    async fn fetch_remote(
        &self,
        member: &Member,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, FetchError>;
}
