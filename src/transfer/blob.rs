//! Plain GET/PUT of block payloads.
//!
//! The remote store never carries block bytes itself. A ready block read
//! returns a URL to GET; an upload target is a URL to PUT. [`BlobClient`] is
//! the thin HTTP layer for both.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Errors from block payload transfers.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error on {url}: {source}")]
    Network {
        /// Block URL.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout on {url}")]
    Timeout {
        /// Block URL.
        url: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} on {url}")]
    HttpStatus {
        /// Block URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The HTTP client could not be built.
    #[error("failed to build blob client: {0}")]
    Client(#[source] reqwest::Error),
}

impl BlobError {
    fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// HTTP client for block payload URLs.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct BlobClient {
    client: Client,
}

impl BlobClient {
    /// Creates a client with default timeouts.
    ///
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large blocks)
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Client`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, BlobError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Client`] if the client cannot be built.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, BlobError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .build()
            .map_err(BlobError::Client)?;
        Ok(Self { client })
    }

    /// Downloads a whole block payload.
    ///
    /// # Errors
    ///
    /// Returns a [`BlobError`] on network failure, timeout, or non-2xx status.
    #[instrument(level = "debug", skip(self))]
    pub async fn get(&self, url: &str) -> Result<Bytes, BlobError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlobError::from_reqwest(url, e))?;
        let response = check_status(url, response)?;
        let body = response
            .bytes()
            .await
            .map_err(|e| BlobError::from_reqwest(url, e))?;
        debug!(bytes = body.len(), "block fetched");
        Ok(body)
    }

    /// Uploads a block payload.
    ///
    /// # Errors
    ///
    /// Returns a [`BlobError`] on network failure, timeout, or non-2xx status.
    #[instrument(level = "debug", skip(self, body), fields(bytes = body.len()))]
    pub async fn put(&self, url: &str, body: Vec<u8>) -> Result<(), BlobError> {
        let response = self
            .client
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| BlobError::from_reqwest(url, e))?;
        check_status(url, response)?;
        Ok(())
    }
}

fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, BlobError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BlobError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}
