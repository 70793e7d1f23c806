//! data.gov.in API client for the MGNREGA dataset
//!
//! Fetches the record set in a single request and checks that the response
//! carries a top-level `records` array. Nothing else about the payload is
//! validated.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::Record;
use crate::config::UpstreamConfig;

/// Errors that can occur when fetching from the upstream API
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    /// HTTP request failed or the connection dropped
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {0}")]
    Status(reqwest::StatusCode),

    /// Response body was not valid JSON of the expected shape
    #[error("Failed to parse API response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Response had no top-level `records` field
    #[error("Invalid API response format: missing records")]
    MissingRecords,
}

/// Response from the data.gov.in resource endpoint
#[derive(Debug, Deserialize)]
struct ApiResponse {
    records: Option<Vec<Record>>,
}

/// Client for fetching the MGNREGA record set
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Resource URL, without query string
    base_url: String,
    /// data.gov.in API key
    api_key: String,
    /// Maximum number of records requested
    limit: u32,
    /// Upper bound on the whole request
    timeout: Duration,
}

impl UpstreamClient {
    /// Creates a client from the upstream configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Client(e.without_url()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            limit: config.limit,
            timeout: config.timeout,
        })
    }

    /// Resource URL this client fetches from
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the full record set
    ///
    /// # Returns
    /// * `Ok(Vec<Record>)` - The records from the response, possibly empty
    /// * `Err(UpstreamError)` - On network failure, timeout, non-2xx status,
    ///   malformed JSON or a missing `records` field
    pub async fn fetch_records(&self) -> Result<Vec<Record>, UpstreamError> {
        let limit = self.limit.to_string();
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("api-key", self.api_key.as_str()),
                ("format", "json"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        parse_records(&body)
    }

    /// Maps a reqwest error, dropping the URL since it carries the API key
    fn classify(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else {
            UpstreamError::Request(err.without_url())
        }
    }
}

/// Parses an API response body into its records
fn parse_records(body: &[u8]) -> Result<Vec<Record>, UpstreamError> {
    let response: ApiResponse = serde_json::from_slice(body)?;
    response.records.ok_or(UpstreamError::MissingRecords)
}
