//! Read and filter paths over the cached dataset
//!
//! Reads never wait on the network while any cache exists: a cache hit is
//! answered straight away, and if it is older than the TTL a background
//! refresh is started for the next caller. Only a cold start (no cache file)
//! blocks on a live fetch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheStore;
use crate::data::{CacheEnvelope, Record};
use crate::fetcher::{Fetcher, RefreshError, RefreshTrigger};
use crate::filter::RecordFilter;

/// Errors returned to API callers
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No cache exists and the live fetch failed
    #[error("API unavailable and no cache found.")]
    Upstream(#[source] Arc<RefreshError>),

    /// No cache exists and this path does not fetch live
    #[error("No cached data found")]
    NoCache,
}

/// Where the returned data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Served from the cache file
    Cache,
    /// Fetched from the upstream for this request
    Live,
}

/// Response of the read path
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub source: DataSource,
    pub last_updated: DateTime<Utc>,
    pub data: Vec<Record>,
}

/// Response of the filter path
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResponse {
    pub source: DataSource,
    pub last_updated: DateTime<Utc>,
    pub count: usize,
    pub data: Vec<Record>,
}

/// Summary of the cache, without its records
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
}

/// Serves the cached MGNREGA dataset
#[derive(Debug, Clone)]
pub struct MgnregaService {
    fetcher: Fetcher,
    ttl: chrono::Duration,
}

impl MgnregaService {
    /// Creates a service reading the fetcher's store with the given TTL
    pub fn new(fetcher: Fetcher, ttl: chrono::Duration) -> Self {
        Self { fetcher, ttl }
    }

    /// Fetcher used for live and background refreshes
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    fn store(&self) -> &CacheStore {
        self.fetcher.store()
    }

    /// Loads the envelope, treating an unreadable cache file as absent
    async fn load_envelope(&self) -> Option<CacheEnvelope> {
        match self.store().load().await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    path = %self.store().path().display(),
                    error = %e,
                    "ignoring unreadable cache file"
                );
                None
            }
        }
    }

    /// Returns all records, from cache when possible
    ///
    /// # Behavior
    /// - Cache present: returned immediately with `source = cache`; if older
    ///   than the TTL a background refresh is started and not awaited
    /// - Cache absent: fetched live with `source = live`; concurrent cold
    ///   reads share one upstream fetch
    ///
    /// # Returns
    /// * `Err(ServiceError::Upstream)` only when there is no cache and the
    ///   live fetch failed
    pub async fn get_records(&self) -> Result<RecordsResponse, ServiceError> {
        if let Some(envelope) = self.load_envelope().await {
            let now = Utc::now();
            if envelope.is_stale(self.ttl, now) {
                tracing::info!(
                    age_secs = envelope.age(now).num_seconds(),
                    "cache is stale, refreshing in background"
                );
                self.fetcher.spawn_background_refresh(RefreshTrigger::Stale);
            }

            return Ok(RecordsResponse {
                source: DataSource::Cache,
                last_updated: envelope.fetched_at,
                data: envelope.records,
            });
        }

        tracing::info!("no cache found, fetching live");
        let cold = self
            .fetcher
            .fetch_cold()
            .await
            .map_err(ServiceError::Upstream)?;

        Ok(RecordsResponse {
            source: if cold.fetched {
                DataSource::Live
            } else {
                DataSource::Cache
            },
            last_updated: cold.envelope.fetched_at,
            data: cold.envelope.records,
        })
    }

    /// Returns cached records matching the filter
    ///
    /// Never fetches live and never starts a refresh.
    ///
    /// # Returns
    /// * `Err(ServiceError::NoCache)` when there is no cache
    pub async fn filter_records(&self, filter: &RecordFilter) -> Result<FilterResponse, ServiceError> {
        let envelope = self.load_envelope().await.ok_or(ServiceError::NoCache)?;

        let data = filter.apply(envelope.records);

        Ok(FilterResponse {
            source: DataSource::Cache,
            last_updated: envelope.fetched_at,
            count: data.len(),
            data,
        })
    }

    /// Describes the current cache without triggering any fetch
    pub async fn cache_status(&self) -> CacheStatus {
        match self.load_envelope().await {
            Some(envelope) => CacheStatus {
                present: true,
                last_updated: Some(envelope.fetched_at),
                count: Some(envelope.count),
                stale: Some(envelope.is_stale(self.ttl, Utc::now())),
            },
            None => CacheStatus {
                present: false,
                last_updated: None,
                count: None,
                stale: None,
            },
        }
    }
}
