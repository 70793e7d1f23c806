//! Fetch-and-store of the MGNREGA dataset
//!
//! The `Fetcher` is the only writer of the cache file. Refreshes are
//! serialized by an async mutex, so the envelope on disk always reflects the
//! refresh that finished last. At most one background refresh is in flight at
//! any time, and concurrent cold-start reads share a single upstream fetch.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::cache::{CacheError, CacheStore};
use crate::data::{CacheEnvelope, UpstreamClient, UpstreamError};

/// Errors that can occur during a refresh
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Upstream fetch failed
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Records were fetched but could not be written
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What caused a refresh, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// A read found no cache and is waiting on the result
    ColdStart,
    /// A read found a cache older than the TTL
    Stale,
    /// The daily scheduler fired
    Scheduled,
}

impl RefreshTrigger {
    fn as_str(self) -> &'static str {
        match self {
            RefreshTrigger::ColdStart => "cold_start",
            RefreshTrigger::Stale => "stale",
            RefreshTrigger::Scheduled => "scheduled",
        }
    }
}

/// Outcome of a cold-start fetch, shared by every caller that waited on it
#[derive(Debug, Clone)]
pub struct ColdFetch {
    /// The envelope now in the cache
    pub envelope: CacheEnvelope,
    /// False when another refresh wrote the cache while this one waited
    pub fetched: bool,
}

type ColdFlight = Shared<BoxFuture<'static, Result<ColdFetch, Arc<RefreshError>>>>;

/// Fetches records from the upstream and writes them to the cache store
#[derive(Clone)]
pub struct Fetcher {
    client: UpstreamClient,
    store: CacheStore,
    /// Held for the whole fetch-and-write so refreshes never interleave
    write_lock: Arc<Mutex<()>>,
    /// Set while a background refresh task is running
    background_in_flight: Arc<AtomicBool>,
    /// Cold-start fetch currently in flight, joined by later cold reads
    cold_flight: Arc<std::sync::Mutex<Option<ColdFlight>>>,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("client", &self.client)
            .field("store", &self.store)
            .field("background_in_flight", &self.background_in_flight)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher writing into the given store
    pub fn new(client: UpstreamClient, store: CacheStore) -> Self {
        Self {
            client,
            store,
            write_lock: Arc::new(Mutex::new(())),
            background_in_flight: Arc::new(AtomicBool::new(false)),
            cold_flight: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Store this fetcher writes into
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Fetches the dataset and overwrites the cache
    ///
    /// # Returns
    /// * `Ok(CacheEnvelope)` - The envelope just written, stamped with the current time
    /// * `Err(RefreshError)` - If the fetch or the write failed; the previous
    ///   cache file is left untouched
    pub async fn refresh(&self, trigger: RefreshTrigger) -> Result<CacheEnvelope, RefreshError> {
        let _guard = self.write_lock.lock().await;
        self.fetch_and_store(trigger).await
    }

    /// Fills an empty cache for a waiting reader
    ///
    /// Callers arriving while a cold-start fetch is in flight wait on that
    /// fetch instead of starting their own, so a burst of cold reads costs one
    /// upstream request and is bounded by a single timeout. If another refresh
    /// wrote the cache first, that envelope is returned without fetching.
    pub async fn fetch_cold(&self) -> Result<ColdFetch, Arc<RefreshError>> {
        let flight = {
            let mut slot = self
                .cold_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(flight) => {
                    tracing::debug!("joining cold-start fetch already in flight");
                    flight.clone()
                }
                None => {
                    let fetcher = self.clone();
                    let flight = async move {
                        fetcher.refresh_unless_cached().await.map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().await;

        let mut slot = self
            .cold_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
            *slot = None;
        }
        result
    }

    async fn refresh_unless_cached(&self) -> Result<ColdFetch, RefreshError> {
        let _guard = self.write_lock.lock().await;

        if let Ok(Some(envelope)) = self.store.load().await {
            tracing::debug!("cache written while waiting, skipping cold-start fetch");
            return Ok(ColdFetch {
                envelope,
                fetched: false,
            });
        }

        let envelope = self.fetch_and_store(RefreshTrigger::ColdStart).await?;
        Ok(ColdFetch {
            envelope,
            fetched: true,
        })
    }

    /// Fetch and write; the caller holds `write_lock`
    async fn fetch_and_store(&self, trigger: RefreshTrigger) -> Result<CacheEnvelope, RefreshError> {
        tracing::info!(
            trigger = trigger.as_str(),
            url = self.client.base_url(),
            "fetching latest MGNREGA data"
        );
        let started = Instant::now();

        let records = match self.client.fetch_records().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    trigger = trigger.as_str(),
                    error = %e,
                    "error fetching MGNREGA data"
                );
                return Err(e.into());
            }
        };

        let envelope = CacheEnvelope::new(records, Utc::now());
        let envelope = self.store.save(envelope).await?;

        tracing::info!(
            trigger = trigger.as_str(),
            count = envelope.count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cache updated"
        );
        Ok(envelope)
    }

    /// Starts a refresh without waiting for it
    ///
    /// The outcome is logged. Returns `None` without starting anything when a
    /// background refresh is already running.
    pub fn spawn_background_refresh(&self, trigger: RefreshTrigger) -> Option<JoinHandle<()>> {
        if self
            .background_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(
                trigger = trigger.as_str(),
                "background refresh already running"
            );
            return None;
        }

        let fetcher = self.clone();
        Some(tokio::spawn(async move {
            let result = fetcher.refresh(trigger).await;
            fetcher.background_in_flight.store(false, Ordering::Release);
            if let Err(e) = result {
                tracing::warn!(
                    trigger = trigger.as_str(),
                    error = %e,
                    "background refresh failed, keeping existing cache"
                );
            }
        }))
    }

    /// Whether a background refresh is currently running
    pub fn background_refresh_running(&self) -> bool {
        self.background_in_flight.load(Ordering::Acquire)
    }
}
