//! Core data models for the MGNREGA cache
//!
//! This module contains the record type handed through from the upstream API
//! and the envelope persisted to disk after every successful fetch.

pub mod upstream;

pub use upstream::{UpstreamClient, UpstreamError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upstream field holding the state name in older dataset revisions
pub const FIELD_STATE: &str = "state";

/// Upstream field holding the state name
pub const FIELD_STATE_NAME: &str = "state_name";

/// Upstream field holding the district name
pub const FIELD_DISTRICT_NAME: &str = "district_name";

/// A single record from the MGNREGA dataset
///
/// Records are passed through untouched, so the field set is whatever the
/// upstream returns. Only the state and district fields are ever inspected,
/// through the accessors below. Fields holding anything other than a JSON
/// string read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Returns the string value of a field, if present and a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Value of the legacy `state` field
    pub fn state(&self) -> Option<&str> {
        self.get_str(FIELD_STATE)
    }

    /// Value of the `state_name` field
    pub fn state_name(&self) -> Option<&str> {
        self.get_str(FIELD_STATE_NAME)
    }

    /// Value of the `district_name` field
    pub fn district_name(&self) -> Option<&str> {
        self.get_str(FIELD_DISTRICT_NAME)
    }
}

/// Snapshot of the last successful upstream fetch, as stored on disk
///
/// Serialized with camelCase keys: `{"fetchedAt": ..., "count": ..., "records": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope {
    /// When the records were fetched
    pub fetched_at: DateTime<Utc>,
    /// Number of records at write time
    pub count: usize,
    /// The records returned by the upstream
    pub records: Vec<Record>,
}

impl CacheEnvelope {
    /// Builds an envelope whose count matches its records
    pub fn new(records: Vec<Record>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            count: records.len(),
            records,
        }
    }

    /// Age of the envelope relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }

    /// Whether the envelope is older than the given TTL
    ///
    /// An envelope exactly `ttl` old is still fresh.
    pub fn is_stale(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > ttl
    }
}
