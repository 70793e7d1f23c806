//! Cache module for storing the MGNREGA dataset on disk
//!
//! A single JSON file holds the last successful fetch. It is never deleted by
//! the service and survives restarts, so a warm cache is served immediately
//! after boot even when the upstream API is down.

mod store;

pub use store::{CacheError, CacheStore};
