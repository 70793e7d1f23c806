//! MGNREGA cache library
//!
//! Fetches the data.gov.in MGNREGA dataset, keeps it in a local JSON file and
//! serves it over HTTP, refreshing daily and whenever a read finds the cache
//! older than its TTL.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod fetcher;
pub mod filter;
pub mod observability;
pub mod scheduler;
pub mod server;
pub mod service;

pub use config::Config;
pub use fetcher::Fetcher;
pub use service::MgnregaService;
