//! MGNREGA cache - serves the data.gov.in MGNREGA dataset from a local cache
//!
//! An HTTP service that keeps the last successful fetch on disk, answers from
//! it immediately, and refreshes it daily and whenever it goes stale.

use std::net::SocketAddr;

use clap::Parser;

use mgnrega_cache::cache::CacheStore;
use mgnrega_cache::cli::Cli;
use mgnrega_cache::data::UpstreamClient;
use mgnrega_cache::observability::init_tracing;
use mgnrega_cache::scheduler::SchedulerHandle;
use mgnrega_cache::{server, Config, Fetcher, MgnregaService};

/// Resolves when the process receives Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine; anything else is worth a warning
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();
    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    init_tracing(&config.log_level);

    let store = CacheStore::new(config.cache.dir.clone());
    store.ensure_dir()?;

    let client = UpstreamClient::new(&config.upstream)?;
    let fetcher = Fetcher::new(client, store);
    let service = MgnregaService::new(fetcher.clone(), config.cache.ttl);

    let scheduler = SchedulerHandle::spawn(fetcher, config.scheduler.clone());

    let app = server::router(service, config.rate_limit);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        %addr,
        cache_dir = %config.cache.dir.display(),
        ttl_hours = config.cache.ttl.num_hours(),
        "MGNREGA cache listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.shutdown().await;
    Ok(())
}
