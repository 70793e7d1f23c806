//! HTTP surface
//!
//! - `GET /api/mgnrega` - all records, from cache or live on cold start
//! - `GET /api/mgnrega/filter?state=&district=` - cached records matching the filter
//! - `GET /health` - cache presence and age, never fetches
//!
//! `/api` routes are rate limited per client. Every response carries a small
//! set of security headers, and requests are logged through `TraceLayer`.

mod error;
mod rate_limit;

pub use error::ErrorBody;
pub use rate_limit::{rate_limit_middleware, RateLimitState, RateLimited};

use axum::extract::{Query, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Serialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::RateLimitConfig;
use crate::filter::RecordFilter;
use crate::service::{CacheStatus, FilterResponse, MgnregaService, RecordsResponse, ServiceError};

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache: CacheStatus,
}

async fn get_records(
    State(service): State<MgnregaService>,
) -> Result<Json<RecordsResponse>, ServiceError> {
    service.get_records().await.map(Json)
}

async fn filter_records(
    State(service): State<MgnregaService>,
    Query(filter): Query<RecordFilter>,
) -> Result<Json<FilterResponse>, ServiceError> {
    service.filter_records(&filter).await.map(Json)
}

async fn health(State(service): State<MgnregaService>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        cache: service.cache_status().await,
    })
}

/// Builds the application router
///
/// # Arguments
/// * `service` - Read and filter paths
/// * `rate_limit` - Per-client ceiling on `/api`; `None` disables it
pub fn router(service: MgnregaService, rate_limit: Option<RateLimitConfig>) -> Router {
    let mut api = Router::new()
        .route("/mgnrega", get(get_records))
        .route("/mgnrega/filter", get(filter_records));

    if let Some(config) = rate_limit {
        api = api.layer(middleware::from_fn_with_state(
            RateLimitState::new(config),
            rate_limit_middleware,
        ));
    }

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .with_state(service)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("same-origin"),
        ))
        .layer(TraceLayer::new_for_http())
}
