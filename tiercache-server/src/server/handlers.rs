use crate::core::{CacheError, CacheStats, TieredCache};
use crate::upstream::UpstreamClient;
use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: TieredCache,
    pub upstream: Option<Arc<UpstreamClient>>,
}

impl AppState {
    pub fn new(cache: TieredCache, upstream: Option<UpstreamClient>) -> Self {
        Self {
            cache,
            upstream: upstream.map(Arc::new),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub operation: String,
    #[serde(default)]
    pub tier: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub tier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RemovalResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub tier: Option<String>,
    pub removed: BTreeMap<String, usize>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub tier: String,
    #[serde(default)]
    pub payload: Value,
}

/// Header telling proxy clients whether the upstream was contacted
pub const CACHE_STATUS_HEADER: &str = "x-cache";

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tiercache",
        "version": env!("CARGO_PKG_VERSION"),
        "tiers": state.cache.tier_names()
    }))
}

/// GET /cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.get_stats())
}

/// POST /cache/invalidate
pub async fn cache_invalidate(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<RemovalResponse>, CacheError> {
    if req.operation.is_empty() {
        return Err(CacheError::InvalidRequest(
            "operation must not be empty".to_string(),
        ));
    }

    let report = state.cache.invalidate(&req.operation, req.tier.as_deref());
    info!(
        "HTTP invalidate operation={} tier={:?} removed={}",
        req.operation,
        req.tier,
        report.total()
    );

    Ok(Json(RemovalResponse {
        total: report.total(),
        operation: Some(req.operation),
        tier: req.tier,
        removed: report.removed,
    }))
}

/// POST /cache/clear
pub async fn cache_clear(
    State(state): State<AppState>,
    Json(req): Json<ClearRequest>,
) -> Json<RemovalResponse> {
    let report = state.cache.clear(req.tier.as_deref());
    info!("HTTP clear tier={:?} removed={}", req.tier, report.total());

    Json(RemovalResponse {
        total: report.total(),
        operation: None,
        tier: req.tier,
        removed: report.removed,
    })
}

/// POST /cache/call/{operation}
///
/// Runs the upstream call for `operation` through the cache. The response
/// carries `x-cache: hit` when it was served from a tier.
pub async fn cache_call(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    Json(req): Json<CallRequest>,
) -> Result<Response, CacheError> {
    let upstream = state
        .upstream
        .as_deref()
        .ok_or(CacheError::UpstreamNotConfigured)?;

    let op = operation.as_str();
    let payload = &req.payload;
    let mut produced = false;

    let value = state
        .cache
        .with_cache(op, &req.tier, payload, || {
            produced = true;
            async move { upstream.call(op, payload).await }
        })
        .await?;

    let status = if produced { "miss" } else { "hit" };
    debug!("HTTP call operation={} tier={} cache={}", op, req.tier, status);

    Ok(([(CACHE_STATUS_HEADER, status)], Json(value.as_ref().clone())).into_response())
}
