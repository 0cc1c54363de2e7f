//! Proxy list handler

use axum::extract::{Query, State};
use axum::Json;

use crate::api::server::AppState;
use crate::error::LensError;
use crate::models::{ProxyListQuery, ProxyListResponse};

/// GET /api/proxies
pub async fn list_proxies(
    State(state): State<AppState>,
    Query(query): Query<ProxyListQuery>,
) -> Result<Json<ProxyListResponse>, LensError> {
    let snapshot = state.proxy_source.snapshot().await?;

    Ok(Json(ProxyListResponse {
        proxies: query.apply(&snapshot.listings),
        fetched_at: snapshot.fetched_at,
    }))
}
