//! Proxied browse handlers
//!
//! Re-serves third-party content, so every response is locked down with a
//! sandboxing CSP and carries markers describing how it was produced.
//! Cross-origin access is left to the CORS layer.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header::{
    HeaderName, CONTENT_SECURITY_POLICY, CONTENT_TYPE, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::api::server::AppState;
use crate::error::LensError;
use crate::models::FetchResult;

pub const X_PROXY_USED: &str = "x-proxy-used";
pub const X_ADBLOCKER_ENABLED: &str = "x-adblocker-enabled";
pub const X_ADBLOCKER_APPLIED: &str = "x-adblocker-applied";
pub const X_ADBLOCKER_BLOCKED: &str = "x-adblocker-blocked";
pub const X_FINAL_URL: &str = "x-final-url";

const SANDBOX_POLICY: &str =
    "sandbox allow-same-origin allow-scripts allow-forms allow-popups allow-popups-to-escape-sandbox";

/// Browse request, as JSON body or query string
#[derive(Debug, Default, Deserialize)]
pub struct BrowseRequest {
    pub url: Option<String>,
    pub proxy: Option<String>,
    #[serde(default)]
    pub adblocker: bool,
}

/// POST /api/proxy
pub async fn browse(
    State(state): State<AppState>,
    payload: Result<Json<BrowseRequest>, JsonRejection>,
) -> Result<Response, LensError> {
    let Json(request) = payload
        .map_err(|e| LensError::InvalidInput(format!("Invalid request body: {}", e.body_text())))?;
    fetch(&state, request).await
}

/// GET /api/proxy, for opening a proxied page in a new window
pub async fn browse_get(
    State(state): State<AppState>,
    query: Result<Query<BrowseRequest>, QueryRejection>,
) -> Result<Response, LensError> {
    let Query(request) = query
        .map_err(|e| LensError::InvalidInput(format!("Invalid query: {}", e.body_text())))?;
    fetch(&state, request).await
}

async fn fetch(state: &AppState, request: BrowseRequest) -> Result<Response, LensError> {
    let result = state
        .orchestrator
        .handle(
            request.url.as_deref().unwrap_or_default(),
            request.proxy.as_deref().unwrap_or_default(),
            request.adblocker,
        )
        .await?;

    Ok(render(result))
}

fn render(result: FetchResult) -> Response {
    let status = StatusCode::from_u16(result.status_code).unwrap_or(StatusCode::OK);

    let mut headers = HeaderMap::new();
    set_header(&mut headers, CONTENT_TYPE, &result.content_type);
    set_header(&mut headers, HeaderName::from_static(X_PROXY_USED), &result.proxy.to_string());
    set_header(
        &mut headers,
        HeaderName::from_static(X_ADBLOCKER_ENABLED),
        &result.filter_requested.to_string(),
    );
    set_header(
        &mut headers,
        HeaderName::from_static(X_ADBLOCKER_APPLIED),
        &result.applied_filter().to_string(),
    );
    set_header(
        &mut headers,
        HeaderName::from_static(X_ADBLOCKER_BLOCKED),
        &result.removed_elements().to_string(),
    );
    set_header(&mut headers, HeaderName::from_static(X_FINAL_URL), result.final_url.as_str());

    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(SANDBOX_POLICY));

    (status, headers, result.body).into_response()
}

/// Values that are not valid header text are dropped.
fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
