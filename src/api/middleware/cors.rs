//! CORS middleware configuration
//!
//! Proxied content is re-served from this origin, so by default any page
//! may call the API. Browsers only see the marker headers if they are
//! exposed explicitly.

use axum::http::header::{self, HeaderName};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::debug;

use crate::api::handlers::browse::{
    X_ADBLOCKER_APPLIED, X_ADBLOCKER_BLOCKED, X_ADBLOCKER_ENABLED, X_FINAL_URL, X_PROXY_USED,
};

/// Create a CORS layer with the specified allowed origins
///
/// An empty list allows any origin.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        debug!("CORS: No origins specified, allowing any origin");
        AllowOrigin::any()
    } else {
        debug!("CORS: Allowing origins: {:?}", allowed_origins);
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            HeaderName::from_static(X_PROXY_USED),
            HeaderName::from_static(X_ADBLOCKER_ENABLED),
            HeaderName::from_static(X_ADBLOCKER_APPLIED),
            HeaderName::from_static(X_ADBLOCKER_BLOCKED),
            HeaderName::from_static(X_FINAL_URL),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app(origins: &[String]) -> axum::Router {
        axum::Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(origins))
    }

    #[tokio::test]
    async fn test_cors_empty_origins_allows_any() {
        let response = app(&[])
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/")
                    .header("Origin", "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap()
                .to_str()
                .unwrap(),
            "*"
        );
        let exposed = response
            .headers()
            .get("access-control-expose-headers")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(exposed.contains(X_ADBLOCKER_APPLIED));
    }

    #[tokio::test]
    async fn test_cors_with_origins_allows_configured() {
        let origins = vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ];

        let response = app(&origins)
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/")
                    .header("Origin", "https://app.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap()
                .to_str()
                .unwrap(),
            "https://app.example.com"
        );
    }

    #[tokio::test]
    async fn test_cors_with_origins_blocks_others() {
        let origins = vec!["https://example.com".to_string()];

        let response = app(&origins)
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/")
                    .header("Origin", "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }
}
