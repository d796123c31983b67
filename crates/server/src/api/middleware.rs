//! Request accounting for the status API.

use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::warn;

use crate::metrics::{route_label, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};

/// Record duration, count and in-flight requests per ingest route.
///
/// Paths outside the known routes share the `unmatched` label, so a client
/// probing arbitrary folder names or URLs cannot grow the label set.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let route = route_label(request.uri().path());
    let start = Instant::now();

    HTTP_REQUESTS_IN_FLIGHT.inc();
    let response = next.run(request).await;
    HTTP_REQUESTS_IN_FLIGHT.dec();

    let status = response.status();
    if status.is_server_error() {
        warn!(%method, route, status = status.as_u16(), "Status API request failed");
    }

    let labels = [method.as_str(), route, status.as_str()];
    HTTP_REQUEST_DURATION
        .with_label_values(&labels)
        .observe(start.elapsed().as_secs_f64());
    HTTP_REQUESTS_TOTAL.with_label_values(&labels).inc();

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn ok() -> &'static str {
        "OK"
    }

    fn count(method: &str, route: &str, status: &str) -> u64 {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&[method, route, status])
            .get()
    }

    #[tokio::test]
    async fn test_folder_requests_share_one_label() {
        let app = Router::new()
            .route("/api/folders/{name}", get(ok))
            .layer(middleware::from_fn(metrics_middleware));

        let before = count("GET", "/api/folders/{name}", "200");
        for folder in ["watch", "error"] {
            let request = Request::builder()
                .uri(format!("/api/folders/{}", folder))
                .body(Body::empty())
                .unwrap();
            app.clone().oneshot(request).await.unwrap();
        }

        assert_eq!(count("GET", "/api/folders/{name}", "200"), before + 2);
    }

    #[tokio::test]
    async fn test_unknown_paths_are_unmatched() {
        let app = Router::new()
            .route("/api/status", get(ok))
            .layer(middleware::from_fn(metrics_middleware));

        let before = count("GET", "unmatched", "404");
        let request = Request::builder()
            .uri("/wp-admin/setup.php")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(count("GET", "unmatched", "404"), before + 1);
    }
}
