/// Top-level server error handling
///
/// Sits outside the handlers (and outside `CatchPanicLayer`) and sees every
/// 5xx response. Each one is logged with method, URL and caller IP. Callers
/// that do not accept JSON get a generic HTML page instead of the JSON body.

use crate::middleware::rate_limit::request_ip;
use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};

/// Body of the HTML error page
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

pub async fn handle_server_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let ip = request_ip(&request);
    let json = accepts_json(request.headers()) || uri.path().starts_with("/api/");

    let response = next.run(request).await;
    let status = response.status();

    if !status.is_server_error() {
        return response;
    }

    tracing::error!(
        status = status.as_u16(),
        method = %method,
        url = %uri,
        ip = %ip,
        "Request failed"
    );

    if json {
        response
    } else {
        (status, Html(error_page())).into_response()
    }
}

fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false)
}

fn error_page() -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Error</title></head>\
         <body><h1>Error</h1><p>{}</p></body></html>",
        GENERIC_ERROR_MESSAGE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/boom", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "db down") }))
            .route("/api/boom", get(|| async { (StatusCode::BAD_GATEWAY, "upstream") }))
            .route("/fine", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(handle_server_errors))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_browser_gets_generic_page() {
        let response = app()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(response).await;
        assert!(body.contains(GENERIC_ERROR_MESSAGE));
        assert!(!body.contains("db down"));
    }

    #[tokio::test]
    async fn test_json_client_keeps_body() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/boom")
                    .header(header::ACCEPT, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "db down");

        let response = app()
            .oneshot(Request::builder().uri("/api/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_text(response).await, "upstream");
    }

    #[tokio::test]
    async fn test_success_untouched() {
        let response = app()
            .oneshot(Request::builder().uri("/fine").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }
}
