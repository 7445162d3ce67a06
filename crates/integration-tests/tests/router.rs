//! In-process tests of the full middleware stack.
//!
//! The router runs over a pool that cannot connect, so every route exercised
//! here must answer without the database.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{StatusCode, header};
use tower::ServiceExt;

use nestling_integration_tests::{json_body, lazy_router, request, text_body};

#[tokio::test]
async fn test_health_is_ok_without_database() {
    let resp = lazy_router()
        .oneshot(request("GET", "/health", Body::empty()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(text_body(resp).await, "ok");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let resp = lazy_router()
        .oneshot(request("GET", "/health/ready", Body::empty()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_every_response_carries_security_headers_and_request_id() {
    let resp = lazy_router()
        .oneshot(request("GET", "/health", Body::empty()))
        .await
        .unwrap();

    let headers = resp.headers();
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_proxy_request_id_is_echoed() {
    let mut req = request("GET", "/health", Body::empty());
    req.headers_mut()
        .insert("x-request-id", "edge-1234".parse().unwrap());

    let resp = lazy_router().oneshot(req).await.unwrap();

    assert_eq!(resp.headers()["x-request-id"], "edge-1234");
}

#[tokio::test]
async fn test_account_api_requires_login() {
    let resp = lazy_router()
        .oneshot(request("GET", "/api/account/orders", Body::empty()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn test_checkout_api_requires_login() {
    let resp = lazy_router()
        .oneshot(request("POST", "/api/checkout", Body::empty()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_pages_redirect_anonymous_visitors_to_login() {
    for path in ["/admin", "/admin/orders", "/admin/dropship"] {
        let resp = lazy_router()
            .oneshot(request("GET", path, Body::empty()))
            .await
            .unwrap();

        assert!(resp.status().is_redirection(), "{path}");
        assert_eq!(resp.headers()[header::LOCATION], "/auth/login", "{path}");
    }
}

#[tokio::test]
async fn test_admin_api_rejects_anonymous_requests_with_json() {
    let resp = lazy_router()
        .oneshot(request("GET", "/api/admin/orders", Body::empty()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn test_supplier_and_default_address_endpoints_require_login() {
    for (method, path) in [
        ("GET", "/api/admin/suppliers"),
        ("POST", "/api/account/addresses/7/default"),
    ] {
        let resp = lazy_router()
            .oneshot(request(method, path, Body::empty()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{method} {path}");
        let body = json_body(resp).await;
        assert_eq!(body["error"]["code"], "unauthorized");
    }
}

#[tokio::test]
async fn test_unknown_api_path_is_json_not_found() {
    let resp = lazy_router()
        .oneshot(request("GET", "/api/does-not-exist", Body::empty()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_unknown_page_renders_html_not_found() {
    let resp = lazy_router()
        .oneshot(request("GET", "/no-such-page", Body::empty()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"), "{content_type}");
}

#[tokio::test]
async fn test_login_page_renders_for_anonymous_visitor() {
    let resp = lazy_router()
        .oneshot(request("GET", "/auth/login", Body::empty()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "private, no-cache");
    assert!(
        !resp.headers().contains_key(header::SET_COOKIE),
        "an untouched session must not set a cookie"
    );
    let body = text_body(resp).await;
    assert!(body.contains(r#"action="/auth/login""#));
}

#[tokio::test]
async fn test_login_page_shows_error_message() {
    let resp = lazy_router()
        .oneshot(request(
            "GET",
            "/auth/login?error=Invalid+email+or+password",
            Body::empty(),
        ))
        .await
        .unwrap();

    let body = text_body(resp).await;
    assert!(body.contains("Invalid email or password"));
}

#[tokio::test]
async fn test_checkout_success_without_session_id_is_bad_request() {
    let resp = lazy_router()
        .oneshot(request("GET", "/checkout/success", Body::empty()))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
