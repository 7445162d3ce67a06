//! Stripe webhook route tests.
//!
//! Only events that never reach the database are sent, so these run without
//! one; order creation from webhook payloads is covered in `checkout.rs`.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::StatusCode;
use chrono::Utc;
use tower::ServiceExt;

use nestling_integration_tests::{WEBHOOK_SECRET, json_body, lazy_router, request};
use nestling_storefront::integrations::stripe::SIGNATURE_HEADER;
use nestling_storefront::integrations::stripe::webhook::sign;

const IGNORED_EVENT: &str =
    r#"{"id":"evt_test_1","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;

fn signed(payload: &str, timestamp: i64, secret: &str) -> axum::http::Request<Body> {
    let ts = timestamp.to_string();
    let signature = sign(secret, &ts, payload.as_bytes()).unwrap();
    let mut req = request("POST", "/api/webhooks/stripe", Body::from(payload.to_string()));
    req.headers_mut().insert(
        SIGNATURE_HEADER,
        format!("t={ts},v1={signature}").parse().unwrap(),
    );
    req
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let resp = lazy_router()
        .oneshot(request(
            "POST",
            "/api/webhooks/stripe",
            Body::from(IGNORED_EVENT),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let resp = lazy_router()
        .oneshot(signed(IGNORED_EVENT, Utc::now().timestamp(), "whsec_someone_else"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stale_timestamp_is_rejected() {
    let an_hour_ago = Utc::now().timestamp() - 3600;
    let resp = lazy_router()
        .oneshot(signed(IGNORED_EVENT, an_hour_ago, WEBHOOK_SECRET))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let mut req = signed(IGNORED_EVENT, Utc::now().timestamp(), WEBHOOK_SECRET);
    *req.body_mut() = Body::from(IGNORED_EVENT.replace("cus_1", "cus_2"));

    let resp = lazy_router().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unhandled_event_type_is_acknowledged() {
    let resp = lazy_router()
        .oneshot(signed(IGNORED_EVENT, Utc::now().timestamp(), WEBHOOK_SECRET))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["received"], true);
    assert_eq!(body["outcome"], "ignored");
}

#[tokio::test]
async fn test_handled_event_with_wrong_shape_is_rejected() {
    let payload = r#"{"id":"evt_test_2","type":"checkout.session.completed","data":{"object":{"unexpected":true}}}"#;
    let resp = lazy_router()
        .oneshot(signed(payload, Utc::now().timestamp(), WEBHOOK_SECRET))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
