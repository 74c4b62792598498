mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{response_json, TestApp};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn catalog_and_health_are_public() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/v1/catalog", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert!(entries
        .iter()
        .any(|e| e["process_category"] == "sizing" && e["material"] == "cotton"));

    let (status, body) = app.call(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app.call(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn booking_endpoints_require_a_token() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/v1/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = app
        .call(Method::GET, "/api/v1/bookings", None, Some("not-a-jwt"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/payments/verify",
            Some(json!({})),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reconciliation_is_admin_only() {
    let app = TestApp::new().await;
    let customer = app.customer_token();

    for uri in [
        "/api/v1/admin/reconciliation/alerts",
        "/api/v1/admin/reconciliation/orphans",
    ] {
        let (status, _) = app.call(Method::GET, uri, None, Some(&customer)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }

    let (status, _) = app
        .call(
            Method::GET,
            "/api/v1/admin/reconciliation/alerts",
            None,
            Some(&app.admin_token()),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/bookings")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from("{\"process_category\": \"sizing\","))
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Bad Request");

    // Well-formed JSON of the wrong shape is rejected the same way.
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/payments/order",
            Some(json!({ "booking_id": "not-a-uuid", "amount": "10" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/bookings/not-a-uuid", None, Some(&app.customer_token()))
        .await;
    assert!(response.headers().contains_key("x-request-id"));

    let response = app
        .request(Method::GET, "/api/v1/bookings", None, None)
        .await;
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response_json(response).await;
    assert_eq!(body["request_id"].as_str().map(str::to_string), request_id);
}

#[tokio::test]
async fn unknown_booking_is_not_found() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/bookings/{}", uuid::Uuid::new_v4()),
            None,
            Some(&app.customer_token()),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/bookings"].is_object());
}
