//! End-to-end booking and payment flows through the HTTP router.
//!
//! Tests cover:
//! - Pricing a booking from the catalog
//! - Opening a gateway order and verifying its result
//! - Failed, abandoned and retried checkouts
//! - Replayed verification callbacks

mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use common::{decimal, GatewayMode, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn paid_booking_moves_to_processing() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "sizing", "Cotton", "10").await;
    assert_eq!(booking["status"], "pending");
    assert_eq!(decimal(&booking["unit_rate"]), dec!(450));
    assert_eq!(decimal(&booking["total"]), dec!(4500));

    let booking_id = booking["id"].as_str().unwrap();
    let (status, body) = app.create_order(&token, booking_id, "4500").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let handoff = body["data"].clone();
    assert_eq!(handoff["amount_minor_units"], 450_000);
    assert_eq!(handoff["currency"], "INR");
    assert_eq!(handoff["key"], "rzp_test_key");
    assert_eq!(handoff["booking_id"], booking_id);

    let payment_id = handoff["payment_id"].as_str().unwrap();
    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/payments/{payment_id}"),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "created");
    assert_eq!(body["data"]["receipt"], booking_id);

    let (status, body) = app.verify(&token, &handoff, "pay_abc", true).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let outcome = &body["data"];
    assert_eq!(outcome["status"], "success");
    assert_eq!(outcome["payment"]["status"], "success");
    assert_eq!(outcome["payment"]["gateway_payment_id"], "pay_abc");
    assert_eq!(outcome["booking"]["status"], "processing");
    assert_eq!(outcome["booking"]["payment_id"], payment_id);
    assert!(outcome["conflict"].is_null());

    let notices = app.wait_for_notifications(1).await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].booking.booking_id.to_string(), booking_id);
    assert_eq!(notices[0].booking.total.round_dp(2), dec!(4500));
    assert_eq!(notices[0].payment.gateway_payment_id, "pay_abc");
    assert_eq!(notices[0].user_email.as_deref(), Some("customer-1@example.com"));
}

#[tokio::test]
async fn client_total_is_display_only() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/bookings",
            Some(json!({
                "process_category": "weaving",
                "material": "  Cotton ",
                "quantity": "3",
                "total": "1"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&body["data"]["unit_rate"]), dec!(38.5));
    assert_eq!(decimal(&body["data"]["total"]), dec!(115.5));
}

#[tokio::test]
async fn unknown_rate_or_bad_quantity_is_rejected() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    for payload in [
        json!({ "process_category": "sizing", "material": "Kevlar", "quantity": "1" }),
        json!({ "process_category": "dyeing", "material": "Cotton", "quantity": "1" }),
        json!({ "process_category": "sizing", "material": "Cotton", "quantity": "0" }),
        json!({ "process_category": "sizing", "material": "Cotton", "quantity": "-2" }),
    ] {
        let (status, body) = app
            .call(Method::POST, "/api/v1/bookings", Some(payload.clone()), Some(&token))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload} -> {body}");
        assert_eq!(body["error"], "Bad Request");
    }
}

#[tokio::test]
async fn oversized_quantity_is_rejected_without_storing_a_booking() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    // The first overflows rate × quantity; the second would price a booking
    // whose total cannot be expressed in paise.
    for quantity in ["70000000000000000000000000000", "10000000000000000000000000"] {
        let payload = json!({ "process_category": "sizing", "material": "Cotton", "quantity": quantity });
        let (status, body) = app
            .call(Method::POST, "/api/v1/bookings", Some(payload), Some(&token))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{quantity} -> {body}");
        assert_eq!(body["error"], "Bad Request");
    }
    assert_eq!(app.booking_rows().await, 0);

    // The service is still answering afterwards.
    let booking = app.start_booking(&token, "sizing", "Cotton", "1000000").await;
    assert_eq!(decimal(&booking["total"]), dec!(450000000));
    let booking_id = booking["id"].as_str().unwrap();
    let (status, body) = app.create_order(&token, booking_id, "450000000").await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn verification_against_unknown_records_is_not_found() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "sizing", "Cotton", "2").await;
    let booking_id = booking["id"].as_str().unwrap();
    let (status, body) = app.create_order(&token, booking_id, "900").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let handoff = body["data"].clone();

    let mut unknown_payment = handoff.clone();
    unknown_payment["payment_id"] = json!(uuid::Uuid::new_v4());
    let (status, body) = app.verify(&token, &unknown_payment, "pay_lost", true).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let mut unknown_booking = handoff.clone();
    unknown_booking["booking_id"] = json!(uuid::Uuid::new_v4());
    let (status, body) = app.verify(&token, &unknown_booking, "pay_lost", true).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    // Another customer's booking is as unknown as a missing one.
    let other = app.token_for("customer-2", &[]);
    let foreign = app.start_booking(&other, "sizing", "Cotton", "1").await;
    let mut foreign_booking = handoff.clone();
    foreign_booking["booking_id"] = foreign["id"].clone();
    let (status, body) = app.verify(&token, &foreign_booking, "pay_lost", true).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let payment_id = handoff["payment_id"].as_str().unwrap();
    let (_, body) = app
        .call(Method::GET, &format!("/api/v1/payments/{payment_id}"), None, Some(&token))
        .await;
    assert_eq!(body["data"]["status"], "created");
    assert!(body["data"]["gateway_payment_id"].is_null());

    let (_, body) = app
        .call(Method::GET, &format!("/api/v1/bookings/{booking_id}"), None, Some(&token))
        .await;
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"]["payment_id"].is_null());

    let (_, body) = app
        .call(Method::GET, &format!("/api/v1/bookings/{}", foreign["id"].as_str().unwrap()), None, Some(&other))
        .await;
    assert_eq!(body["data"]["status"], "pending");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(app.notifications.sent().is_empty());
}

#[tokio::test]
async fn bad_signature_fails_payment_and_cancels_booking() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "sizing", "Cotton", "10").await;
    let booking_id = booking["id"].as_str().unwrap();
    let (_, body) = app.create_order(&token, booking_id, "4500").await;
    let handoff = body["data"].clone();

    let (status, body) = app.verify(&token, &handoff, "pay_bad", false).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "failed");
    assert_eq!(body["data"]["payment"]["status"], "failed");
    assert_eq!(body["data"]["booking"]["status"], "cancelled");

    // A cancelled booking cannot be paid again; a new booking is needed.
    let (status, _) = app.create_order(&token, booking_id, "4500").await;
    assert_eq!(status, StatusCode::CONFLICT);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(app.notifications.sent().is_empty());
}

#[tokio::test]
async fn gateway_failure_leaves_booking_pending_and_no_payment() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "sizing", "Cotton", "10").await;
    let booking_id = booking["id"].as_str().unwrap();

    app.gateway.set_mode(GatewayMode::Timeout);
    let (status, body) = app.create_order(&token, booking_id, "4500").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");
    assert_eq!(app.payment_rows().await, 0);

    let (_, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/bookings/{booking_id}"),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(body["data"]["status"], "pending");

    app.gateway.set_mode(GatewayMode::Accept);
    let (status, body) = app.create_order(&token, booking_id, "4500").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.payment_rows().await, 1);
    assert_eq!(app.gateway.calls(), 2);
}

#[tokio::test]
async fn gateway_amount_mismatch_is_not_recorded() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "sizing", "Silk", "2").await;
    let booking_id = booking["id"].as_str().unwrap();

    app.gateway.set_mode(GatewayMode::WrongAmount);
    let (status, _) = app.create_order(&token, booking_id, "1800").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.payment_rows().await, 0);
}

#[tokio::test]
async fn order_amount_must_match_booking_total() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "sizing", "Cotton", "10").await;
    let booking_id = booking["id"].as_str().unwrap();

    let (status, body) = app.create_order(&token, booking_id, "4499.99").await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(app.gateway.calls(), 0);
    assert_eq!(app.payment_rows().await, 0);
}

#[tokio::test]
async fn abandoned_checkout_is_cancelled_explicitly() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "weaving", "Polyester", "5").await;
    let booking_id = booking["id"].as_str().unwrap();
    let (_, body) = app.create_order(&token, booking_id, "210").await;
    let payment_id = body["data"]["payment_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/v1/bookings/{booking_id}"),
            Some(json!({ "status": "cancelled" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");

    // The gateway order never settled; its payment stays open.
    let (_, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/payments/{payment_id}"),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(body["data"]["status"], "created");

    // Cancelling twice is a state error, not a silent success.
    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/v1/bookings/{booking_id}"),
            Some(json!({ "status": "cancelled" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn replayed_verification_is_idempotent() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "sizing", "Viscose", "4").await;
    let booking_id = booking["id"].as_str().unwrap();
    let (_, body) = app.create_order(&token, booking_id, "1920").await;
    let handoff = body["data"].clone();

    let (first_status, first) = app.verify(&token, &handoff, "pay_once", true).await;
    let (second_status, second) = app.verify(&token, &handoff, "pay_once", true).await;
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second["data"]["status"], "success");
    assert_eq!(second["data"]["booking"]["status"], "processing");
    assert_eq!(first["data"]["payment"]["id"], second["data"]["payment"]["id"]);
    assert_eq!(second["data"]["payment"]["gateway_payment_id"], "pay_once");

    app.wait_for_notifications(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.notifications.sent().len(), 1);
}

#[tokio::test]
async fn settled_failure_is_not_reopened_by_valid_signature() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "sizing", "Cotton", "1").await;
    let booking_id = booking["id"].as_str().unwrap();
    let (_, body) = app.create_order(&token, booking_id, "450").await;
    let handoff = body["data"].clone();

    app.verify(&token, &handoff, "pay_x", false).await;
    let (status, body) = app.verify(&token, &handoff, "pay_x", true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["payment"]["status"], "failed");
    assert_eq!(body["data"]["booking"]["status"], "cancelled");
}

#[tokio::test]
async fn verification_must_match_the_opened_order() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "sizing", "Cotton", "1").await;
    let booking_id = booking["id"].as_str().unwrap();
    let (_, body) = app.create_order(&token, booking_id, "450").await;
    let mut handoff = body["data"].clone();
    handoff["gateway_order_id"] = json!("order_someone_else");

    let (status, _) = app.verify(&token, &handoff, "pay_y", true).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/payments/verify",
            Some(json!({ "gateway_order_id": "order_test_1" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("gateway_payment_id"));
}

#[tokio::test]
async fn bookings_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let owner = app.customer_token();
    let stranger = app.token_for("customer-2", &["customer"]);

    let booking = app.start_booking(&owner, "sizing", "Cotton", "2").await;
    let booking_id = booking["id"].as_str().unwrap();

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/bookings/{booking_id}"),
            None,
            Some(&stranger),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.create_order(&stranger, booking_id, "900").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app
        .call(Method::GET, "/api/v1/bookings", None, Some(&stranger))
        .await;
    assert_eq!(body["data"]["total"], 0);

    let (_, body) = app
        .call(Method::GET, "/api/v1/bookings?status=pending", None, Some(&owner))
        .await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], booking_id);
}

#[tokio::test]
async fn admin_completes_paid_booking() {
    let app = TestApp::new().await;
    let token = app.customer_token();
    let admin = app.admin_token();

    let booking = app.start_booking(&token, "sizing", "Cotton", "1").await;
    let booking_id = booking["id"].as_str().unwrap();
    let uri = format!("/api/v1/bookings/{booking_id}");

    // Pending work cannot be completed.
    let (status, _) = app
        .call(Method::PATCH, &uri, Some(json!({ "status": "completed" })), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.create_order(&token, booking_id, "450").await;
    app.verify(&token, &body["data"], "pay_done", true).await;

    let (status, _) = app
        .call(Method::PATCH, &uri, Some(json!({ "status": "completed" })), Some(&token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::PATCH, &uri, Some(json!({ "status": "processing" })), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(Method::PATCH, &uri, Some(json!({ "status": "completed" })), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "completed");
}

#[tokio::test]
async fn concurrent_verifications_settle_once() {
    let app = TestApp::new().await;
    let token = app.customer_token();

    let booking = app.start_booking(&token, "weaving", "Cotton", "4").await;
    let booking_id = booking["id"].as_str().unwrap();
    let (status, body) = app.create_order(&token, booking_id, "154").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let handoff = body["data"].clone();

    // Two tabs deliver the same gateway callback at once.
    let results = futures::future::join_all(
        (0..4).map(|_| app.verify(&token, &handoff, "pay_race", true)),
    )
    .await;
    for (status, body) in &results {
        assert_eq!(*status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["status"], "success");
        assert!(body["data"]["conflict"].is_null(), "{body}");
    }

    let (_, body) = app
        .call(Method::GET, &format!("/api/v1/bookings/{booking_id}"), None, Some(&token))
        .await;
    assert_eq!(body["data"]["status"], "processing");
    assert_eq!(body["data"]["payment_id"], handoff["payment_id"]);

    app.wait_for_notifications(1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.notifications.sent().len(), 1);
}
