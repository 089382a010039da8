//! Integration tests for the webhook reconciliation flow: authenticity,
//! event filtering, idempotent order creation, tolerant stock decrement,
//! and notification dispatch.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    checkout_completed_event, response_json, SentNotification, TestApp, WEBHOOK_SECRET,
};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::services::reconciliation::sign_payload;

#[tokio::test]
async fn rejects_invalid_signature_without_side_effects() {
    let app = TestApp::new().await;
    let product = app.seed_product("Lavender Oil", dec!(14.99), 10).await;

    let cart = json!([{ "id": product.id, "name": "Lavender Oil", "price": 14.99, "quantity": 2 }]);
    let event = checkout_completed_event("sess_bad_sig", 2998, &cart, None);
    let body = event.to_string().into_bytes();

    // Signed with the wrong secret
    let signature = sign_payload(&body, "whsec_wrong_secret", chrono::Utc::now().timestamp());
    let response = app.post_webhook_raw(body, Some(&signature)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.product_stock(product.id).await, 10);
    assert!(app.notifications.sent().is_empty());
}

#[tokio::test]
async fn rejects_missing_signature_header() {
    let app = TestApp::new().await;

    let event = checkout_completed_event("sess_no_sig", 1000, &json!([]), None);
    let response = app
        .post_webhook_raw(event.to_string().into_bytes(), None)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn rejects_stale_signature_timestamp() {
    let app = TestApp::new().await;

    let event = checkout_completed_event("sess_stale", 1000, &json!([]), None);
    let body = event.to_string().into_bytes();
    let stale = chrono::Utc::now().timestamp() - 3600;
    let signature = sign_payload(&body, WEBHOOK_SECRET, stale);

    let response = app.post_webhook_raw(body, Some(&signature)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn acknowledges_non_actionable_event_types_without_side_effects() {
    let app = TestApp::new().await;
    let product = app.seed_product("Peppermint Oil", dec!(12.49), 5).await;

    let event = json!({
        "id": "evt_other",
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_123" } }
    });
    let response = app.post_webhook(&event).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.product_stock(product.id).await, 5);
    assert!(app.notifications.sent().is_empty());
}

#[tokio::test]
async fn completed_checkout_creates_order_and_decrements_stock() {
    let app = TestApp::new().await;
    let product = app.seed_product("Lavender Oil", dec!(14.99), 10).await;

    let cart = json!([{
        "id": product.id,
        "name": "Lavender Oil",
        "price": 14.99,
        "quantity": 2
    }]);
    let event = checkout_completed_event("sess_1", 2998, &cart, Some("jo@example.com"));

    let response = app.post_webhook(&event).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Exactly one order, with the event's authoritative total and the
    // line-item snapshot
    let list = app
        .request_admin(Method::GET, "/api/admin/orders", None)
        .await;
    assert_eq!(list.status(), StatusCode::OK);
    let body = response_json(list).await;
    let orders = body["data"].as_array().expect("orders array");
    assert_eq!(orders.len(), 1);

    let order = &orders[0];
    assert_eq!(order["checkout_session_id"], "sess_1");
    assert_eq!(order["amount_total"], 2998);
    assert_eq!(order["status"], "paid");
    assert_eq!(order["customer_email"], "jo@example.com");
    assert_eq!(order["customer_name"], "Jo Customer");
    assert_eq!(order["customer_address"]["line1"], "1 Main St");
    assert_eq!(order["customer_address"]["line2"], "");

    let items = order["items"].as_array().expect("items array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], product.id.to_string());
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(items[0]["unit_price"], "14.99");

    // Stock decremented by the purchased quantity
    assert_eq!(app.product_stock(product.id).await, 8);

    // Sale alert plus customer receipt
    let sent = app.notifications.sent();
    assert_eq!(sent.len(), 2);
    assert!(matches!(sent[0], SentNotification::SaleAlert { .. }));
    assert_eq!(
        sent[1],
        SentNotification::Receipt {
            to: "jo@example.com".to_string()
        }
    );
}

#[tokio::test]
async fn replayed_event_reconciles_exactly_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("Lavender Oil", dec!(14.99), 10).await;

    let cart = json!([{
        "id": product.id,
        "name": "Lavender Oil",
        "price": 14.99,
        "quantity": 2
    }]);
    let event = checkout_completed_event("sess_1", 2998, &cart, Some("jo@example.com"));

    let first = app.post_webhook(&event).await;
    assert_eq!(first.status(), StatusCode::OK);

    // The provider redelivers the same event
    let second = app.post_webhook(&event).await;
    assert_eq!(second.status(), StatusCode::OK);

    assert_eq!(app.order_count().await, 1);
    // Stock decremented once, not twice
    assert_eq!(app.product_stock(product.id).await, 8);
    // No duplicate notifications
    assert_eq!(app.notifications.sent().len(), 2);
}

#[tokio::test]
async fn missing_product_is_skipped_without_blocking_the_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("Rose Hydrosol", dec!(9.99), 7).await;

    let cart = json!([
        { "id": "P_DELETED", "name": "Discontinued Oil", "price": 5.00, "quantity": 1 },
        { "id": product.id, "name": "Rose Hydrosol", "price": 9.99, "quantity": 3 }
    ]);
    let event = checkout_completed_event("sess_2", 3497, &cart, None);

    let response = app.post_webhook(&event).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Order persisted with both line items recorded
    let list = app
        .request_admin(Method::GET, "/api/admin/orders", None)
        .await;
    let body = response_json(list).await;
    let orders = body["data"].as_array().expect("orders array");
    assert_eq!(orders.len(), 1);
    let items = orders[0]["items"].as_array().expect("items array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["product_id"], "P_DELETED");

    // The existing product still decremented
    assert_eq!(app.product_stock(product.id).await, 4);
}

#[tokio::test]
async fn malformed_cart_metadata_is_acknowledged_and_dropped() {
    let app = TestApp::new().await;

    let event = json!({
        "id": "evt_malformed",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "sess_malformed",
                "amount_total": 1000,
                "metadata": { "items": "{not json" }
            }
        }
    });
    let response = app.post_webhook(&event).await;

    // Malformed cart metadata is acknowledged and dropped, never retried
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order_count().await, 0);
    assert!(app.notifications.sent().is_empty());
}

#[tokio::test]
async fn event_without_cart_metadata_creates_an_empty_order() {
    let app = TestApp::new().await;

    let event = json!({
        "id": "evt_no_metadata",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "sess_no_metadata",
                "amount_total": 500
            }
        }
    });
    let response = app.post_webhook(&event).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order_count().await, 1);

    let list = app
        .request_admin(Method::GET, "/api/admin/orders", None)
        .await;
    let body = response_json(list).await;
    let order = &body["data"][0];
    assert_eq!(order["amount_total"], 500);
    assert!(order["items"].as_array().expect("items").is_empty());
    // Absent customer details default to empty address fields
    assert_eq!(order["customer_address"]["line1"], "");
    assert!(order["customer_email"].is_null());
}
