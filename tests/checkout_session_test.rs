//! Integration tests for the checkout session initiator, with the payment
//! provider stubbed by a local mock server.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cart_payload() -> serde_json::Value {
    json!({
        "items": [
            { "id": "p1", "name": "Lavender Oil", "price": 14.99, "quantity": 2 },
            { "id": "p2", "name": "Peppermint Oil", "price": 12.49, "quantity": 1 }
        ],
        "email": "jo@example.com"
    })
}

#[tokio::test]
async fn creates_session_and_returns_redirect_url() {
    let stripe = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        // The serialized cart must travel with the session as metadata
        // ("metadata[items]" form-encoded)
        .and(body_string_contains("metadata%5Bitems%5D"))
        .and(body_string_contains("line_items%5B0%5D%5Bquantity%5D=2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_123",
            "url": "https://checkout.stripe.com/c/pay/cs_test_123"
        })))
        .expect(1)
        .mount(&stripe)
        .await;

    let app = TestApp::with_stripe_base(&stripe.uri()).await;

    let response = app
        .request(Method::POST, "/create-checkout-session", Some(cart_payload()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["id"], "cs_test_123");
    assert_eq!(body["url"], "https://checkout.stripe.com/c/pay/cs_test_123");

    // Initiating checkout never persists an order; that only happens via
    // the webhook.
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn rejects_empty_cart_without_calling_the_provider() {
    let stripe = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_unreachable",
            "url": "https://example.invalid"
        })))
        .expect(0)
        .mount(&stripe)
        .await;

    let app = TestApp::with_stripe_base(&stripe.uri()).await;

    let response = app
        .request(
            Method::POST,
            "/create-checkout-session",
            Some(json!({ "items": [] })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn rejects_non_positive_quantities_and_prices() {
    let app = TestApp::new().await;

    let zero_quantity = json!({
        "items": [{ "id": "p1", "name": "Lavender Oil", "price": 14.99, "quantity": 0 }]
    });
    let response = app
        .request(Method::POST, "/create-checkout-session", Some(zero_quantity))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let negative_price = json!({
        "items": [{ "id": "p1", "name": "Lavender Oil", "price": -1.0, "quantity": 1 }]
    });
    let response = app
        .request(Method::POST, "/create-checkout-session", Some(negative_price))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn provider_failure_maps_to_bad_gateway() {
    let stripe = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": { "message": "Your card was declined." }
        })))
        .mount(&stripe)
        .await;

    let app = TestApp::with_stripe_base(&stripe.uri()).await;

    let response = app
        .request(Method::POST, "/create-checkout-session", Some(cart_payload()))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.order_count().await, 0);
}
