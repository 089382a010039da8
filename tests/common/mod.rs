//! Test harness: real router over an in-memory SQLite database, with a
//! recording notification sink standing in for SMTP.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    config::AppConfig,
    db,
    entities::{order, product},
    events::{self, EventSender},
    services::notifications::{NotificationError, NotificationSink},
    services::orders::OrderResponse,
    services::reconciliation::sign_payload,
    AppServices, AppState,
};

pub const ADMIN_PASSWORD: &str = "test-admin-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotification {
    SaleAlert { order_id: Uuid },
    Receipt { to: String },
}

/// Notification sink that records instead of sending.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().expect("sink lock").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_sale_alert(&self, order: &OrderResponse) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("sink lock")
            .push(SentNotification::SaleAlert { order_id: order.id });
        Ok(())
    }

    async fn send_receipt(
        &self,
        _order: &OrderResponse,
        to: &str,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("sink lock")
            .push(SentNotification::Receipt { to: to.to_string() });
        Ok(())
    }
}

/// Helper harness for spinning up application state backed by an in-memory
/// SQLite database.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub notifications: Arc<RecordingSink>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        // The Stripe base points nowhere; tests that need the checkout
        // initiator use `with_stripe_base` and a mock server.
        Self::with_stripe_base("http://127.0.0.1:9").await
    }

    pub async fn with_stripe_base(stripe_base: &str) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:",
            ADMIN_PASSWORD,
            "sk_test_123",
            WEBHOOK_SECRET,
            "127.0.0.1",
            0,
            "test",
        );
        // A single pooled connection keeps the in-memory database alive and
        // shared for the lifetime of the test.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.stripe_api_base = stripe_base.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let notifications = Arc::new(RecordingSink::default());
        let sink: Arc<dyn NotificationSink> = notifications.clone();

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), sink, &cfg);
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = storefront_api::api_routes().with_state(state.clone());

        Self {
            router,
            state,
            notifications,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.send(method, uri, body, false).await
    }

    pub async fn request_admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.send(method, uri, body, true).await
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>, admin: bool) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if admin {
            builder = builder.header("x-admin-auth", ADMIN_PASSWORD);
        }

        let request = match body {
            Some(value) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router call is infallible")
    }

    /// Posts a signed webhook event.
    pub async fn post_webhook(&self, payload: &Value) -> Response {
        let body = payload.to_string().into_bytes();
        let signature = sign_payload(&body, WEBHOOK_SECRET, chrono::Utc::now().timestamp());
        self.post_webhook_raw(body, Some(&signature)).await
    }

    pub async fn post_webhook_raw(&self, body: Vec<u8>, signature: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header(CONTENT_TYPE, "application/json");
        if let Some(sig) = signature {
            builder = builder.header("stripe-signature", sig);
        }

        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).expect("request"))
            .await
            .expect("router call is infallible")
    }

    /// Inserts a product directly into the store.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        let now = chrono::Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            description: Set(format!("{name} description")),
            image: Set(None),
            stock: Set(stock),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        model.insert(&*self.state.db).await.expect("seed product")
    }

    pub async fn product_stock(&self, id: Uuid) -> i32 {
        product::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("stock query")
            .expect("product exists")
            .stock
    }

    pub async fn order_count(&self) -> usize {
        order::Entity::find()
            .all(&*self.state.db)
            .await
            .expect("order query")
            .len()
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// A `checkout.session.completed` event envelope carrying a serialized cart
/// in its metadata, the way the session initiator embeds it.
pub fn checkout_completed_event(
    session_id: &str,
    amount_total: i64,
    cart: &Value,
    email: Option<&str>,
) -> Value {
    json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "amount_total": amount_total,
                "customer_details": {
                    "email": email,
                    "name": "Jo Customer",
                    "address": {
                        "line1": "1 Main St",
                        "city": "Toronto",
                        "state": "ON",
                        "postal_code": "M5V 1A1",
                        "country": "CA"
                    }
                },
                "metadata": { "items": cart.to_string() }
            }
        }
    })
}

/// Builds a multipart/form-data request for the admin product endpoints.
pub fn multipart_request(
    method: Method,
    uri: &str,
    admin: bool,
    fields: &[(&str, &str)],
    file: Option<(&str, &[u8])>,
) -> Request<Body> {
    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let mut body: Vec<u8> = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    if let Some((filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        );
    if admin {
        builder = builder.header("x-admin-auth", ADMIN_PASSWORD);
    }

    builder.body(Body::from(body)).expect("multipart request")
}
