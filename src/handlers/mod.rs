pub mod admin;
pub mod checkout;
pub mod health;
pub mod products;
pub mod webhooks;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// Assembles every HTTP route. The admin surface is protected per-handler
/// by the [`admin::AdminAuth`] extractor rather than a router-wide layer so
/// `/api/admin/login` stays reachable without the shared secret.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/create-checkout-session",
            post(checkout::create_checkout_session),
        )
        .route("/webhook", post(webhooks::stripe_webhook))
        .route("/api/products", get(products::list_products))
        .route("/api/products/:id", get(products::get_product))
        .route("/api/admin/login", post(admin::login))
        .route(
            "/api/admin/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/api/admin/products/:id",
            get(admin::get_product)
                .put(admin::update_product)
                .delete(admin::delete_product),
        )
        .route("/api/admin/orders", get(admin::list_orders))
        .route("/api/admin/orders/:id", get(admin::get_order))
}
