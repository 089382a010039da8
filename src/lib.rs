//! Storefront API Library
//!
//! Product catalog + admin surface, Stripe-hosted checkout, and the
//! webhook-driven order reconciliation core.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use config::AppConfig;
use events::EventSender;
use services::{
    catalog::CatalogService, checkout::CheckoutClient, images::ImageStore,
    notifications::NotificationSink, orders::OrderService, reconciliation::WebhookReconciler,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
}

/// Services layer that encapsulates business logic used by HTTP handlers.
/// Every collaborator is constructed here and injected; nothing is a
/// process-wide singleton.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub checkout: Arc<CheckoutClient>,
    pub images: ImageStore,
    pub reconciler: Arc<WebhookReconciler>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        notifier: Arc<dyn NotificationSink>,
        config: &AppConfig,
    ) -> Self {
        let catalog = CatalogService::new(db.clone(), event_sender.clone());
        let orders = OrderService::new(db, event_sender);
        let checkout = Arc::new(CheckoutClient::new(
            config.stripe_secret_key.clone(),
            config.stripe_api_base.clone(),
            config.checkout_currency.clone(),
        ));
        let images = ImageStore::new(config.upload_dir.clone());
        let reconciler = Arc::new(WebhookReconciler::new(
            orders.clone(),
            catalog.clone(),
            notifier,
            config.stripe_webhook_secret.clone(),
            config.stripe_webhook_tolerance_secs,
        ));

        Self {
            catalog,
            orders,
            checkout,
            images,
            reconciler,
        }
    }
}

// Common response wrapper
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

/// Full application route set
pub fn api_routes() -> Router<AppState> {
    handlers::routes()
}
