use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

/// One cart entry as submitted by the storefront. The same shape is
/// serialized into the session metadata so the webhook reconciler can
/// rebuild the cart without a separate lookup.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

/// Provider-issued session handle returned to the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted payment page the browser should redirect to.
    pub url: Option<String>,
}

/// Metadata key under which the serialized cart travels with the session.
pub const CART_METADATA_KEY: &str = "items";

/// Client for creating Stripe-hosted checkout sessions.
///
/// Talks to the form-encoded REST API directly; holds no state beyond the
/// HTTP client and configuration.
#[derive(Clone)]
pub struct CheckoutClient {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
    currency: String,
}

impl CheckoutClient {
    pub fn new(secret_key: String, api_base: String, currency: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            api_base,
            currency,
        }
    }

    /// Creates a hosted checkout session for the given cart.
    ///
    /// `origin` is the storefront origin used to build the success/cancel
    /// redirect URLs.
    #[instrument(skip(self, items, prefill_email), fields(item_count = items.len()))]
    pub async fn create_session(
        &self,
        items: &[CartItem],
        prefill_email: Option<&str>,
        origin: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        validate_cart(items)?;

        let params = self.session_params(items, prefill_email, origin)?;

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, Some(""))
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("Stripe API request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %error_text, "Stripe rejected checkout session request");
            return Err(ServiceError::ExternalServiceError(format!(
                "Stripe error ({status}): {error_text}"
            )));
        }

        let session: CheckoutSession = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Failed to parse Stripe response: {e}"))
        })?;

        info!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    /// Builds the form parameters for a session-create call. Split out so
    /// the encoding is unit-testable without a network.
    pub fn session_params(
        &self,
        items: &[CartItem],
        prefill_email: Option<&str>,
        origin: &str,
    ) -> Result<Vec<(String, String)>, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            (
                "success_url".into(),
                format!("{origin}/success.html?session_id={{CHECKOUT_SESSION_ID}}"),
            ),
            ("cancel_url".into(), format!("{origin}/cart.html")),
            ("billing_address_collection".into(), "auto".into()),
        ];

        for (i, item) in items.iter().enumerate() {
            params.push((
                format!("line_items[{i}][price_data][currency]"),
                self.currency.clone(),
            ));
            params.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.name.clone(),
            ));
            params.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                unit_amount(item.price).to_string(),
            ));
            params.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }

        // The full cart rides along as metadata so the webhook can
        // reconstruct line items without another catalog round-trip.
        let serialized_cart = serde_json::to_string(items)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        params.push((format!("metadata[{CART_METADATA_KEY}]"), serialized_cart));

        if let Some(email) = prefill_email {
            params.push(("customer_email".into(), email.to_string()));
        }

        Ok(params)
    }
}

/// Converts a decimal price to integer minor currency units.
pub fn unit_amount(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

/// Rejects empty carts and entries that are not positive, well-formed line
/// items.
pub fn validate_cart(items: &[CartItem]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "Cart is empty or invalid".to_string(),
        ));
    }

    for item in items {
        if item.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Cart item name must not be empty".to_string(),
            ));
        }
        if !item.price.is_finite() || item.price <= 0.0 {
            return Err(ServiceError::ValidationError(format!(
                "Cart item '{}' has an invalid price",
                item.name
            )));
        }
        if item.quantity == 0 {
            return Err(ServiceError::ValidationError(format!(
                "Cart item '{}' has an invalid quantity",
                item.name
            )));
        }
    }

    Ok(())
}
