use crate::{
    errors::ServiceError,
    events::Event,
    services::checkout::{CartItem, CheckoutSession},
    AppState,
};
use axum::{extract::State, http::header::ORIGIN, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCheckoutSessionRequest {
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Optional prefill so the provider can address the receipt.
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateCheckoutSessionResponse {
    pub url: Option<String>,
    pub id: String,
}

/// Create a hosted checkout session for the submitted cart
#[utoipa::path(
    post,
    path = "/create-checkout-session",
    request_body = CreateCheckoutSessionRequest,
    responses(
        (status = 200, description = "Redirect target for the hosted payment page", body = CreateCheckoutSessionResponse),
        (status = 400, description = "Empty or malformed cart", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCheckoutSessionRequest>,
) -> Result<Json<CreateCheckoutSessionResponse>, ServiceError> {
    let origin = headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(state.config.checkout_origin.as_str());

    let session: CheckoutSession = state
        .services
        .checkout
        .create_session(&request.items, request.email.as_deref(), origin)
        .await?;

    if let Err(e) = state
        .event_sender
        .send(Event::CheckoutSessionCreated {
            session_id: session.id.clone(),
        })
        .await
    {
        warn!(error = %e, "Failed to send checkout session created event");
    }

    Ok(Json(CreateCheckoutSessionResponse {
        url: session.url,
        id: session.id,
    }))
}
