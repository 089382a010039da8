use crate::{errors::ServiceError, services::reconciliation::ReconcileOutcome, AppState};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::info;

/// Inbound payment-provider webhook.
///
/// The raw body is required: signature verification runs over the exact
/// bytes the provider signed, before any JSON parsing.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order persistence failed; provider should redeliver", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok());

    let outcome = state.services.reconciler.process(&body, signature).await?;

    if let ReconcileOutcome::Completed { order_id } = &outcome {
        info!(order_id = %order_id, "Webhook reconciliation completed");
    }

    Ok((StatusCode::OK, "ok"))
}
