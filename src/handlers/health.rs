use crate::{db, errors::ServiceError, AppState};
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// Liveness check with a database ping
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Database unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    db::check_connection(&state.db).await?;
    Ok(Json(json!({ "status": "ok" })))
}
