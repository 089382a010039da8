use crate::{
    errors::ServiceError,
    handlers::products::ProductResponse,
    services::{
        catalog::{CreateProductInput, UpdateProductInput},
        orders::OrderResponse,
        reconciliation::constant_time_eq,
    },
    ApiResponse, AppState,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Multipart, Path, State},
    http::request::Parts,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Header carrying the shared admin secret.
pub const ADMIN_AUTH_HEADER: &str = "x-admin-auth";

/// Extractor gating the admin surface: the request must carry the
/// configured shared secret. All-or-nothing; no sessions.
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let sent = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !sent.is_empty() && constant_time_eq(sent, &state.config.admin_password) {
            Ok(AdminAuth)
        } else {
            Err(ServiceError::Unauthorized(
                "missing or invalid admin credentials".to_string(),
            ))
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: Option<String>,
}

/// Check the admin password
#[utoipa::path(
    post,
    path = "/api/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Password accepted"),
        (status = 400, description = "Password missing", body = crate::errors::ErrorResponse),
        (status = 401, description = "Password rejected", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, ServiceError> {
    let password = request
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("Password required".to_string()))?;

    if constant_time_eq(&password, &state.config.admin_password) {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(ServiceError::Unauthorized(
            "invalid admin password".to_string(),
        ))
    }
}

/// List all products (admin view)
#[utoipa::path(
    get,
    path = "/api/admin/products",
    responses(
        (status = 200, description = "All catalog products", body = crate::ApiResponse<Vec<ProductResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn list_products(
    _admin: AdminAuth,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProductResponse>>>, ServiceError> {
    let products = state.services.catalog.list_products().await?;

    Ok(Json(ApiResponse::success(
        products.into_iter().map(ProductResponse::from).collect(),
    )))
}

/// Get a single product (admin view)
#[utoipa::path(
    get,
    path = "/api/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "The product", body = crate::ApiResponse<ProductResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn get_product(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let product = state
        .services
        .catalog
        .get_product(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

    Ok(Json(ApiResponse::success(product.into())))
}

/// Create a product from multipart form data, optionally with an image file
#[utoipa::path(
    post,
    path = "/api/admin/products",
    responses(
        (status = 200, description = "Created product", body = crate::ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid form data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn create_product(
    _admin: AdminAuth,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let form = read_product_form(multipart).await?;

    let name = form
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ServiceError::ValidationError("name is required".to_string()))?;
    let price = form
        .price
        .ok_or_else(|| ServiceError::ValidationError("price is required".to_string()))?;

    let image = resolve_image(&state, form.image_url, form.upload).await?;

    let product = state
        .services
        .catalog
        .create_product(CreateProductInput {
            name,
            price,
            description: form.description.unwrap_or_default(),
            image,
            stock: form.stock.unwrap_or(0),
        })
        .await?;

    Ok(Json(ApiResponse::success(product.into())))
}

/// Update a product; only provided form fields change
#[utoipa::path(
    put,
    path = "/api/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Updated product", body = crate::ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid form data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn update_product(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let form = read_product_form(multipart).await?;

    let image = resolve_image(&state, form.image_url, form.upload).await?;

    let product = state
        .services
        .catalog
        .update_product(
            id,
            UpdateProductInput {
                name: form.name,
                price: form.price,
                description: form.description,
                image,
                stock: form.stock,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(product.into())))
}

/// Delete a product
#[utoipa::path(
    delete,
    path = "/api/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Deleted (idempotent)"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn delete_product(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ServiceError> {
    // Deleting an already-absent product still reports success.
    state.services.catalog.delete_product(id).await?;
    Ok(Json(json!({ "success": true })))
}

/// List all orders, newest first
#[utoipa::path(
    get,
    path = "/api/admin/orders",
    responses(
        (status = 200, description = "All orders with line items", body = crate::ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn list_orders(
    _admin: AdminAuth,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state.services.orders.list_orders().await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Get a single order
#[utoipa::path(
    get,
    path = "/api/admin/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order", body = crate::ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn get_order(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

    Ok(Json(ApiResponse::success(order)))
}

/// Accumulated multipart fields for product create/update.
#[derive(Debug, Default)]
struct ProductForm {
    name: Option<String>,
    price: Option<Decimal>,
    description: Option<String>,
    stock: Option<i32>,
    image_url: Option<String>,
    upload: Option<(String, Vec<u8>)>,
}

async fn read_product_form(mut multipart: Multipart) -> Result<ProductForm, ServiceError> {
    let mut form = ProductForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(format!("invalid multipart payload: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => form.name = Some(read_text(field).await?),
            "description" => form.description = Some(read_text(field).await?),
            "price" => {
                let raw = read_text(field).await?;
                form.price = Some(Decimal::from_str(raw.trim()).map_err(|_| {
                    ServiceError::ValidationError("price must be a decimal number".to_string())
                })?);
            }
            "stock" => {
                let raw = read_text(field).await?;
                form.stock = Some(raw.trim().parse::<i32>().map_err(|_| {
                    ServiceError::ValidationError("stock must be an integer".to_string())
                })?);
            }
            "imageUrl" => {
                let raw = read_text(field).await?;
                if !raw.trim().is_empty() {
                    form.image_url = Some(raw.trim().to_string());
                }
            }
            "image" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(|e| {
                    ServiceError::BadRequest(format!("failed to read uploaded image: {e}"))
                })?;
                if !data.is_empty() {
                    form.upload = Some((filename, data.to_vec()));
                }
            }
            // Unknown fields are drained and ignored
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ServiceError> {
    field
        .text()
        .await
        .map_err(|e| ServiceError::BadRequest(format!("invalid multipart field: {e}")))
}

/// An explicit imageUrl wins over an uploaded file; an uploaded file is
/// stored and referenced by path.
async fn resolve_image(
    state: &AppState,
    image_url: Option<String>,
    upload: Option<(String, Vec<u8>)>,
) -> Result<Option<String>, ServiceError> {
    match (image_url, upload) {
        (Some(url), _) => Ok(Some(url)),
        (None, Some((filename, data))) => {
            Ok(Some(state.services.images.store(&filename, &data).await?))
        }
        (None, None) => Ok(None),
    }
}
