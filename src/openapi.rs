use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
Backend for a small storefront: public catalog reads, Stripe-hosted
checkout, a provider webhook that reconciles completed payments into
orders, and a shared-secret admin surface for catalog CRUD and order
review.

Admin endpoints require the configured secret in the `x-admin-auth`
header.
"#
    ),
    tags(
        (name = "Catalog", description = "Public product reads"),
        (name = "Checkout", description = "Hosted checkout session creation"),
        (name = "Webhooks", description = "Inbound payment provider events"),
        (name = "Admin", description = "Shared-secret catalog and order administration"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Public catalog
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,

        // Checkout
        crate::handlers::checkout::create_checkout_session,

        // Webhooks
        crate::handlers::webhooks::stripe_webhook,

        // Admin
        crate::handlers::admin::login,
        crate::handlers::admin::list_products,
        crate::handlers::admin::get_product,
        crate::handlers::admin::create_product,
        crate::handlers::admin::update_product,
        crate::handlers::admin::delete_product,
        crate::handlers::admin::list_orders,
        crate::handlers::admin::get_order,

        // Health
        crate::handlers::health::health,
    ),
    components(schemas(
        crate::ApiResponse<serde_json::Value>,
        crate::errors::ErrorResponse,
        crate::handlers::products::ProductResponse,
        crate::handlers::checkout::CreateCheckoutSessionRequest,
        crate::handlers::checkout::CreateCheckoutSessionResponse,
        crate::handlers::admin::LoginRequest,
        crate::services::checkout::CartItem,
        crate::services::checkout::CheckoutSession,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderItemResponse,
        crate::services::orders::AddressResponse,
        crate::entities::order::OrderStatus,
    ))
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
