use crate::{
    db::DbPool,
    entities::{
        order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel, OrderStatus},
        order_item::{ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity, Model as OrderItemModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Customer address captured from the payment event. Absent fields are
/// stored as empty strings.
#[derive(Debug, Clone, Default)]
pub struct OrderAddress {
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// One line-item snapshot to persist with the order.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Everything needed to persist an order from a completed checkout.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub checkout_session_id: String,
    pub amount_total: i64,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub address: OrderAddress,
    pub items: Vec<OrderLine>,
}

/// Result of an idempotent order creation attempt.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(OrderModel),
    /// An order for this checkout session already exists; the caller must
    /// treat the event as reconciled and perform no further side effects.
    AlreadyReconciled(OrderModel),
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddressResponse {
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub checkout_session_id: String,
    pub amount_total: i64,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_address: AddressResponse,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

impl OrderResponse {
    pub fn from_model(order: OrderModel, items: Vec<OrderItemModel>) -> Self {
        Self {
            id: order.id,
            checkout_session_id: order.checkout_session_id,
            amount_total: order.amount_total,
            customer_email: order.customer_email,
            customer_name: order.customer_name,
            customer_address: AddressResponse {
                line1: order.address_line1,
                line2: order.address_line2,
                city: order.address_city,
                state: order.address_state,
                postal_code: order.address_postal_code,
                country: order.address_country,
            },
            status: order.status,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    name: item.name,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

/// Service for the persisted order store
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Looks up an order by the provider's checkout session id
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let db = &*self.db_pool;

        OrderEntity::find()
            .filter(order::Column::CheckoutSessionId.eq(session_id))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, session_id = %session_id, "Failed to look up order by session");
                ServiceError::DatabaseError(e)
            })
    }

    /// Persists an order with its line-item snapshots in one transaction.
    ///
    /// The UNIQUE constraint on `checkout_session_id` backstops concurrent
    /// duplicate deliveries: a unique-violation is mapped to
    /// [`CreateOutcome::AlreadyReconciled`] rather than an error.
    #[instrument(skip(self, new_order), fields(session_id = %new_order.checkout_session_id))]
    pub async fn create_from_checkout(
        &self,
        new_order: NewOrder,
    ) -> Result<CreateOutcome, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let session_id = new_order.checkout_session_id.clone();

        let order_active_model = OrderActiveModel {
            id: Set(order_id),
            checkout_session_id: Set(new_order.checkout_session_id),
            amount_total: Set(new_order.amount_total),
            customer_email: Set(new_order.customer_email),
            customer_name: Set(new_order.customer_name),
            address_line1: Set(new_order.address.line1),
            address_line2: Set(new_order.address.line2),
            address_city: Set(new_order.address.city),
            address_state: Set(new_order.address.state),
            address_postal_code: Set(new_order.address.postal_code),
            address_country: Set(new_order.address.country),
            status: Set(OrderStatus::Paid),
            created_at: Set(now),
        };

        let item_models: Vec<OrderItemActiveModel> = new_order
            .items
            .iter()
            .map(|line| OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id.clone()),
                name: Set(line.name.clone()),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
            })
            .collect();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_model = match order_active_model.insert(&txn).await {
            Ok(model) => model,
            Err(e) => {
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    // Lost the race against a concurrent delivery of the same
                    // event; the winner's order is the order.
                    drop(txn);
                    info!(session_id = %session_id, "Order already exists for session");
                    let existing = self
                        .find_by_session(&session_id)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::InternalError(format!(
                                "order for session {session_id} vanished after unique violation"
                            ))
                        })?;
                    return Ok(CreateOutcome::AlreadyReconciled(existing));
                }
                error!(error = %e, order_id = %order_id, "Failed to create order");
                return Err(ServiceError::DatabaseError(e));
            }
        };

        if !item_models.is_empty() {
            OrderItemEntity::insert_many(item_models)
                .exec(&txn)
                .await
                .map_err(|e| {
                    error!(error = %e, order_id = %order_id, "Failed to persist order items");
                    ServiceError::DatabaseError(e)
                })?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, session_id = %session_id, "Order created");

        if let Err(e) = self.event_sender.send(Event::OrderCreated(order_id)).await {
            warn!(error = %e, order_id = %order_id, "Failed to send order created event");
        }

        Ok(CreateOutcome::Created(order_model))
    }

    /// Retrieves an order with its line items
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?;

        let Some(order) = order else {
            return Ok(None);
        };

        let items = order
            .find_related(OrderItemEntity)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order items");
                ServiceError::DatabaseError(e)
            })?;

        Ok(Some(OrderResponse::from_model(order, items)))
    }

    /// Lists all orders with their items, newest first
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let orders = OrderEntity::find()
            .find_with_related(OrderItemEntity)
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list orders");
                ServiceError::DatabaseError(e)
            })?;

        Ok(orders
            .into_iter()
            .map(|(order, items)| OrderResponse::from_model(order, items))
            .collect())
    }

    /// Fetches the full order view for a freshly created order model.
    pub async fn order_with_items(
        &self,
        order: OrderModel,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let items = order
            .find_related(OrderItemEntity)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(OrderResponse::from_model(order, items))
    }
}
