use crate::{
    db::DbPool,
    entities::product::{
        self, ActiveModel as ProductActiveModel, Entity as ProductEntity, Model as ProductModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Fields for a new catalog product.
#[derive(Debug, Clone)]
pub struct CreateProductInput {
    pub name: String,
    pub price: Decimal,
    pub description: String,
    pub image: Option<String>,
    pub stock: i32,
}

/// Partial update; only provided fields change. `image` replaces the stored
/// reference when present.
#[derive(Debug, Clone, Default)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub stock: Option<i32>,
}

/// Service for the persisted product catalog
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl CatalogService {
    /// Creates a new catalog service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Lists all products, newest first
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        let db = &*self.db_pool;

        ProductEntity::find()
            .order_by_desc(product::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list products");
                ServiceError::DatabaseError(e)
            })
    }

    /// Retrieves a product by id
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(
        &self,
        product_id: Uuid,
    ) -> Result<Option<ProductModel>, ServiceError> {
        let db = &*self.db_pool;

        ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product");
                ServiceError::DatabaseError(e)
            })
    }

    /// Creates a new catalog product
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        validate_name(&input.name)?;
        validate_price(&input.price)?;
        validate_stock(input.stock)?;

        let db = &*self.db_pool;
        let now = Utc::now();
        let product_id = Uuid::new_v4();

        let active_model = ProductActiveModel {
            id: Set(product_id),
            name: Set(input.name.trim().to_string()),
            price: Set(input.price),
            description: Set(input.description),
            image: Set(input.image),
            stock: Set(input.stock),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let model = active_model.insert(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to create product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, "Product created");

        if let Err(e) = self.event_sender.send(Event::ProductCreated(product_id)).await {
            warn!(error = %e, product_id = %product_id, "Failed to send product created event");
        }

        Ok(model)
    }

    /// Applies a partial update to an existing product
    #[instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let db = &*self.db_pool;

        let existing = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        let mut active_model: ProductActiveModel = existing.into();

        if let Some(name) = input.name {
            validate_name(&name)?;
            active_model.name = Set(name.trim().to_string());
        }
        if let Some(price) = input.price {
            validate_price(&price)?;
            active_model.price = Set(price);
        }
        if let Some(description) = input.description {
            active_model.description = Set(description);
        }
        if let Some(image) = input.image {
            active_model.image = Set(Some(image));
        }
        if let Some(stock) = input.stock {
            validate_stock(stock)?;
            active_model.stock = Set(stock);
        }
        active_model.updated_at = Set(Some(Utc::now()));

        let model = active_model.update(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to update product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, "Product updated");

        if let Err(e) = self.event_sender.send(Event::ProductUpdated(product_id)).await {
            warn!(error = %e, product_id = %product_id, "Failed to send product updated event");
        }

        Ok(model)
    }

    /// Deletes a product. Deleting an absent product is not an error;
    /// returns whether a row was removed.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<bool, ServiceError> {
        let db = &*self.db_pool;

        let result = ProductEntity::delete_by_id(product_id)
            .exec(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to delete product");
                ServiceError::DatabaseError(e)
            })?;

        let deleted = result.rows_affected > 0;
        if deleted {
            info!(product_id = %product_id, "Product deleted");
            if let Err(e) = self.event_sender.send(Event::ProductDeleted(product_id)).await {
                warn!(error = %e, product_id = %product_id, "Failed to send product deleted event");
            }
        }

        Ok(deleted)
    }

    /// Atomically decrements a product's stock by the purchased quantity.
    ///
    /// Issued as a single `UPDATE products SET stock = stock - N WHERE id = ?`
    /// so concurrent purchases of the same product cannot lose updates.
    /// Returns the number of rows affected: 0 means the product no longer
    /// exists, which callers treat as a skippable condition.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity))]
    pub async fn decrement_stock(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<u64, ServiceError> {
        let db = &*self.db_pool;

        let result = ProductEntity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .filter(product::Column::Id.eq(product_id))
            .exec(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to decrement stock");
                ServiceError::DatabaseError(e)
            })?;

        if result.rows_affected > 0 {
            info!(product_id = %product_id, quantity = quantity, "Stock decremented");
            if let Err(e) = self
                .event_sender
                .send(Event::StockDecremented {
                    product_id,
                    quantity,
                })
                .await
            {
                warn!(error = %e, product_id = %product_id, "Failed to send stock decremented event");
            }
        }

        Ok(result.rows_affected)
    }
}

fn validate_name(name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "Product name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_price(price: &Decimal) -> Result<(), ServiceError> {
    if *price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Product price cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_stock(stock: i32) -> Result<(), ServiceError> {
    if stock < 0 {
        return Err(ServiceError::ValidationError(
            "Product stock cannot be negative".to_string(),
        ));
    }
    Ok(())
}
