//! Seed script - wipes the catalog and inserts the starter products.
//!
//! Run with: cargo run --bin seed

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, Set};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use storefront_api::entities::product;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://storefront.db?mode=rwc".to_string());

    let mut options = ConnectOptions::new(database_url.clone());
    options
        .max_connections(5)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10));

    info!("Connecting to database: {}", database_url);
    let db = Database::connect(options).await?;

    storefront_api::db::run_migrations(&db).await?;

    // Clears the existing catalog before inserting
    let removed = product::Entity::delete_many().exec(&db).await?;
    info!("Removed {} existing products", removed.rows_affected);

    let starter: &[(&str, Decimal, &str, &str)] = &[
        (
            "Lavender Essential Oil",
            dec!(14.99),
            "/images/lavender.jpg",
            "Relaxing, calming lavender essential oil.",
        ),
        (
            "Peppermint Essential Oil",
            dec!(12.49),
            "/images/peppermint.jpg",
            "Refreshing peppermint essential oil.",
        ),
        (
            "Rose Hydrosol",
            dec!(9.99),
            "/images/rose-hydrosol.jpg",
            "Gentle, soothing floral hydrosol.",
        ),
    ];

    let now = Utc::now();
    for (name, price, image, description) in starter {
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set((*name).to_string()),
            price: Set(*price),
            description: Set((*description).to_string()),
            image: Set(Some((*image).to_string())),
            stock: Set(0),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        let inserted = model.insert(&db).await?;
        info!(product_id = %inserted.id, name = %inserted.name, "Seeded product");
    }

    info!("Catalog seeded successfully");
    Ok(())
}
