//! Order persistence

use anyhow::{Context, Result};
use async_trait::async_trait;
use iwk_common::types::Order;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

/// Destination for enriched orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist every order in `orders`, or none of them
    async fn create_batch(&self, orders: &[Order]) -> Result<()>;
}

/// Orders written to the `orders` table
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_batch(&self, orders: &[Order]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }

        // Serialize up front so a bad document fails before the transaction opens
        let documents = orders
            .iter()
            .map(|order| -> iwk_common::Result<_> {
                Ok((order.breakdown_json()?, order.jurisdiction_json()?))
            })
            .collect::<iwk_common::Result<Vec<_>>>()
            .context("Failed to serialize order documents")?;

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO orders (
                id, latitude, longitude, subtotal, composite_tax_rate,
                tax_amount, total_amount, breakdown, jurisdictions, timestamp
            )
            "#,
        );

        query_builder.push_values(orders.iter().zip(documents), |mut b, (order, (breakdown, jurisdiction))| {
            b.push_bind(order.id)
                .push_bind(order.latitude)
                .push_bind(order.longitude)
                .push_bind(order.subtotal.clone())
                .push_bind(order.composite_tax_rate.clone())
                .push_bind(order.tax_amount.clone())
                .push_bind(order.total_amount.clone())
                .push_bind(breakdown)
                .push_bind(jurisdiction)
                .push_bind(order.timestamp);
        });

        query_builder
            .build()
            .execute(&mut *tx)
            .await
            .context("Failed to insert orders")?;

        tx.commit().await.context("Failed to commit transaction")?;

        debug!(batch_size = orders.len(), "Inserted order batch");
        Ok(())
    }
}
