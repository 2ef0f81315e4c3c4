use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use tradedesk_core::domain::product::{Product, ProductId};
use tradedesk_core::store::{ProductCatalog, StoreError};

use super::{decode_decimal, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, sku, name, category, list_price, active
             FROM product WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, sku, name, category, list_price, active
             FROM product WHERE deleted_at IS NULL ORDER BY sku",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    pub async fn save(&self, product: &Product) -> Result<(), RepositoryError> {
        let now = encode_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO product (id, sku, name, category, list_price, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 sku = excluded.sku,
                 name = excluded.name,
                 category = excluded.category,
                 list_price = excluded.list_price,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&product.id.0)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.list_price.to_string())
        .bind(product.active)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for SqlProductRepository {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.find_by_id(id).await?)
    }
}

fn product_from_row(row: &SqliteRow) -> Result<Product, RepositoryError> {
    let list_price: String = row.try_get("list_price")?;
    Ok(Product {
        id: ProductId(row.try_get("id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        list_price: decode_decimal("list_price", &list_price)?,
        active: row.try_get("active")?,
    })
}
