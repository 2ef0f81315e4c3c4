use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use tradedesk_core::domain::customer::CustomerGrade;
use tradedesk_core::domain::pricing::{
    Discount, PricingRule, PricingRuleId, PricingRuleType, PricingTier, PricingTierId,
    QuantityRange, RuleScope,
};
use tradedesk_core::domain::product::ProductId;
use tradedesk_core::store::{PricingRuleStore, RuleFilter, StoreError};

use super::{
    decode_optional_date, decode_optional_decimal, decode_optional_timestamp, decode_quantity,
    decode_timestamp, encode_timestamp, RepositoryError,
};
use crate::DbPool;

const RULE_COLUMNS: &str = "id, name, rule_type, priority, product_id, category, customer_grade,
    min_quantity, max_quantity, fixed_price, discount_percent, discount_amount,
    valid_from, valid_until, active, notes, created_at, updated_at, deleted_at";

const TIER_COLUMNS: &str = "id, rule_id, tier_number, min_quantity, max_quantity, fixed_price,
    discount_percent, discount_amount, description, deleted_at";

pub struct SqlPricingRuleRepository {
    pool: DbPool,
}

impl SqlPricingRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Live rules ordered by priority descending; ties fall back to creation time, then id.
    pub async fn list(&self, filter: &RuleFilter) -> Result<Vec<PricingRule>, RepositoryError> {
        let rule_type = filter.rule_type.map(|kind| kind.as_str());
        let product_id = filter.product_id.as_ref().map(|id| id.0.as_str());
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM pricing_rule
             WHERE deleted_at IS NULL
               AND (?1 IS NULL OR rule_type = ?1)
               AND (?2 IS NULL OR product_id = ?2)
               AND (?3 IS NULL OR active = ?3)
             ORDER BY priority DESC, created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(rule_type)
            .bind(product_id)
            .bind(filter.active)
            .fetch_all(&self.pool)
            .await?;

        let mut tiers = self.live_tiers_by_rule().await?;
        rows.iter()
            .map(|row| -> Result<PricingRule, RepositoryError> {
                let mut rule = rule_from_row(row)?;
                rule.tiers = tiers.remove(&rule.id.0).unwrap_or_default();
                Ok(rule)
            })
            .collect()
    }

    pub async fn find_by_id(&self, id: &PricingRuleId) -> Result<Option<PricingRule>, RepositoryError> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM pricing_rule WHERE id = ? AND deleted_at IS NULL");
        let Some(row) = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let mut rule = rule_from_row(&row)?;
        let sql = format!(
            "SELECT {TIER_COLUMNS} FROM pricing_tier
             WHERE rule_id = ? AND deleted_at IS NULL ORDER BY tier_number"
        );
        let tier_rows = sqlx::query(&sql).bind(&id.0).fetch_all(&self.pool).await?;
        rule.tiers = tier_rows.iter().map(tier_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(rule))
    }

    pub async fn insert(&self, rule: &PricingRule) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (fixed_price, percent, amount) = discount_columns(&rule.discount);

        sqlx::query(
            "INSERT INTO pricing_rule (id, name, rule_type, priority, product_id, category,
                 customer_grade, min_quantity, max_quantity, fixed_price, discount_percent,
                 discount_amount, valid_from, valid_until, active, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&rule.id.0)
        .bind(&rule.name)
        .bind(rule.rule_type.as_str())
        .bind(rule.priority)
        .bind(rule.scope.product_id.as_ref().map(|id| id.0.as_str()))
        .bind(rule.scope.category.as_deref())
        .bind(rule.scope.customer_grade.as_ref().map(|grade| grade.0.as_str()))
        .bind(rule.scope.quantity.min.map(i64::from))
        .bind(rule.scope.quantity.max.map(i64::from))
        .bind(fixed_price)
        .bind(percent)
        .bind(amount)
        .bind(rule.valid_from.map(|date| date.to_string()))
        .bind(rule.valid_until.map(|date| date.to_string()))
        .bind(rule.active)
        .bind(rule.notes.as_deref())
        .bind(encode_timestamp(rule.created_at))
        .bind(encode_timestamp(rule.updated_at))
        .execute(&mut *tx)
        .await?;

        insert_tiers(&mut tx, &rule.id, &rule.tiers, rule.updated_at).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn replace(&self, rule: &PricingRule) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (fixed_price, percent, amount) = discount_columns(&rule.discount);

        let updated = sqlx::query(
            "UPDATE pricing_rule SET
                 name = ?, rule_type = ?, priority = ?, product_id = ?, category = ?,
                 customer_grade = ?, min_quantity = ?, max_quantity = ?, fixed_price = ?,
                 discount_percent = ?, discount_amount = ?, valid_from = ?, valid_until = ?,
                 active = ?, notes = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&rule.name)
        .bind(rule.rule_type.as_str())
        .bind(rule.priority)
        .bind(rule.scope.product_id.as_ref().map(|id| id.0.as_str()))
        .bind(rule.scope.category.as_deref())
        .bind(rule.scope.customer_grade.as_ref().map(|grade| grade.0.as_str()))
        .bind(rule.scope.quantity.min.map(i64::from))
        .bind(rule.scope.quantity.max.map(i64::from))
        .bind(fixed_price)
        .bind(percent)
        .bind(amount)
        .bind(rule.valid_from.map(|date| date.to_string()))
        .bind(rule.valid_until.map(|date| date.to_string()))
        .bind(rule.active)
        .bind(rule.notes.as_deref())
        .bind(encode_timestamp(rule.updated_at))
        .bind(&rule.id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "pricing rule", id: rule.id.0.clone() });
        }

        sqlx::query("UPDATE pricing_tier SET deleted_at = ? WHERE rule_id = ? AND deleted_at IS NULL")
            .bind(encode_timestamp(rule.updated_at))
            .bind(&rule.id.0)
            .execute(&mut *tx)
            .await?;

        insert_tiers(&mut tx, &rule.id, &rule.tiers, rule.updated_at).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn soft_delete(
        &self,
        id: &PricingRuleId,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let stamp = encode_timestamp(deleted_at);

        let deleted = sqlx::query(
            "UPDATE pricing_rule SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&stamp)
        .bind(&stamp)
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "pricing rule", id: id.0.clone() });
        }

        sqlx::query("UPDATE pricing_tier SET deleted_at = ? WHERE rule_id = ? AND deleted_at IS NULL")
            .bind(&stamp)
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_active(
        &self,
        id: &PricingRuleId,
        active: bool,
    ) -> Result<PricingRule, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE pricing_rule SET active = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(active)
        .bind(encode_timestamp(Utc::now()))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "pricing rule", id: id.0.clone() });
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound { entity: "pricing rule", id: id.0.clone() })
    }

    async fn live_tiers_by_rule(&self) -> Result<HashMap<String, Vec<PricingTier>>, RepositoryError> {
        let sql = format!(
            "SELECT {TIER_COLUMNS} FROM pricing_tier
             WHERE deleted_at IS NULL ORDER BY rule_id, tier_number"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut grouped: HashMap<String, Vec<PricingTier>> = HashMap::new();
        for row in &rows {
            let rule_id: String = row.try_get("rule_id")?;
            grouped.entry(rule_id).or_default().push(tier_from_row(row)?);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl PricingRuleStore for SqlPricingRuleRepository {
    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<PricingRule>, StoreError> {
        Ok(self.list(filter).await?)
    }

    async fn find_rule(&self, id: &PricingRuleId) -> Result<Option<PricingRule>, StoreError> {
        Ok(self.find_by_id(id).await?)
    }

    async fn insert_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        Ok(self.insert(rule).await?)
    }

    async fn replace_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        Ok(self.replace(rule).await?)
    }

    async fn soft_delete_rule(
        &self,
        id: &PricingRuleId,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(self.soft_delete(id, deleted_at).await?)
    }

    async fn set_rule_active(
        &self,
        id: &PricingRuleId,
        active: bool,
    ) -> Result<PricingRule, StoreError> {
        Ok(self.set_active(id, active).await?)
    }
}

async fn insert_tiers(
    tx: &mut Transaction<'_, Sqlite>,
    rule_id: &PricingRuleId,
    tiers: &[PricingTier],
    created_at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    for tier in tiers {
        let (fixed_price, percent, amount) = discount_columns(&tier.discount);
        sqlx::query(
            "INSERT INTO pricing_tier (id, rule_id, tier_number, min_quantity, max_quantity,
                 fixed_price, discount_percent, discount_amount, description, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tier.id.0)
        .bind(&rule_id.0)
        .bind(tier.tier_number)
        .bind(i64::from(tier.min_quantity))
        .bind(tier.max_quantity.map(i64::from))
        .bind(fixed_price)
        .bind(percent)
        .bind(amount)
        .bind(tier.description.as_deref())
        .bind(encode_timestamp(created_at))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn discount_columns(discount: &Discount) -> (Option<String>, Option<String>, Option<String>) {
    let (fixed_price, percent, amount) = discount.as_fields();
    (
        fixed_price.map(|value| value.to_string()),
        percent.map(|value| value.to_string()),
        amount.map(|value| value.to_string()),
    )
}

fn discount_from_row(row: &SqliteRow) -> Result<Discount, RepositoryError> {
    Ok(Discount::from_fields(
        decode_optional_decimal("fixed_price", row.try_get("fixed_price")?)?,
        decode_optional_decimal("discount_percent", row.try_get("discount_percent")?)?,
        decode_optional_decimal("discount_amount", row.try_get("discount_amount")?)?,
    ))
}

fn rule_from_row(row: &SqliteRow) -> Result<PricingRule, RepositoryError> {
    let rule_type: String = row.try_get("rule_type")?;
    let rule_type = PricingRuleType::parse(&rule_type)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown rule_type `{rule_type}`")))?;
    let product_id: Option<String> = row.try_get("product_id")?;
    let customer_grade: Option<String> = row.try_get("customer_grade")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(PricingRule {
        id: PricingRuleId(row.try_get("id")?),
        name: row.try_get("name")?,
        rule_type,
        priority: row.try_get("priority")?,
        scope: RuleScope {
            product_id: product_id.map(ProductId),
            category: row.try_get("category")?,
            customer_grade: customer_grade.map(CustomerGrade),
            quantity: QuantityRange::new(
                decode_quantity("min_quantity", row.try_get("min_quantity")?)?,
                decode_quantity("max_quantity", row.try_get("max_quantity")?)?,
            ),
        },
        discount: discount_from_row(row)?,
        valid_from: decode_optional_date("valid_from", row.try_get("valid_from")?)?,
        valid_until: decode_optional_date("valid_until", row.try_get("valid_until")?)?,
        active: row.try_get("active")?,
        notes: row.try_get("notes")?,
        tiers: Vec::new(),
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
        deleted_at: decode_optional_timestamp("deleted_at", row.try_get("deleted_at")?)?,
    })
}

fn tier_from_row(row: &SqliteRow) -> Result<PricingTier, RepositoryError> {
    let min_quantity: i64 = row.try_get("min_quantity")?;
    Ok(PricingTier {
        id: PricingTierId(row.try_get("id")?),
        tier_number: row.try_get("tier_number")?,
        min_quantity: decode_quantity("min_quantity", Some(min_quantity))?.unwrap_or_default(),
        max_quantity: decode_quantity("max_quantity", row.try_get("max_quantity")?)?,
        discount: discount_from_row(row)?,
        description: row.try_get("description")?,
        deleted_at: decode_optional_timestamp("deleted_at", row.try_get("deleted_at")?)?,
    })
}
