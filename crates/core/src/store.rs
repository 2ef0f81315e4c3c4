//! Persistence ports consumed by the pricing engine and the credit ledger.
//!
//! The core owns none of the records behind these traits. `tradedesk-db` provides the
//! SQLite and in-memory implementations. Every read path excludes soft-deleted records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::credit::{CreditTransaction, TransactionFilter, TransactionId};
use crate::domain::customer::{CreditProjection, Customer, CustomerId};
use crate::domain::pricing::{PricingRule, PricingRuleId, PricingRuleType};
use crate::domain::product::{Product, ProductId};
use crate::errors::{ApplicationError, DomainError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    /// A conditional write lost against a concurrent writer. Nothing was persisted.
    #[error("{entity} {id} was modified concurrently (expected version {expected_version})")]
    Conflict { entity: &'static str, id: String, expected_version: i64 },
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id }.into(),
            StoreError::Conflict { entity, id, .. } => DomainError::InvalidState(format!(
                "{entity} {id} was modified concurrently; retry the operation"
            ))
            .into(),
            StoreError::Backend(message) => Self::Persistence(message),
        }
    }
}

/// One ledger write: the transaction row plus the customer projection derived from it.
///
/// Implementations persist both or neither, and only when the customer row still carries
/// `expected_version`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerPosting {
    pub transaction: CreditTransaction,
    pub projection: CreditProjection,
    pub expected_version: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleFilter {
    pub rule_type: Option<PricingRuleType>,
    pub product_id: Option<ProductId>,
    pub active: Option<bool>,
}

impl RuleFilter {
    pub fn matches(&self, rule: &PricingRule) -> bool {
        self.rule_type.map_or(true, |kind| rule.rule_type == kind)
            && self.product_id.as_ref().map_or(true, |id| rule.scope.product_id.as_ref() == Some(id))
            && self.active.map_or(true, |active| rule.active == active)
    }
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError>;
}

#[async_trait]
pub trait PricingRuleStore: Send + Sync {
    /// Rules with their live tiers, ordered by priority descending. Equal priorities keep
    /// the store's insertion order.
    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<PricingRule>, StoreError>;

    async fn find_rule(&self, id: &PricingRuleId) -> Result<Option<PricingRule>, StoreError>;

    async fn insert_rule(&self, rule: &PricingRule) -> Result<(), StoreError>;

    /// Overwrites the rule's fields, tombstones its current tiers and inserts `rule.tiers`.
    async fn replace_rule(&self, rule: &PricingRule) -> Result<(), StoreError>;

    /// Tombstones the rule and every tier it owns.
    async fn soft_delete_rule(
        &self,
        id: &PricingRuleId,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_rule_active(
        &self,
        id: &PricingRuleId,
        active: bool,
    ) -> Result<PricingRule, StoreError>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn find_customer(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError>;

    async fn save_customer(&self, customer: &Customer) -> Result<(), StoreError>;

    /// Writes hold flag, reason and status when the row still carries `expected_version`.
    async fn update_hold(
        &self,
        customer: &Customer,
        expected_version: i64,
    ) -> Result<Customer, StoreError>;

    /// Customers on credit hold or with negative available credit, lowest credit first.
    async fn list_credit_alerts(&self) -> Result<Vec<Customer>, StoreError>;
}

#[async_trait]
pub trait CreditTransactionStore: Send + Sync {
    /// Atomically appends the transaction and writes the projection.
    async fn post_transaction(&self, posting: &LedgerPosting)
        -> Result<CreditTransaction, StoreError>;

    /// Overwrites the projection alone, conditional on `expected_version`.
    async fn write_projection(
        &self,
        customer_id: &CustomerId,
        projection: CreditProjection,
        expected_version: i64,
    ) -> Result<Customer, StoreError>;

    async fn list_transactions(
        &self,
        customer_id: &CustomerId,
        filter: &TransactionFilter,
    ) -> Result<Vec<CreditTransaction>, StoreError>;

    async fn find_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<CreditTransaction>, StoreError>;

    /// Unpaid `order` transactions whose due date is before `now`.
    async fn list_overdue_orders(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CreditTransaction>, StoreError>;

    async fn stamp_paid(
        &self,
        id: &TransactionId,
        paid_at: DateTime<Utc>,
    ) -> Result<CreditTransaction, StoreError>;
}

#[async_trait]
impl<T: ProductCatalog + ?Sized> ProductCatalog for Arc<T> {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        (**self).find_product(id).await
    }
}

#[async_trait]
impl<T: PricingRuleStore + ?Sized> PricingRuleStore for Arc<T> {
    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<PricingRule>, StoreError> {
        (**self).list_rules(filter).await
    }

    async fn find_rule(&self, id: &PricingRuleId) -> Result<Option<PricingRule>, StoreError> {
        (**self).find_rule(id).await
    }

    async fn insert_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        (**self).insert_rule(rule).await
    }

    async fn replace_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        (**self).replace_rule(rule).await
    }

    async fn soft_delete_rule(
        &self,
        id: &PricingRuleId,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).soft_delete_rule(id, deleted_at).await
    }

    async fn set_rule_active(
        &self,
        id: &PricingRuleId,
        active: bool,
    ) -> Result<PricingRule, StoreError> {
        (**self).set_rule_active(id, active).await
    }
}
