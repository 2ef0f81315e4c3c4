use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tradedesk_core::domain::credit::{CreditTransaction, TransactionFilter, TransactionId};
use tradedesk_core::domain::customer::{CreditProjection, Customer, CustomerId};
use tradedesk_core::domain::pricing::{PricingRule, PricingRuleId};
use tradedesk_core::domain::product::{Product, ProductId};
use tradedesk_core::domain::SoftDelete;
use tradedesk_core::store::{
    CreditTransactionStore, CustomerStore, LedgerPosting, PricingRuleStore, ProductCatalog,
    RuleFilter, StoreError,
};

fn not_found(entity: &'static str, id: &str) -> StoreError {
    StoreError::NotFound { entity, id: id.to_string() }
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<String, Product>>,
}

impl InMemoryProductRepository {
    pub async fn insert(&self, product: Product) {
        let mut products = self.products.write().await;
        products.insert(product.id.0.clone(), product);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductRepository {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        let products = self.products.read().await;
        Ok(products.get(&id.0).cloned())
    }
}

/// Rules kept in insertion order so equal priorities list the way they were created.
#[derive(Default)]
pub struct InMemoryPricingRuleRepository {
    rules: RwLock<Vec<PricingRule>>,
}

fn live_view(rule: &PricingRule) -> PricingRule {
    let mut view = rule.clone();
    view.tiers.retain(|tier| tier.deleted_at.is_none());
    view
}

#[async_trait]
impl PricingRuleStore for InMemoryPricingRuleRepository {
    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<PricingRule>, StoreError> {
        let rules = self.rules.read().await;
        let mut listed: Vec<PricingRule> = rules
            .iter()
            .filter(|rule| rule.is_live() && filter.matches(rule))
            .map(live_view)
            .collect();
        listed.sort_by(|left, right| right.priority.cmp(&left.priority));
        Ok(listed)
    }

    async fn find_rule(&self, id: &PricingRuleId) -> Result<Option<PricingRule>, StoreError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().find(|rule| rule.id == *id && rule.is_live()).map(live_view))
    }

    async fn insert_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        if rules.iter().any(|existing| existing.id == rule.id) {
            return Err(StoreError::Backend(format!("pricing rule {} already exists", rule.id.0)));
        }
        rules.push(rule.clone());
        Ok(())
    }

    async fn replace_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        let stored = rules
            .iter_mut()
            .find(|existing| existing.id == rule.id && existing.is_live())
            .ok_or_else(|| not_found("pricing rule", &rule.id.0))?;

        let now = Utc::now();
        let mut tiers = std::mem::take(&mut stored.tiers);
        for tier in tiers.iter_mut().filter(|tier| tier.deleted_at.is_none()) {
            tier.deleted_at = Some(now);
        }
        tiers.extend(rule.tiers.iter().cloned());

        *stored = PricingRule { tiers, ..rule.clone() };
        Ok(())
    }

    async fn soft_delete_rule(
        &self,
        id: &PricingRuleId,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        let stored = rules
            .iter_mut()
            .find(|existing| existing.id == *id && existing.is_live())
            .ok_or_else(|| not_found("pricing rule", &id.0))?;

        stored.deleted_at = Some(deleted_at);
        for tier in stored.tiers.iter_mut().filter(|tier| tier.deleted_at.is_none()) {
            tier.deleted_at = Some(deleted_at);
        }
        Ok(())
    }

    async fn set_rule_active(
        &self,
        id: &PricingRuleId,
        active: bool,
    ) -> Result<PricingRule, StoreError> {
        let mut rules = self.rules.write().await;
        let stored = rules
            .iter_mut()
            .find(|existing| existing.id == *id && existing.is_live())
            .ok_or_else(|| not_found("pricing rule", &id.0))?;

        stored.active = active;
        stored.updated_at = Utc::now();
        Ok(live_view(stored))
    }
}

#[derive(Default)]
struct CreditState {
    customers: HashMap<String, Customer>,
    transactions: Vec<CreditTransaction>,
}

/// Customers and transactions behind one lock, so a posting is atomic the same way the SQL
/// transaction makes it atomic.
#[derive(Default)]
pub struct InMemoryCreditRepository {
    state: RwLock<CreditState>,
}

impl CreditState {
    fn live_customer_mut(
        &mut self,
        id: &CustomerId,
        expected_version: i64,
    ) -> Result<&mut Customer, StoreError> {
        let customer = self
            .customers
            .get_mut(&id.0)
            .filter(|customer| customer.is_live())
            .ok_or_else(|| not_found("customer", &id.0))?;
        if customer.version != expected_version {
            return Err(StoreError::Conflict {
                entity: "customer",
                id: id.0.clone(),
                expected_version,
            });
        }
        Ok(customer)
    }
}

#[async_trait]
impl CustomerStore for InMemoryCreditRepository {
    async fn find_customer(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError> {
        let state = self.state.read().await;
        Ok(state.customers.get(&id.0).filter(|customer| customer.is_live()).cloned())
    }

    async fn save_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let mut saved = customer.clone();
        if let Some(existing) = state.customers.get(&customer.id.0) {
            saved.version = existing.version + 1;
            saved.created_at = existing.created_at;
        }
        saved.updated_at = Utc::now();
        state.customers.insert(saved.id.0.clone(), saved);
        Ok(())
    }

    async fn update_hold(
        &self,
        customer: &Customer,
        expected_version: i64,
    ) -> Result<Customer, StoreError> {
        let mut state = self.state.write().await;
        let stored = state.live_customer_mut(&customer.id, expected_version)?;
        stored.credit_hold = customer.credit_hold;
        stored.credit_hold_reason = customer.credit_hold_reason.clone();
        stored.status = customer.status;
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn list_credit_alerts(&self) -> Result<Vec<Customer>, StoreError> {
        let state = self.state.read().await;
        let mut alerts: Vec<Customer> = state
            .customers
            .values()
            .filter(|customer| customer.is_live())
            .filter(|customer| customer.credit_hold || customer.available_credit.is_sign_negative())
            .cloned()
            .collect();
        alerts.sort_by(|left, right| {
            left.available_credit.cmp(&right.available_credit).then_with(|| left.id.cmp(&right.id))
        });
        Ok(alerts)
    }
}

#[async_trait]
impl CreditTransactionStore for InMemoryCreditRepository {
    async fn post_transaction(
        &self,
        posting: &LedgerPosting,
    ) -> Result<CreditTransaction, StoreError> {
        let mut state = self.state.write().await;
        let customer =
            state.live_customer_mut(&posting.transaction.customer_id, posting.expected_version)?;
        customer.apply_projection(posting.projection);
        customer.version += 1;
        customer.updated_at = Utc::now();

        state.transactions.push(posting.transaction.clone());
        Ok(posting.transaction.clone())
    }

    async fn write_projection(
        &self,
        customer_id: &CustomerId,
        projection: CreditProjection,
        expected_version: i64,
    ) -> Result<Customer, StoreError> {
        let mut state = self.state.write().await;
        let customer = state.live_customer_mut(customer_id, expected_version)?;
        customer.apply_projection(projection);
        customer.version += 1;
        customer.updated_at = Utc::now();
        Ok(customer.clone())
    }

    async fn list_transactions(
        &self,
        customer_id: &CustomerId,
        filter: &TransactionFilter,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        let state = self.state.read().await;
        let limit = filter.limit.map_or(usize::MAX, |limit| limit as usize);
        // Reverse insertion order first so the stable sort breaks date ties newest-first.
        let mut matching: Vec<CreditTransaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|entry| entry.customer_id == *customer_id && entry.is_live())
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        matching.sort_by(|left, right| right.transaction_date.cmp(&left.transaction_date));
        Ok(matching.into_iter().skip(filter.offset as usize).take(limit).collect())
    }

    async fn find_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<CreditTransaction>, StoreError> {
        let state = self.state.read().await;
        Ok(state.transactions.iter().find(|entry| entry.id == *id && entry.is_live()).cloned())
    }

    async fn list_overdue_orders(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        let state = self.state.read().await;
        let mut overdue: Vec<CreditTransaction> = state
            .transactions
            .iter()
            .filter(|entry| entry.customer_id == *customer_id && entry.is_live())
            .filter(|entry| entry.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|entry| entry.due_date);
        Ok(overdue)
    }

    async fn stamp_paid(
        &self,
        id: &TransactionId,
        paid_at: DateTime<Utc>,
    ) -> Result<CreditTransaction, StoreError> {
        let mut state = self.state.write().await;
        let entry = state
            .transactions
            .iter_mut()
            .find(|entry| entry.id == *id && entry.is_live())
            .ok_or_else(|| not_found("credit transaction", &id.0))?;
        if entry.paid_date.is_none() {
            entry.paid_date = Some(paid_at);
        }
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use tradedesk_core::domain::customer::{Customer, CustomerId};
    use tradedesk_core::domain::pricing::{
        Discount, PricingRule, PricingRuleId, PricingRuleType, RuleScope,
    };
    use tradedesk_core::domain::product::{Product, ProductId};
    use tradedesk_core::store::{
        CustomerStore, PricingRuleStore, ProductCatalog, RuleFilter, StoreError,
    };

    use super::{InMemoryCreditRepository, InMemoryPricingRuleRepository, InMemoryProductRepository};

    fn rule(id: &str, priority: i32) -> PricingRule {
        let now = Utc::now();
        PricingRule {
            id: PricingRuleId(id.to_string()),
            name: id.to_string(),
            rule_type: PricingRuleType::Promotion,
            priority,
            scope: RuleScope::default(),
            discount: Discount::Percent(Decimal::new(5, 0)),
            valid_from: None,
            valid_until: None,
            active: true,
            notes: None,
            tiers: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn product_catalog_returns_inserted_products() {
        let repo = InMemoryProductRepository::default();
        let product = Product {
            id: ProductId("P-1".to_string()),
            sku: "OIL-5W30".to_string(),
            name: "Engine oil".to_string(),
            category: None,
            list_price: Decimal::new(2_450, 2),
            active: true,
        };

        repo.insert(product.clone()).await;
        assert_eq!(repo.find_product(&product.id).await.expect("find"), Some(product));
    }

    #[tokio::test]
    async fn equal_priorities_keep_insertion_order() {
        let repo = InMemoryPricingRuleRepository::default();
        for (id, priority) in [("first", 5), ("top", 9), ("second", 5)] {
            repo.insert_rule(&rule(id, priority)).await.expect("insert");
        }

        let ids: Vec<String> = repo
            .list_rules(&RuleFilter::default())
            .await
            .expect("list")
            .into_iter()
            .map(|rule| rule.id.0)
            .collect();
        assert_eq!(ids, vec!["top", "first", "second"]);
    }

    #[tokio::test]
    async fn deleted_rules_disappear_from_reads() {
        let repo = InMemoryPricingRuleRepository::default();
        let stored = rule("gone", 1);
        repo.insert_rule(&stored).await.expect("insert");
        repo.soft_delete_rule(&stored.id, Utc::now()).await.expect("delete");

        assert!(repo.find_rule(&stored.id).await.expect("find").is_none());
        assert!(repo.list_rules(&RuleFilter::default()).await.expect("list").is_empty());
        let error = repo.set_rule_active(&stored.id, false).await.expect_err("deleted rule");
        assert!(matches!(error, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn hold_update_checks_version() {
        let repo = InMemoryCreditRepository::default();
        let customer =
            Customer::new(CustomerId("C-1".to_string()), "Acme", None, Decimal::new(1_000, 0));
        repo.save_customer(&customer).await.expect("save");

        let mut held = customer.clone();
        held.place_on_hold(Some("audit".to_string())).expect("hold");
        let updated = repo.update_hold(&held, 0).await.expect("update");
        assert_eq!(updated.version, 1);

        let error = repo.update_hold(&held, 0).await.expect_err("stale version");
        assert!(matches!(error, StoreError::Conflict { .. }));
        assert_eq!(repo.list_credit_alerts().await.expect("alerts").len(), 1);
    }
}
