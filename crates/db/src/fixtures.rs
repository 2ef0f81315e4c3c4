use sqlx::Executor;

use tradedesk_core::domain::credit::TransactionFilter;
use tradedesk_core::domain::customer::CustomerId;
use tradedesk_core::ledger::replay_balance;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlCreditRepository};

const SEED_PRODUCT_IDS: &[&str] = &["prod-brake-pad", "prod-oil-filter", "prod-wiper"];

const SEED_CUSTOMER_IDS: &[&str] = &["cust-acme", "cust-globex", "cust-initech"];

const SEED_TRANSACTION_IDS: &[&str] = &["txn-acme-001", "txn-acme-002", "txn-globex-001"];

const SEED_RULE_IDS: &[&str] = &["rule-brake-volume", "rule-grade-a", "rule-filter-promo"];

const SEED_TIER_IDS: &[&str] = &["tier-brake-1", "tier-brake-2"];

/// Deterministic demo data for local runs and integration tests.
///
/// Every seeded customer's projection matches a replay of its seeded transactions.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        tracing::info!(
            event_name = "db.fixtures.loaded",
            customers = SEED_CUSTOMER_IDS.len(),
            pricing_rules = SEED_RULE_IDS.len(),
            "demo dataset loaded"
        );

        Ok(SeedResult {
            products: SEED_PRODUCT_IDS.len(),
            customers: SEED_CUSTOMER_IDS.len(),
            transactions: SEED_TRANSACTION_IDS.len(),
            pricing_rules: SEED_RULE_IDS.len(),
            pricing_tiers: SEED_TIER_IDS.len(),
        })
    }

    /// Checks that every seeded row exists and that each customer's balance replays.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        checks.push(("products", count_present(pool, "product", SEED_PRODUCT_IDS).await?));
        checks.push(("customers", count_present(pool, "customer", SEED_CUSTOMER_IDS).await?));
        checks.push((
            "credit-transactions",
            count_present(pool, "credit_transaction", SEED_TRANSACTION_IDS).await?,
        ));
        checks.push(("pricing-rules", count_present(pool, "pricing_rule", SEED_RULE_IDS).await?));
        checks.push(("pricing-tiers", count_present(pool, "pricing_tier", SEED_TIER_IDS).await?));

        let credit = SqlCreditRepository::new(pool.clone());
        for id in SEED_CUSTOMER_IDS {
            checks.push((*id, Self::projection_replays(&credit, id).await?));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    async fn projection_replays(
        credit: &SqlCreditRepository,
        id: &str,
    ) -> Result<bool, RepositoryError> {
        let customer_id = CustomerId(id.to_string());
        let Some(customer) = credit.find_customer_by_id(&customer_id).await? else {
            return Ok(false);
        };
        let history = credit.transactions_for(&customer_id, &TransactionFilter::default()).await?;
        Ok(customer.is_consistent() && replay_balance(&history) == customer.current_balance)
    }

    /// Removes the seeded rows, children first.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for (table, ids) in [
            ("pricing_tier", SEED_TIER_IDS),
            ("pricing_rule", SEED_RULE_IDS),
            ("credit_transaction", SEED_TRANSACTION_IDS),
            ("customer", SEED_CUSTOMER_IDS),
            ("product", SEED_PRODUCT_IDS),
        ] {
            let quoted = sql_array_from_ids(ids);
            sqlx::query(&format!("DELETE FROM {table} WHERE id IN {quoted}"))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn count_present(
    pool: &DbPool,
    table: &str,
    ids: &[&str],
) -> Result<bool, RepositoryError> {
    let quoted = sql_array_from_ids(ids);
    let present: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(1) FROM {table} WHERE id IN {quoted} AND deleted_at IS NULL"
    ))
    .fetch_one(pool)
    .await?;
    Ok(present == ids.len() as i64)
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub products: usize,
    pub customers: usize,
    pub transactions: usize,
    pub pricing_rules: usize,
    pub pricing_tiers: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
