use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

use tradedesk_core::domain::credit::{NewCreditTransaction, TransactionFilter, TransactionType};
use tradedesk_core::domain::customer::{Customer, CustomerGrade, CustomerId};
use tradedesk_core::errors::{ApplicationError, DomainError};
use tradedesk_core::ledger::{CreditLedger, CreditSettings, PaymentDetails};
use tradedesk_core::store::{CreditTransactionStore, CustomerStore};
use tradedesk_db::{
    connect_with_settings, migrations, DbPool, DemoDataset, InMemoryCreditRepository,
    SqlCreditRepository,
};

async fn memory_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

async fn file_pool(dir: &TempDir) -> DbPool {
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

fn acme() -> Customer {
    Customer::new(
        CustomerId("C-1".to_string()),
        "Acme Motors",
        Some(CustomerGrade("A".to_string())),
        Decimal::new(100_000, 0),
    )
}

async fn sql_ledger() -> CreditLedger<SqlCreditRepository> {
    let repo = SqlCreditRepository::new(memory_pool().await);
    repo.save_customer(&acme()).await.expect("save customer");
    CreditLedger::new(repo)
}

fn order(amount: i64) -> NewCreditTransaction {
    NewCreditTransaction::new(TransactionType::Order, Decimal::new(amount, 0))
}

#[tokio::test]
async fn every_write_keeps_available_credit_consistent() {
    let ledger = sql_ledger().await;
    let id = CustomerId("C-1".to_string());

    let recorded = ledger.record_transaction(&id, order(90_000)).await.expect("order");
    assert_eq!(recorded.balance_before, Decimal::ZERO);
    assert_eq!(recorded.balance_after, Decimal::new(90_000, 0));

    let payment = ledger
        .process_payment(
            &id,
            Decimal::new(5_000, 0),
            PaymentDetails { method: Some("wire".to_string()), ..PaymentDetails::default() },
        )
        .await
        .expect("payment");
    assert_eq!(payment.balance_after, Decimal::new(85_000, 0));
    assert!(payment.paid_date.is_some());

    ledger
        .record_transaction(
            &id,
            NewCreditTransaction::new(TransactionType::Adjustment, Decimal::new(-250, 0)),
        )
        .await
        .expect("adjustment");

    let summary = ledger.credit_summary(&id).await.expect("summary");
    assert_eq!(summary.customer.current_balance, Decimal::new(84_750, 0));
    assert_eq!(summary.customer.available_credit, Decimal::new(15_250, 0));
    assert!(summary.customer.is_consistent());
    assert_eq!(summary.recent_transactions.len(), 3);
}

#[tokio::test]
async fn credit_check_reports_usage_warning_and_shortfall() {
    let ledger = sql_ledger().await;
    let id = CustomerId("C-1".to_string());
    ledger.record_transaction(&id, order(85_000)).await.expect("order");

    let within = ledger.check_credit(&id, Decimal::new(10_000, 0)).await.expect("check");
    assert!(within.passed);
    assert!(!within.exceeds_limit);
    assert!(within.warnings.iter().any(|warning| warning.contains("95.0%")));

    let over = ledger.check_credit(&id, Decimal::new(20_000, 0)).await.expect("check");
    assert!(!over.passed);
    assert!(over.exceeds_limit);
    assert_eq!(over.exceeds_amount, Decimal::new(5_000, 0));
    assert!(over.warnings.iter().any(|warning| warning.contains("5000")));
}

#[tokio::test]
async fn recalculation_is_idempotent_and_repairs_drift() {
    let ledger = sql_ledger().await;
    let id = CustomerId("C-1".to_string());
    ledger.record_transaction(&id, order(1_200)).await.expect("order");
    ledger.record_transaction(&id, order(800)).await.expect("order");
    ledger
        .record_transaction(&id, NewCreditTransaction::new(TransactionType::Refund, Decimal::new(300, 0)))
        .await
        .expect("refund");

    let first = ledger.recalculate_balance(&id).await.expect("recalculate");
    let second = ledger.recalculate_balance(&id).await.expect("recalculate again");
    assert_eq!(first.current_balance, Decimal::new(1_700, 0));
    assert_eq!(first.current_balance, second.current_balance);
    assert_eq!(second.available_credit, Decimal::new(98_300, 0));
}

#[tokio::test]
async fn limit_change_is_audited_as_zero_adjustment() {
    let ledger = sql_ledger().await;
    let id = CustomerId("C-1".to_string());
    ledger.record_transaction(&id, order(30_000)).await.expect("order");

    let updated = ledger
        .update_credit_limit(&id, Decimal::new(40_000, 0), Some("annual review".to_string()), None)
        .await
        .expect("limit");
    assert_eq!(updated.available_credit, Decimal::new(10_000, 0));
    assert_eq!(updated.current_balance, Decimal::new(30_000, 0));

    let adjustments = ledger
        .list_transactions(
            &id,
            &TransactionFilter {
                transaction_type: Some(TransactionType::Adjustment),
                ..TransactionFilter::default()
            },
        )
        .await
        .expect("list");
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].amount, Decimal::ZERO);
    assert_eq!(
        adjustments[0].description.as_deref(),
        Some("credit limit changed from 100000 to 40000: annual review")
    );
}

#[tokio::test]
async fn limit_change_returns_the_customer_it_wrote_under_concurrent_orders() {
    let repo = InMemoryCreditRepository::default();
    repo.save_customer(&acme()).await.expect("save customer");
    let ledger = CreditLedger::new(repo);
    let id = CustomerId("C-1".to_string());

    let (updated, first, second) = tokio::join!(
        ledger.update_credit_limit(&id, Decimal::new(40_000, 0), None, None),
        ledger.record_transaction(&id, order(1_000)),
        ledger.record_transaction(&id, order(2_000)),
    );
    let updated = updated.expect("limit");
    first.expect("first order");
    second.expect("second order");

    let adjustments = ledger
        .list_transactions(
            &id,
            &TransactionFilter {
                transaction_type: Some(TransactionType::Adjustment),
                ..TransactionFilter::default()
            },
        )
        .await
        .expect("list");
    assert_eq!(adjustments.len(), 1);
    assert_eq!(updated.credit_limit, Decimal::new(40_000, 0));
    assert_eq!(updated.current_balance, adjustments[0].balance_after);
    assert!(updated.is_consistent());
}

#[tokio::test]
async fn settling_an_order_clears_it_from_overdue_totals() {
    let ledger = sql_ledger().await;
    let id = CustomerId("C-1".to_string());
    let late = ledger
        .record_transaction(&id, order(2_000).with_due_date(Utc::now() - Duration::days(5)))
        .await
        .expect("order");

    let before = ledger.credit_summary(&id).await.expect("summary");
    assert_eq!(before.overdue_amount, Decimal::new(2_000, 0));
    assert_eq!(before.overdue_count, 1);

    ledger.settle_order(&id, &late.id).await.expect("settle");
    let after = ledger.credit_summary(&id).await.expect("summary");
    assert_eq!(after.overdue_count, 0);

    let error = ledger.settle_order(&id, &late.id).await.expect_err("already settled");
    assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidState(_))));
}

#[tokio::test]
async fn hold_blocks_credit_check_and_surfaces_in_alerts() {
    let ledger = sql_ledger().await;
    let id = CustomerId("C-1".to_string());

    ledger.set_credit_hold(&id, true, Some("bounced cheque".to_string())).await.expect("hold");
    let check = ledger.check_credit(&id, Decimal::new(10, 0)).await.expect("check");
    assert!(check.credit_hold);
    assert!(!check.passed);

    let alerts = ledger.credit_alert_customers().await.expect("alerts");
    assert_eq!(alerts.len(), 1);

    ledger.set_credit_hold(&id, false, None).await.expect("release");
    assert!(ledger.credit_alert_customers().await.expect("alerts").is_empty());
}

#[tokio::test]
async fn unknown_customer_and_bad_amounts_are_rejected() {
    let ledger = sql_ledger().await;
    let missing = CustomerId("nobody".to_string());

    let error = ledger.record_transaction(&missing, order(10)).await.expect_err("missing");
    assert!(matches!(error, ApplicationError::Domain(DomainError::NotFound { .. })));

    let error = ledger
        .record_transaction(&CustomerId("C-1".to_string()), order(0))
        .await
        .expect_err("zero order");
    assert!(matches!(error, ApplicationError::Domain(DomainError::Validation(_))));
}

#[tokio::test]
async fn customer_locks_are_released_once_writes_finish() {
    let ledger = sql_ledger().await;
    let id = CustomerId("C-1".to_string());

    ledger.record_transaction(&id, order(500)).await.expect("order");
    ledger.process_payment(&id, Decimal::new(100, 0), PaymentDetails::default()).await.expect("payment");
    ledger.update_credit_limit(&id, Decimal::new(50_000, 0), None, None).await.expect("limit");
    ledger.set_credit_hold(&id, true, None).await.expect("hold");
    ledger.recalculate_balance(&id).await.expect("recalculate");
    assert_eq!(ledger.locked_customer_count(), 0);

    for n in 0..5 {
        let stranger = CustomerId(format!("nobody-{n}"));
        ledger.record_transaction(&stranger, order(10)).await.expect_err("missing customer");
    }
    assert_eq!(ledger.locked_customer_count(), 0);
}

#[tokio::test]
async fn concurrent_postings_match_sequential_application() {
    let dir = TempDir::new().expect("temp dir");
    let repo = SqlCreditRepository::new(file_pool(&dir).await);
    repo.save_customer(&acme()).await.expect("save customer");
    let ledger = Arc::new(CreditLedger::new(repo));
    let id = CustomerId("C-1".to_string());

    let mut handles = Vec::new();
    for amount in 1..=10 {
        let ledger = Arc::clone(&ledger);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            ledger.record_transaction(&id, order(amount * 100)).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("record");
    }
    assert_eq!(ledger.locked_customer_count(), 0);

    let summary = ledger.credit_summary(&id).await.expect("summary");
    assert_eq!(summary.customer.current_balance, Decimal::new(5_500, 0));
    assert!(summary.customer.is_consistent());

    let recalculated = ledger.recalculate_balance(&id).await.expect("recalculate");
    assert_eq!(recalculated.current_balance, Decimal::new(5_500, 0));
}

#[tokio::test]
async fn independent_ledgers_retry_past_version_conflicts() {
    let dir = TempDir::new().expect("temp dir");
    let pool = file_pool(&dir).await;
    let seed = SqlCreditRepository::new(pool.clone());
    seed.save_customer(&acme()).await.expect("save customer");

    let settings = CreditSettings { max_write_attempts: 10, ..CreditSettings::default() };
    let first = Arc::new(CreditLedger::with_settings(SqlCreditRepository::new(pool.clone()), settings.clone()));
    let second = Arc::new(CreditLedger::with_settings(SqlCreditRepository::new(pool.clone()), settings));
    let id = CustomerId("C-1".to_string());

    let (left, right) = tokio::join!(
        first.record_transaction(&id, order(700)),
        second.record_transaction(&id, order(300)),
    );
    left.expect("first ledger");
    right.expect("second ledger");

    let customer = seed.find_customer(&id).await.expect("find").expect("present");
    assert_eq!(customer.current_balance, Decimal::new(1_000, 0));
    let history = seed.list_transactions(&id, &TransactionFilter::default()).await.expect("history");
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn in_memory_store_follows_the_same_ledger_rules() {
    let repo = InMemoryCreditRepository::default();
    repo.save_customer(&acme()).await.expect("save customer");
    let ledger = Arc::new(CreditLedger::new(repo));
    let id = CustomerId("C-1".to_string());

    let (left, right) = tokio::join!(
        ledger.record_transaction(&id, order(400)),
        ledger.process_payment(&id, Decimal::new(150, 0), PaymentDetails::default()),
    );
    left.expect("order");
    right.expect("payment");

    let recalculated = ledger.recalculate_balance(&id).await.expect("recalculate");
    assert_eq!(recalculated.current_balance, Decimal::new(250, 0));
    assert!(recalculated.is_consistent());
}

#[tokio::test]
async fn seeded_dataset_is_ledger_consistent() {
    let pool = memory_pool().await;
    DemoDataset::load(&pool).await.expect("seed");
    let ledger = CreditLedger::new(SqlCreditRepository::new(pool));

    let acme = CustomerId("cust-acme".to_string());
    let before = ledger.credit_summary(&acme).await.expect("summary");
    let recalculated = ledger.recalculate_balance(&acme).await.expect("recalculate");
    assert_eq!(before.customer.current_balance, recalculated.current_balance);

    let alerts = ledger.credit_alert_customers().await.expect("alerts");
    let ids: Vec<&str> = alerts.iter().map(|customer| customer.id.0.as_str()).collect();
    assert_eq!(ids, vec!["cust-globex", "cust-initech"]);

    let globex = ledger.credit_summary(&CustomerId("cust-globex".to_string())).await.expect("summary");
    assert_eq!(globex.overdue_count, 1);
}
