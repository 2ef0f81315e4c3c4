use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use tradedesk_core::domain::credit::{
    CreditTransaction, TransactionFilter, TransactionId, TransactionReference, TransactionType,
};
use tradedesk_core::domain::customer::{
    CreditProjection, Customer, CustomerGrade, CustomerId, CustomerStatus,
};
use tradedesk_core::store::{CreditTransactionStore, CustomerStore, LedgerPosting, StoreError};

use super::{
    decode_decimal, decode_optional_timestamp, decode_timestamp, encode_timestamp,
    RepositoryError,
};
use crate::DbPool;

const CUSTOMER_COLUMNS: &str = "id, name, grade, credit_limit, current_balance, available_credit,
    credit_hold, credit_hold_reason, status, version, created_at, updated_at, deleted_at";

const TRANSACTION_COLUMNS: &str = "id, customer_id, transaction_type, amount, balance_before,
    balance_after, reference_type, reference_id, reference_number, transaction_date, due_date,
    paid_date, description, processed_by, deleted_at";

/// Customers and their credit transactions. One repository owns both tables because every
/// ledger write touches both inside a single SQL transaction.
pub struct SqlCreditRepository {
    pool: DbPool,
}

impl SqlCreditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_customer_by_id(
        &self,
        id: &CustomerId,
    ) -> Result<Option<Customer>, RepositoryError> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customer WHERE id = ? AND deleted_at IS NULL");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    /// Inserts or overwrites the customer row, bumping its version on overwrite.
    pub async fn upsert_customer(&self, customer: &Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer (id, name, grade, credit_limit, current_balance, available_credit,
                 credit_hold, credit_hold_reason, status, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 grade = excluded.grade,
                 credit_limit = excluded.credit_limit,
                 current_balance = excluded.current_balance,
                 available_credit = excluded.available_credit,
                 credit_hold = excluded.credit_hold,
                 credit_hold_reason = excluded.credit_hold_reason,
                 status = excluded.status,
                 version = customer.version + 1,
                 updated_at = excluded.updated_at",
        )
        .bind(&customer.id.0)
        .bind(&customer.name)
        .bind(customer.grade.as_ref().map(|grade| grade.0.as_str()))
        .bind(customer.credit_limit.to_string())
        .bind(customer.current_balance.to_string())
        .bind(customer.available_credit.to_string())
        .bind(customer.credit_hold)
        .bind(customer.credit_hold_reason.as_deref())
        .bind(customer.status.as_str())
        .bind(customer.version)
        .bind(encode_timestamp(customer.created_at))
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_hold_state(
        &self,
        customer: &Customer,
        expected_version: i64,
    ) -> Result<Customer, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE customer
             SET credit_hold = ?, credit_hold_reason = ?, status = ?,
                 version = version + 1, updated_at = ?
             WHERE id = ? AND version = ? AND deleted_at IS NULL",
        )
        .bind(customer.credit_hold)
        .bind(customer.credit_hold_reason.as_deref())
        .bind(customer.status.as_str())
        .bind(encode_timestamp(Utc::now()))
        .bind(&customer.id.0)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(self.missing_or_conflict(&customer.id, expected_version).await);
        }
        self.reload_customer(&customer.id).await
    }

    /// Live customers on hold or with negative available credit, lowest credit first.
    pub async fn credit_alerts(&self) -> Result<Vec<Customer>, RepositoryError> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer
             WHERE deleted_at IS NULL
               AND (credit_hold = 1 OR CAST(available_credit AS REAL) < 0)"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut customers = rows.iter().map(customer_from_row).collect::<Result<Vec<_>, _>>()?;
        customers.sort_by(|left, right| {
            left.available_credit.cmp(&right.available_credit).then_with(|| left.id.cmp(&right.id))
        });
        Ok(customers)
    }

    /// Appends the transaction and rewrites the projection in one SQL transaction.
    ///
    /// The projection write is conditional on `expected_version`; on mismatch nothing is
    /// persisted and `Conflict` is returned.
    pub async fn post(&self, posting: &LedgerPosting) -> Result<CreditTransaction, RepositoryError> {
        let transaction = &posting.transaction;
        let mut tx = self.pool.begin().await?;

        let written = write_projection_in(
            &mut tx,
            &transaction.customer_id,
            posting.projection,
            posting.expected_version,
        )
        .await?;
        if !written {
            tx.rollback().await?;
            return Err(self.missing_or_conflict(&transaction.customer_id, posting.expected_version).await);
        }

        let reference = transaction.reference.as_ref();
        sqlx::query(
            "INSERT INTO credit_transaction (id, customer_id, transaction_type, amount,
                 balance_before, balance_after, reference_type, reference_id, reference_number,
                 transaction_date, due_date, paid_date, description, processed_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transaction.id.0)
        .bind(&transaction.customer_id.0)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.amount.to_string())
        .bind(transaction.balance_before.to_string())
        .bind(transaction.balance_after.to_string())
        .bind(reference.map(|reference| reference.reference_type.as_str()))
        .bind(reference.and_then(|reference| reference.reference_id.as_deref()))
        .bind(reference.and_then(|reference| reference.reference_number.as_deref()))
        .bind(encode_timestamp(transaction.transaction_date))
        .bind(transaction.due_date.map(encode_timestamp))
        .bind(transaction.paid_date.map(encode_timestamp))
        .bind(transaction.description.as_deref())
        .bind(transaction.processed_by.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transaction.clone())
    }

    pub async fn overwrite_projection(
        &self,
        customer_id: &CustomerId,
        projection: CreditProjection,
        expected_version: i64,
    ) -> Result<Customer, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let written = write_projection_in(&mut tx, customer_id, projection, expected_version).await?;
        if !written {
            tx.rollback().await?;
            return Err(self.missing_or_conflict(customer_id, expected_version).await);
        }
        tx.commit().await?;
        self.reload_customer(customer_id).await
    }

    /// Newest first; an unset limit returns every matching row.
    pub async fn transactions_for(
        &self,
        customer_id: &CustomerId,
        filter: &TransactionFilter,
    ) -> Result<Vec<CreditTransaction>, RepositoryError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transaction
             WHERE customer_id = ?1 AND deleted_at IS NULL
               AND (?2 IS NULL OR transaction_type = ?2)
               AND (?3 IS NULL OR transaction_date >= ?3)
               AND (?4 IS NULL OR transaction_date <= ?4)
             ORDER BY transaction_date DESC, rowid DESC
             LIMIT ?5 OFFSET ?6"
        );
        let rows = sqlx::query(&sql)
            .bind(&customer_id.0)
            .bind(filter.transaction_type.map(|kind| kind.as_str()))
            .bind(filter.date_from.map(encode_timestamp))
            .bind(filter.date_to.map(encode_timestamp))
            .bind(filter.limit.map_or(-1, i64::from))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    pub async fn find_transaction_by_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<CreditTransaction>, RepositoryError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transaction WHERE id = ? AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    pub async fn overdue_orders(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CreditTransaction>, RepositoryError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM credit_transaction
             WHERE customer_id = ? AND deleted_at IS NULL
               AND transaction_type = 'order'
               AND paid_date IS NULL
               AND due_date IS NOT NULL AND due_date < ?
             ORDER BY due_date ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(&customer_id.0)
            .bind(encode_timestamp(now))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    /// Sets the paid date once; an already stamped row is returned unchanged.
    pub async fn stamp_paid_date(
        &self,
        id: &TransactionId,
        paid_at: DateTime<Utc>,
    ) -> Result<CreditTransaction, RepositoryError> {
        sqlx::query(
            "UPDATE credit_transaction SET paid_date = ?
             WHERE id = ? AND deleted_at IS NULL AND paid_date IS NULL",
        )
        .bind(encode_timestamp(paid_at))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        self.find_transaction_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound { entity: "credit transaction", id: id.0.clone() })
    }

    async fn reload_customer(&self, id: &CustomerId) -> Result<Customer, RepositoryError> {
        self.find_customer_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound { entity: "customer", id: id.0.clone() })
    }

    async fn missing_or_conflict(&self, id: &CustomerId, expected_version: i64) -> RepositoryError {
        match self.find_customer_by_id(id).await {
            Ok(Some(_)) => {
                RepositoryError::Conflict { entity: "customer", id: id.0.clone(), expected_version }
            }
            Ok(None) => RepositoryError::NotFound { entity: "customer", id: id.0.clone() },
            Err(error) => error,
        }
    }
}

async fn write_projection_in(
    tx: &mut Transaction<'_, Sqlite>,
    customer_id: &CustomerId,
    projection: CreditProjection,
    expected_version: i64,
) -> Result<bool, RepositoryError> {
    let updated = sqlx::query(
        "UPDATE customer
         SET credit_limit = ?, current_balance = ?, available_credit = ?,
             version = version + 1, updated_at = ?
         WHERE id = ? AND version = ? AND deleted_at IS NULL",
    )
    .bind(projection.credit_limit.to_string())
    .bind(projection.current_balance.to_string())
    .bind(projection.available_credit.to_string())
    .bind(encode_timestamp(Utc::now()))
    .bind(&customer_id.0)
    .bind(expected_version)
    .execute(&mut **tx)
    .await?;

    Ok(updated.rows_affected() == 1)
}

#[async_trait]
impl CustomerStore for SqlCreditRepository {
    async fn find_customer(&self, id: &CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.find_customer_by_id(id).await?)
    }

    async fn save_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        Ok(self.upsert_customer(customer).await?)
    }

    async fn update_hold(
        &self,
        customer: &Customer,
        expected_version: i64,
    ) -> Result<Customer, StoreError> {
        Ok(self.update_hold_state(customer, expected_version).await?)
    }

    async fn list_credit_alerts(&self) -> Result<Vec<Customer>, StoreError> {
        Ok(self.credit_alerts().await?)
    }
}

#[async_trait]
impl CreditTransactionStore for SqlCreditRepository {
    async fn post_transaction(
        &self,
        posting: &LedgerPosting,
    ) -> Result<CreditTransaction, StoreError> {
        Ok(self.post(posting).await?)
    }

    async fn write_projection(
        &self,
        customer_id: &CustomerId,
        projection: CreditProjection,
        expected_version: i64,
    ) -> Result<Customer, StoreError> {
        Ok(self.overwrite_projection(customer_id, projection, expected_version).await?)
    }

    async fn list_transactions(
        &self,
        customer_id: &CustomerId,
        filter: &TransactionFilter,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        Ok(self.transactions_for(customer_id, filter).await?)
    }

    async fn find_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<CreditTransaction>, StoreError> {
        Ok(self.find_transaction_by_id(id).await?)
    }

    async fn list_overdue_orders(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        Ok(self.overdue_orders(customer_id, now).await?)
    }

    async fn stamp_paid(
        &self,
        id: &TransactionId,
        paid_at: DateTime<Utc>,
    ) -> Result<CreditTransaction, StoreError> {
        Ok(self.stamp_paid_date(id, paid_at).await?)
    }
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    let grade: Option<String> = row.try_get("grade")?;
    let credit_limit: String = row.try_get("credit_limit")?;
    let current_balance: String = row.try_get("current_balance")?;
    let available_credit: String = row.try_get("available_credit")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Customer {
        id: CustomerId(row.try_get("id")?),
        name: row.try_get("name")?,
        grade: grade.map(CustomerGrade),
        credit_limit: decode_decimal("credit_limit", &credit_limit)?,
        current_balance: decode_decimal("current_balance", &current_balance)?,
        available_credit: decode_decimal("available_credit", &available_credit)?,
        credit_hold: row.try_get("credit_hold")?,
        credit_hold_reason: row.try_get("credit_hold_reason")?,
        status: CustomerStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown customer status `{status}`")))?,
        version: row.try_get("version")?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
        deleted_at: decode_optional_timestamp("deleted_at", row.try_get("deleted_at")?)?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<CreditTransaction, RepositoryError> {
    let transaction_type: String = row.try_get("transaction_type")?;
    let amount: String = row.try_get("amount")?;
    let balance_before: String = row.try_get("balance_before")?;
    let balance_after: String = row.try_get("balance_after")?;
    let reference_type: Option<String> = row.try_get("reference_type")?;
    let transaction_date: String = row.try_get("transaction_date")?;

    let reference = match reference_type {
        Some(reference_type) => Some(TransactionReference {
            reference_type,
            reference_id: row.try_get("reference_id")?,
            reference_number: row.try_get("reference_number")?,
        }),
        None => None,
    };

    Ok(CreditTransaction {
        id: TransactionId(row.try_get("id")?),
        customer_id: CustomerId(row.try_get("customer_id")?),
        transaction_type: TransactionType::parse(&transaction_type).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown transaction_type `{transaction_type}`"))
        })?,
        amount: decode_decimal("amount", &amount)?,
        balance_before: decode_decimal("balance_before", &balance_before)?,
        balance_after: decode_decimal("balance_after", &balance_after)?,
        reference,
        transaction_date: decode_timestamp("transaction_date", &transaction_date)?,
        due_date: decode_optional_timestamp("due_date", row.try_get("due_date")?)?,
        paid_date: decode_optional_timestamp("paid_date", row.try_get("paid_date")?)?,
        description: row.try_get("description")?,
        processed_by: row.try_get("processed_by")?,
        deleted_at: decode_optional_timestamp("deleted_at", row.try_get("deleted_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use tradedesk_core::domain::credit::{
        CreditTransaction, TransactionFilter, TransactionId, TransactionType,
    };
    use tradedesk_core::domain::customer::{Customer, CustomerId};
    use tradedesk_core::store::{
        CreditTransactionStore, CustomerStore, LedgerPosting, StoreError,
    };

    use super::SqlCreditRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlCreditRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlCreditRepository::new(pool)
    }

    fn customer(id: &str, limit: i64) -> Customer {
        Customer::new(CustomerId(id.to_string()), "Acme Trading", None, Decimal::new(limit, 0))
    }

    fn posting(customer: &Customer, kind: TransactionType, amount: i64) -> LedgerPosting {
        let amount = Decimal::new(amount, 0);
        let balance_after = customer.current_balance + kind.signed_amount(amount);
        LedgerPosting {
            transaction: CreditTransaction {
                id: TransactionId(Uuid::new_v4().to_string()),
                customer_id: customer.id.clone(),
                transaction_type: kind,
                amount,
                balance_before: customer.current_balance,
                balance_after,
                reference: None,
                transaction_date: Utc::now(),
                due_date: None,
                paid_date: None,
                description: None,
                processed_by: None,
                deleted_at: None,
            },
            projection: customer.with_balance(balance_after),
            expected_version: customer.version,
        }
    }

    #[tokio::test]
    async fn posting_writes_row_and_projection_together() {
        let repo = repository().await;
        repo.save_customer(&customer("C-1", 100_000)).await.expect("save");
        let stored = repo.find_customer(&CustomerId("C-1".to_string())).await.expect("find").expect("present");

        repo.post_transaction(&posting(&stored, TransactionType::Order, 2_500)).await.expect("post");

        let updated = repo.find_customer(&stored.id).await.expect("find").expect("present");
        assert_eq!(updated.current_balance, Decimal::new(2_500, 0));
        assert_eq!(updated.available_credit, Decimal::new(97_500, 0));
        assert_eq!(updated.version, stored.version + 1);

        let history = repo.list_transactions(&stored.id, &TransactionFilter::default()).await.expect("list");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].balance_after, Decimal::new(2_500, 0));
    }

    #[tokio::test]
    async fn stale_version_is_rejected_and_nothing_is_written() {
        let repo = repository().await;
        repo.save_customer(&customer("C-1", 100_000)).await.expect("save");
        let stale = repo.find_customer(&CustomerId("C-1".to_string())).await.expect("find").expect("present");

        repo.post_transaction(&posting(&stale, TransactionType::Order, 100)).await.expect("first post");
        let error = repo
            .post_transaction(&posting(&stale, TransactionType::Order, 100))
            .await
            .expect_err("stale version must conflict");
        assert!(matches!(error, StoreError::Conflict { .. }));

        let history = repo.list_transactions(&stale.id, &TransactionFilter::default()).await.expect("list");
        assert_eq!(history.len(), 1);
        let current = repo.find_customer(&stale.id).await.expect("find").expect("present");
        assert_eq!(current.current_balance, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn posting_for_unknown_customer_is_not_found() {
        let repo = repository().await;
        let ghost = customer("ghost", 10);
        let error = repo
            .post_transaction(&posting(&ghost, TransactionType::Order, 1))
            .await
            .expect_err("unknown customer");
        assert!(matches!(error, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn transactions_filter_and_paginate_newest_first() {
        let repo = repository().await;
        repo.save_customer(&customer("C-1", 100_000)).await.expect("save");
        let id = CustomerId("C-1".to_string());

        for (kind, amount) in [
            (TransactionType::Order, 300),
            (TransactionType::Payment, 100),
            (TransactionType::Order, 200),
        ] {
            let current = repo.find_customer(&id).await.expect("find").expect("present");
            repo.post_transaction(&posting(&current, kind, amount)).await.expect("post");
        }

        let orders = repo
            .list_transactions(
                &id,
                &TransactionFilter { transaction_type: Some(TransactionType::Order), ..TransactionFilter::default() },
            )
            .await
            .expect("orders");
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].amount, Decimal::new(200, 0));

        let page = repo
            .list_transactions(&id, &TransactionFilter { limit: Some(1), offset: 1, ..TransactionFilter::default() })
            .await
            .expect("page");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].transaction_type, TransactionType::Payment);
    }

    #[tokio::test]
    async fn overdue_orders_exclude_settled_rows() {
        let repo = repository().await;
        repo.save_customer(&customer("C-1", 100_000)).await.expect("save");
        let id = CustomerId("C-1".to_string());

        let current = repo.find_customer(&id).await.expect("find").expect("present");
        let mut late = posting(&current, TransactionType::Order, 400);
        late.transaction.due_date = Some(Utc::now() - Duration::days(3));
        let recorded = repo.post_transaction(&late).await.expect("post");

        assert_eq!(repo.list_overdue_orders(&id, Utc::now()).await.expect("overdue").len(), 1);

        let settled = repo.stamp_paid(&recorded.id, Utc::now()).await.expect("settle");
        assert!(settled.paid_date.is_some());
        assert!(repo.list_overdue_orders(&id, Utc::now()).await.expect("overdue").is_empty());
    }

    #[tokio::test]
    async fn alerts_list_held_and_overdrawn_customers_lowest_credit_first() {
        let repo = repository().await;
        let healthy = customer("healthy", 1_000);
        let mut held = customer("held", 1_000);
        held.credit_hold = true;
        let mut overdrawn = customer("overdrawn", 1_000);
        overdrawn.apply_projection(overdrawn.with_balance(Decimal::new(1_500, 0)));
        let mut deeper = customer("deeper", 100);
        deeper.apply_projection(deeper.with_balance(Decimal::new(10_100, 0)));

        for entry in [&healthy, &held, &overdrawn, &deeper] {
            repo.save_customer(entry).await.expect("save");
        }

        let ids: Vec<String> =
            repo.list_credit_alerts().await.expect("alerts").into_iter().map(|entry| entry.id.0).collect();
        assert_eq!(ids, vec!["deeper", "overdrawn", "held"]);
    }
}
