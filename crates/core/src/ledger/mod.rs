//! Customer credit ledger.
//!
//! Every balance change is an appended [`CreditTransaction`] plus a rewrite of the customer's
//! projection (`current_balance`, `available_credit`), persisted together by the store. Writes
//! for one customer are serialized in process by a per-customer async mutex and across
//! processes by the customer row's `version`. A version conflict means nothing was written,
//! so the ledger re-reads and recomputes up to `max_write_attempts` times.

pub mod balance;
pub mod check;
pub mod summary;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CreditConfig;
use crate::domain::credit::{
    CreditTransaction, NewCreditTransaction, TransactionFilter, TransactionId, TransactionType,
};
use crate::domain::customer::{CreditProjection, Customer, CustomerId};
use crate::errors::{ApplicationError, DomainError};
use crate::store::{CreditTransactionStore, CustomerStore, LedgerPosting, StoreError};

pub use balance::{post_balance, replay_balance, validate_amount};
pub use check::{evaluate_credit, CreditCheckResult};
pub use summary::{overdue_totals, CreditSummary};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreditSettings {
    pub usage_warning_pct: Decimal,
    pub recent_transactions: u32,
    pub max_write_attempts: u32,
}

impl Default for CreditSettings {
    fn default() -> Self {
        Self { usage_warning_pct: Decimal::new(80, 0), recent_transactions: 20, max_write_attempts: 3 }
    }
}

impl TryFrom<&CreditConfig> for CreditSettings {
    type Error = ApplicationError;

    fn try_from(config: &CreditConfig) -> Result<Self, Self::Error> {
        let usage_warning_pct = Decimal::try_from(config.usage_warning_pct).map_err(|error| {
            ApplicationError::Configuration(format!("credit.usage_warning_pct: {error}"))
        })?;
        Ok(Self {
            usage_warning_pct,
            recent_transactions: config.recent_transactions,
            max_write_attempts: config.max_write_attempts.max(1),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<String>,
}

impl PaymentDetails {
    /// `"payment via wire (ref WT-1): partial"`-style description, or `None` when empty.
    pub fn description(&self) -> Option<String> {
        let method = non_blank(&self.method);
        let reference = non_blank(&self.reference);
        let notes = non_blank(&self.notes);
        if method.is_none() && reference.is_none() && notes.is_none() {
            return None;
        }

        let mut description = String::from("payment");
        if let Some(method) = method {
            description.push_str(&format!(" via {method}"));
        }
        if let Some(reference) = reference {
            description.push_str(&format!(" (ref {reference})"));
        }
        if let Some(notes) = notes {
            description.push_str(&format!(": {notes}"));
        }
        Some(description)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

type LockMap = Mutex<HashMap<CustomerId, Arc<AsyncMutex<()>>>>;

pub struct CreditLedger<S> {
    store: S,
    settings: CreditSettings,
    locks: LockMap,
}

/// Holds one customer's write lock. Dropping the last holder removes the map entry.
struct CustomerLock<'a> {
    locks: &'a LockMap,
    customer_id: CustomerId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CustomerLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map's own handle left: no holder and no waiter.
        if locks.get(&self.customer_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.customer_id);
        }
    }
}

impl<S> CreditLedger<S>
where
    S: CustomerStore + CreditTransactionStore,
{
    pub fn new(store: S) -> Self {
        Self::with_settings(store, CreditSettings::default())
    }

    pub fn with_settings(store: S, settings: CreditSettings) -> Self {
        Self { store, settings, locks: Mutex::new(HashMap::new()) }
    }

    pub fn settings(&self) -> &CreditSettings {
        &self.settings
    }

    /// Customers with a write in flight or waiting on their lock.
    pub fn locked_customer_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn check_credit(
        &self,
        customer_id: &CustomerId,
        order_amount: Decimal,
    ) -> Result<CreditCheckResult, ApplicationError> {
        if order_amount < Decimal::ZERO {
            return Err(DomainError::Validation("order amount must not be negative".to_string())
                .into());
        }
        let customer = self.load_customer(customer_id).await?;
        let result = evaluate_credit(&customer, order_amount, self.settings.usage_warning_pct);

        info!(
            event_name = "credit.check.evaluated",
            customer_id = %customer_id.0,
            order_amount = %order_amount,
            passed = result.passed,
            warning_count = result.warnings.len(),
            "credit check evaluated"
        );
        Ok(result)
    }

    pub async fn record_transaction(
        &self,
        customer_id: &CustomerId,
        input: NewCreditTransaction,
    ) -> Result<CreditTransaction, ApplicationError> {
        validate_amount(input.transaction_type, input.amount)?;

        let lock = self.lock_customer(customer_id).await;
        let recorded = self
            .post_with_retry(&lock, |customer| {
                let transaction = draft_transaction(customer, &input);
                let projection = customer.with_balance(transaction.balance_after);
                (transaction, projection)
            })
            .await?;

        info!(
            event_name = "credit.transaction.recorded",
            customer_id = %customer_id.0,
            transaction_id = %recorded.id.0,
            transaction_type = %recorded.transaction_type,
            amount = %recorded.amount,
            balance_after = %recorded.balance_after,
            "credit transaction recorded"
        );
        Ok(recorded)
    }

    /// Records a payment, already marked paid, in one write.
    pub async fn process_payment(
        &self,
        customer_id: &CustomerId,
        amount: Decimal,
        details: PaymentDetails,
    ) -> Result<CreditTransaction, ApplicationError> {
        let mut input = NewCreditTransaction::new(TransactionType::Payment, amount);
        input.description = details.description();
        input.processed_by = details.processed_by.clone();
        validate_amount(input.transaction_type, input.amount)?;

        let lock = self.lock_customer(customer_id).await;
        let recorded = self
            .post_with_retry(&lock, |customer| {
                let mut transaction = draft_transaction(customer, &input);
                transaction.paid_date = Some(transaction.transaction_date);
                let projection = customer.with_balance(transaction.balance_after);
                (transaction, projection)
            })
            .await?;

        info!(
            event_name = "credit.payment.processed",
            customer_id = %customer_id.0,
            transaction_id = %recorded.id.0,
            amount = %recorded.amount,
            balance_after = %recorded.balance_after,
            "payment processed"
        );
        Ok(recorded)
    }

    /// Rebuilds the projection from the live transaction history.
    pub async fn recalculate_balance(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Customer, ApplicationError> {
        let _lock = self.lock_customer(customer_id).await;

        for attempt in 1..=self.settings.max_write_attempts {
            let customer = self.load_customer(customer_id).await?;
            let history =
                self.store.list_transactions(customer_id, &TransactionFilter::default()).await?;
            let balance = replay_balance(&history);
            let projection = customer.with_balance(balance);

            match self.store.write_projection(customer_id, projection, customer.version).await {
                Ok(updated) => {
                    info!(
                        event_name = "credit.balance.recalculated",
                        customer_id = %customer_id.0,
                        transaction_count = history.len(),
                        previous_balance = %customer.current_balance,
                        current_balance = %updated.current_balance,
                        "customer balance recalculated"
                    );
                    return Ok(updated);
                }
                Err(error @ StoreError::Conflict { .. }) => note_conflict(customer_id, attempt, &error),
                Err(error) => return Err(error.into()),
            }
        }

        Err(self.attempts_exhausted(customer_id))
    }

    pub async fn credit_summary(
        &self,
        customer_id: &CustomerId,
    ) -> Result<CreditSummary, ApplicationError> {
        let customer = self.load_customer(customer_id).await?;
        let recent = self
            .store
            .list_transactions(customer_id, &TransactionFilter::recent(self.settings.recent_transactions))
            .await?;
        let now = Utc::now();
        let overdue = self.store.list_overdue_orders(customer_id, now).await?;

        Ok(CreditSummary::compose(customer, recent, &overdue, now))
    }

    pub async fn list_transactions(
        &self,
        customer_id: &CustomerId,
        filter: &TransactionFilter,
    ) -> Result<Vec<CreditTransaction>, ApplicationError> {
        self.load_customer(customer_id).await?;
        Ok(self.store.list_transactions(customer_id, filter).await?)
    }

    /// Marks an unpaid order as paid, which drops it from the overdue totals.
    pub async fn settle_order(
        &self,
        customer_id: &CustomerId,
        transaction_id: &TransactionId,
    ) -> Result<CreditTransaction, ApplicationError> {
        let transaction = self
            .store
            .find_transaction(transaction_id)
            .await?
            .filter(|transaction| &transaction.customer_id == customer_id)
            .ok_or_else(|| DomainError::not_found("credit transaction", transaction_id.0.clone()))?;

        if transaction.transaction_type != TransactionType::Order {
            return Err(DomainError::InvalidState(format!(
                "transaction {} is a {}, only orders can be settled",
                transaction_id.0, transaction.transaction_type
            ))
            .into());
        }
        if transaction.paid_date.is_some() {
            return Err(DomainError::InvalidState(format!(
                "order {} is already settled",
                transaction_id.0
            ))
            .into());
        }

        let settled = self.store.stamp_paid(transaction_id, Utc::now()).await?;
        info!(
            event_name = "credit.order.settled",
            customer_id = %customer_id.0,
            transaction_id = %transaction_id.0,
            amount = %settled.amount,
            "order settled"
        );
        Ok(settled)
    }

    /// Changes the limit and appends a zero-amount adjustment describing the change.
    pub async fn update_credit_limit(
        &self,
        customer_id: &CustomerId,
        new_limit: Decimal,
        reason: Option<String>,
        processed_by: Option<String>,
    ) -> Result<Customer, ApplicationError> {
        if new_limit < Decimal::ZERO {
            return Err(DomainError::Validation("credit limit must not be negative".to_string())
                .into());
        }

        let mut input = NewCreditTransaction::new(TransactionType::Adjustment, Decimal::ZERO);
        input.processed_by = processed_by;
        let reason = reason.filter(|value| !value.trim().is_empty());

        let lock = self.lock_customer(customer_id).await;
        self.post_with_retry(&lock, |customer| {
            let mut transaction = draft_transaction(customer, &input);
            let change = format!("credit limit changed from {} to {new_limit}", customer.credit_limit);
            transaction.description = Some(match &reason {
                Some(reason) => format!("{change}: {reason}"),
                None => change,
            });
            (transaction, CreditProjection::new(new_limit, customer.current_balance))
        })
        .await?;
        let customer = self.load_customer(customer_id).await?;
        drop(lock);

        info!(
            event_name = "credit.limit.updated",
            customer_id = %customer_id.0,
            credit_limit = %customer.credit_limit,
            available_credit = %customer.available_credit,
            "credit limit updated"
        );
        Ok(customer)
    }

    /// Places the customer on credit hold (`hold = true`) or releases it.
    pub async fn set_credit_hold(
        &self,
        customer_id: &CustomerId,
        hold: bool,
        reason: Option<String>,
    ) -> Result<Customer, ApplicationError> {
        let _lock = self.lock_customer(customer_id).await;

        for attempt in 1..=self.settings.max_write_attempts {
            let mut customer = self.load_customer(customer_id).await?;
            let expected_version = customer.version;
            if hold {
                customer.place_on_hold(reason.clone())?;
            } else {
                customer.release_hold()?;
            }

            match self.store.update_hold(&customer, expected_version).await {
                Ok(updated) => {
                    info!(
                        event_name = "credit.hold.changed",
                        customer_id = %customer_id.0,
                        credit_hold = updated.credit_hold,
                        status = updated.status.as_str(),
                        "credit hold changed"
                    );
                    return Ok(updated);
                }
                Err(error @ StoreError::Conflict { .. }) => note_conflict(customer_id, attempt, &error),
                Err(error) => return Err(error.into()),
            }
        }

        Err(self.attempts_exhausted(customer_id))
    }

    pub async fn credit_alert_customers(&self) -> Result<Vec<Customer>, ApplicationError> {
        Ok(self.store.list_credit_alerts().await?)
    }

    async fn load_customer(&self, customer_id: &CustomerId) -> Result<Customer, ApplicationError> {
        self.store
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| DomainError::not_found("customer", customer_id.0.clone()).into())
    }

    /// Runs read, compute and conditional write while `lock` is held, re-reading on
    /// version conflicts.
    async fn post_with_retry<F>(
        &self,
        lock: &CustomerLock<'_>,
        compute: F,
    ) -> Result<CreditTransaction, ApplicationError>
    where
        F: Fn(&Customer) -> (CreditTransaction, CreditProjection),
    {
        let customer_id = &lock.customer_id;
        for attempt in 1..=self.settings.max_write_attempts {
            let customer = self.load_customer(customer_id).await?;
            let (transaction, projection) = compute(&customer);
            let posting =
                LedgerPosting { transaction, projection, expected_version: customer.version };

            match self.store.post_transaction(&posting).await {
                Ok(recorded) => return Ok(recorded),
                Err(error @ StoreError::Conflict { .. }) => note_conflict(customer_id, attempt, &error),
                Err(error) => return Err(error.into()),
            }
        }

        Err(self.attempts_exhausted(customer_id))
    }

    async fn lock_customer(&self, customer_id: &CustomerId) -> CustomerLock<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(customer_id.clone()).or_default())
        };
        CustomerLock {
            locks: &self.locks,
            customer_id: customer_id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn attempts_exhausted(&self, customer_id: &CustomerId) -> ApplicationError {
        warn!(
            event_name = "credit.write.exhausted",
            customer_id = %customer_id.0,
            attempts = self.settings.max_write_attempts,
            "giving up after repeated concurrent updates"
        );
        DomainError::InvalidState(format!(
            "concurrent update on customer {}; retry the operation",
            customer_id.0
        ))
        .into()
    }
}

fn note_conflict(customer_id: &CustomerId, attempt: u32, error: &StoreError) {
    warn!(
        event_name = "credit.write.conflict",
        customer_id = %customer_id.0,
        attempt,
        error = %error,
        "customer row changed underneath the ledger; re-reading"
    );
}

fn draft_transaction(customer: &Customer, input: &NewCreditTransaction) -> CreditTransaction {
    let balance_before = customer.current_balance;
    CreditTransaction {
        id: TransactionId(Uuid::new_v4().to_string()),
        customer_id: customer.id.clone(),
        transaction_type: input.transaction_type,
        amount: input.amount,
        balance_before,
        balance_after: post_balance(input.transaction_type, input.amount, balance_before),
        reference: input.reference.clone(),
        transaction_date: Utc::now(),
        due_date: input.due_date,
        paid_date: None,
        description: input.description.clone(),
        processed_by: input.processed_by.clone(),
        deleted_at: None,
    }
}
