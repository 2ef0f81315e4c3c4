use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::credit::CreditTransaction;
use crate::domain::customer::Customer;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSummary {
    pub customer: Customer,
    pub recent_transactions: Vec<CreditTransaction>,
    pub overdue_amount: Decimal,
    pub overdue_count: usize,
}

impl CreditSummary {
    pub fn compose(
        customer: Customer,
        recent_transactions: Vec<CreditTransaction>,
        candidates: &[CreditTransaction],
        now: DateTime<Utc>,
    ) -> Self {
        let (overdue_amount, overdue_count) = overdue_totals(candidates, now);
        Self { customer, recent_transactions, overdue_amount, overdue_count }
    }
}

/// Sum and count of unpaid orders past their due date.
pub fn overdue_totals(transactions: &[CreditTransaction], now: DateTime<Utc>) -> (Decimal, usize) {
    transactions
        .iter()
        .filter(|transaction| transaction.is_overdue(now))
        .fold((Decimal::ZERO, 0), |(amount, count), transaction| {
            (amount + transaction.amount, count + 1)
        })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::overdue_totals;
    use crate::domain::credit::{CreditTransaction, TransactionId, TransactionType};
    use crate::domain::customer::CustomerId;

    fn order(id: &str, amount: i64, due_in_days: i64, paid: bool) -> CreditTransaction {
        let now = Utc::now();
        CreditTransaction {
            id: TransactionId(id.to_string()),
            customer_id: CustomerId("C-1".to_string()),
            transaction_type: TransactionType::Order,
            amount: Decimal::new(amount, 0),
            balance_before: Decimal::ZERO,
            balance_after: Decimal::new(amount, 0),
            reference: None,
            transaction_date: now - Duration::days(45),
            due_date: Some(now + Duration::days(due_in_days)),
            paid_date: paid.then_some(now),
            description: None,
            processed_by: None,
            deleted_at: None,
        }
    }

    #[test]
    fn counts_only_unpaid_past_due_orders() {
        let history = vec![
            order("late", 300, -5, false),
            order("also-late", 200, -1, false),
            order("settled", 900, -10, true),
            order("not-due", 400, 7, false),
        ];

        let (amount, count) = overdue_totals(&history, Utc::now());
        assert_eq!(amount, Decimal::new(500, 0));
        assert_eq!(count, 2);
    }
}
