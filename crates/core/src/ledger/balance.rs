use rust_decimal::Decimal;

use crate::domain::credit::{CreditTransaction, TransactionType};
use crate::domain::SoftDelete;
use crate::errors::DomainError;

/// Balance after posting `amount` of `kind` on top of `balance_before`.
pub fn post_balance(kind: TransactionType, amount: Decimal, balance_before: Decimal) -> Decimal {
    balance_before + kind.signed_amount(amount)
}

/// Rebuilds a balance from zero out of a transaction history.
///
/// Only live rows count. The result does not depend on iteration order.
pub fn replay_balance<'a>(transactions: impl IntoIterator<Item = &'a CreditTransaction>) -> Decimal {
    transactions
        .into_iter()
        .filter(|transaction| transaction.is_live())
        .map(|transaction| transaction.transaction_type.signed_amount(transaction.amount))
        .sum()
}

pub fn validate_amount(kind: TransactionType, amount: Decimal) -> Result<(), DomainError> {
    if kind.is_signed() || amount > Decimal::ZERO {
        return Ok(());
    }
    Err(DomainError::Validation(format!("{kind} amount must be positive, got {amount}")))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{post_balance, replay_balance, validate_amount};
    use crate::domain::credit::{CreditTransaction, TransactionId, TransactionType};
    use crate::domain::customer::CustomerId;

    fn posted(kind: TransactionType, amount: i64) -> CreditTransaction {
        CreditTransaction {
            id: TransactionId(format!("T-{kind}-{amount}")),
            customer_id: CustomerId("C-1".to_string()),
            transaction_type: kind,
            amount: Decimal::new(amount, 0),
            balance_before: Decimal::ZERO,
            balance_after: Decimal::ZERO,
            reference: None,
            transaction_date: Utc::now(),
            due_date: None,
            paid_date: None,
            description: None,
            processed_by: None,
            deleted_at: None,
        }
    }

    #[test]
    fn post_balance_applies_type_sign() {
        let before = Decimal::new(1_000, 0);
        assert_eq!(
            post_balance(TransactionType::Order, Decimal::new(250, 0), before),
            Decimal::new(1_250, 0)
        );
        assert_eq!(
            post_balance(TransactionType::Payment, Decimal::new(250, 0), before),
            Decimal::new(750, 0)
        );
        assert_eq!(
            post_balance(TransactionType::WriteOff, Decimal::new(-100, 0), before),
            Decimal::new(900, 0)
        );
    }

    #[test]
    fn replay_is_order_independent_and_skips_deleted_rows() {
        let mut history = vec![
            posted(TransactionType::Order, 500),
            posted(TransactionType::Payment, 200),
            posted(TransactionType::Adjustment, -50),
            posted(TransactionType::Refund, 25),
        ];
        let forward = replay_balance(&history);
        history.reverse();
        assert_eq!(replay_balance(&history), forward);
        assert_eq!(forward, Decimal::new(225, 0));

        let mut voided = posted(TransactionType::Order, 1_000);
        voided.deleted_at = Some(Utc::now());
        history.push(voided);
        assert_eq!(replay_balance(&history), forward);
    }

    #[test]
    fn replay_of_empty_history_is_zero() {
        let history: Vec<CreditTransaction> = Vec::new();
        assert_eq!(replay_balance(&history), Decimal::ZERO);
    }

    #[test]
    fn unsigned_types_require_positive_amounts() {
        assert!(validate_amount(TransactionType::Order, Decimal::ZERO).is_err());
        assert!(validate_amount(TransactionType::Payment, Decimal::new(-1, 0)).is_err());
        assert!(validate_amount(TransactionType::Refund, Decimal::new(1, 0)).is_ok());
        assert!(validate_amount(TransactionType::Adjustment, Decimal::new(-1, 0)).is_ok());
        assert!(validate_amount(TransactionType::WriteOff, Decimal::ZERO).is_ok());
    }
}
