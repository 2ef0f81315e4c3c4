use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::{Customer, CustomerId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCheckResult {
    pub customer_id: CustomerId,
    pub order_amount: Decimal,
    pub credit_limit: Decimal,
    pub current_balance: Decimal,
    pub available_credit: Decimal,
    /// Balance after the order as a percentage of the limit.
    pub usage_rate: Decimal,
    pub credit_hold: bool,
    pub exceeds_limit: bool,
    /// Zero unless `exceeds_limit`.
    pub exceeds_amount: Decimal,
    pub passed: bool,
    pub warnings: Vec<String>,
}

/// Evaluates whether `order_amount` fits the customer's remaining credit.
///
/// Breaching the limit only fails the check; it never changes the customer's hold state.
pub fn evaluate_credit(
    customer: &Customer,
    order_amount: Decimal,
    usage_warning_pct: Decimal,
) -> CreditCheckResult {
    let shortfall = order_amount - customer.available_credit;
    let exceeds_limit = shortfall > Decimal::ZERO;
    let usage_rate = usage_rate(customer.current_balance + order_amount, customer.credit_limit);

    let mut warnings = Vec::new();
    if usage_rate > usage_warning_pct && usage_rate <= Decimal::ONE_HUNDRED {
        warnings.push(format!(
            "credit usage would reach {usage_rate:.1}%, above the {usage_warning_pct}% warning level"
        ));
    }
    if customer.credit_hold {
        warnings.push(match customer.credit_hold_reason.as_deref() {
            Some(reason) => format!("customer is on credit hold: {reason}"),
            None => "customer is on credit hold".to_string(),
        });
    }
    if exceeds_limit {
        warnings.push(format!("order exceeds available credit by {shortfall}"));
    }

    CreditCheckResult {
        customer_id: customer.id.clone(),
        order_amount,
        credit_limit: customer.credit_limit,
        current_balance: customer.current_balance,
        available_credit: customer.available_credit,
        usage_rate,
        credit_hold: customer.credit_hold,
        exceeds_limit,
        exceeds_amount: if exceeds_limit { shortfall } else { Decimal::ZERO },
        passed: !customer.credit_hold && !exceeds_limit,
        warnings,
    }
}

fn usage_rate(balance_after_order: Decimal, credit_limit: Decimal) -> Decimal {
    if credit_limit.is_zero() {
        return Decimal::ONE_HUNDRED;
    }
    balance_after_order / credit_limit * Decimal::ONE_HUNDRED
}
