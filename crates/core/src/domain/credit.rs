use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::SoftDelete;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Order,
    Payment,
    Refund,
    Adjustment,
    WriteOff,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Payment => "payment",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
            Self::WriteOff => "write_off",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "order" => Some(Self::Order),
            "payment" => Some(Self::Payment),
            "refund" => Some(Self::Refund),
            "adjustment" => Some(Self::Adjustment),
            "write_off" | "write-off" | "writeoff" => Some(Self::WriteOff),
            _ => None,
        }
    }

    /// Effect of `amount` on the balance owed to the operator.
    ///
    /// Orders raise the balance, payments and refunds lower it, and adjustments and
    /// write-offs carry their own sign.
    pub fn signed_amount(&self, amount: Decimal) -> Decimal {
        match self {
            Self::Order => amount,
            Self::Payment | Self::Refund => -amount,
            Self::Adjustment | Self::WriteOff => amount,
        }
    }

    /// Signed types accept zero and negative amounts; the others must be positive.
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Adjustment | Self::WriteOff)
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business document a transaction was posted for (order, invoice, credit note...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReference {
    pub reference_type: String,
    pub reference_id: Option<String>,
    pub reference_number: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reference: Option<TransactionReference>,
    pub transaction_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub processed_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CreditTransaction {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.transaction_type == TransactionType::Order
            && self.paid_date.is_none()
            && self.due_date.is_some_and(|due| due < now)
    }
}

impl SoftDelete for CreditTransaction {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// Caller-supplied part of a transaction; balances and dates are filled in by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCreditTransaction {
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub reference: Option<TransactionReference>,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub processed_by: Option<String>,
}

impl NewCreditTransaction {
    pub fn new(transaction_type: TransactionType, amount: Decimal) -> Self {
        Self {
            transaction_type,
            amount,
            reference: None,
            due_date: None,
            description: None,
            processed_by: None,
        }
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_reference(mut self, reference: TransactionReference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn processed_by(mut self, actor: impl Into<String>) -> Self {
        self.processed_by = Some(actor.into());
        self
    }
}

/// Read-back filter for a customer's transactions. Results are newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub transaction_type: Option<TransactionType>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl TransactionFilter {
    pub fn recent(limit: u32) -> Self {
        Self { limit: Some(limit), ..Self::default() }
    }

    pub fn matches(&self, transaction: &CreditTransaction) -> bool {
        self.transaction_type.map_or(true, |kind| transaction.transaction_type == kind)
            && self.date_from.map_or(true, |from| transaction.transaction_date >= from)
            && self.date_to.map_or(true, |to| transaction.transaction_date <= to)
    }
}
