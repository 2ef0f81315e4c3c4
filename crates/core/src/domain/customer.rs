use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::SoftDelete;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

/// Commercial grade used to scope pricing rules (for example `A` through `D`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerGrade(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Suspended,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// The balance fields of a customer row, always written together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditProjection {
    pub credit_limit: Decimal,
    pub current_balance: Decimal,
    pub available_credit: Decimal,
}

impl CreditProjection {
    pub fn new(credit_limit: Decimal, current_balance: Decimal) -> Self {
        Self { credit_limit, current_balance, available_credit: credit_limit - current_balance }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub grade: Option<CustomerGrade>,
    pub credit_limit: Decimal,
    pub current_balance: Decimal,
    pub available_credit: Decimal,
    pub credit_hold: bool,
    pub credit_hold_reason: Option<String>,
    pub status: CustomerStatus,
    /// Optimistic concurrency token, bumped by every projection or hold write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Customer {
    pub fn new(
        id: CustomerId,
        name: impl Into<String>,
        grade: Option<CustomerGrade>,
        credit_limit: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            grade,
            credit_limit,
            current_balance: Decimal::ZERO,
            available_credit: credit_limit,
            credit_hold: false,
            credit_hold_reason: None,
            status: CustomerStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn projection(&self) -> CreditProjection {
        CreditProjection {
            credit_limit: self.credit_limit,
            current_balance: self.current_balance,
            available_credit: self.available_credit,
        }
    }

    pub fn with_balance(&self, current_balance: Decimal) -> CreditProjection {
        CreditProjection::new(self.credit_limit, current_balance)
    }

    pub fn apply_projection(&mut self, projection: CreditProjection) {
        self.credit_limit = projection.credit_limit;
        self.current_balance = projection.current_balance;
        self.available_credit = projection.available_credit;
    }

    pub fn is_consistent(&self) -> bool {
        self.available_credit == self.credit_limit - self.current_balance
    }

    pub fn place_on_hold(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        if self.credit_hold {
            return Err(DomainError::InvalidState(format!(
                "customer {} is already on credit hold",
                self.id.0
            )));
        }
        self.credit_hold = true;
        self.credit_hold_reason = reason.filter(|value| !value.trim().is_empty());
        self.status = CustomerStatus::Suspended;
        Ok(())
    }

    pub fn release_hold(&mut self) -> Result<(), DomainError> {
        if !self.credit_hold {
            return Err(DomainError::InvalidState(format!(
                "customer {} is not on credit hold",
                self.id.0
            )));
        }
        self.credit_hold = false;
        self.credit_hold_reason = None;
        self.status = CustomerStatus::Active;
        Ok(())
    }
}

impl SoftDelete for Customer {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}
