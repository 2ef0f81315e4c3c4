use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use tradedesk_core::store::StoreError;

pub mod credit;
pub mod memory;
pub mod pricing_rule;
pub mod product;

pub use credit::SqlCreditRepository;
pub use memory::{InMemoryCreditRepository, InMemoryPricingRuleRepository, InMemoryProductRepository};
pub use pricing_rule::SqlPricingRuleRepository;
pub use product::SqlProductRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} {id} no longer has version {expected_version}")]
    Conflict { entity: &'static str, id: String, expected_version: i64 },
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Conflict { entity, id, expected_version } => {
                Self::Conflict { entity, id, expected_version }
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Fixed-width UTC form so stored timestamps order lexicographically.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

pub(crate) fn decode_optional_timestamp(
    field: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.as_deref().map(|value| decode_timestamp(field, value)).transpose()
}

pub(crate) fn decode_optional_date(
    field: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value
        .as_deref()
        .map(|value| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
        })
        .transpose()
}

pub(crate) fn decode_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim())
        .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

pub(crate) fn decode_optional_decimal(
    field: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.as_deref().map(|value| decode_decimal(field, value)).transpose()
}

pub(crate) fn decode_quantity(field: &str, value: Option<i64>) -> Result<Option<u32>, RepositoryError> {
    value
        .map(|raw| {
            u32::try_from(raw)
                .map_err(|_| RepositoryError::Decode(format!("{field} out of range: {raw}")))
        })
        .transpose()
}
