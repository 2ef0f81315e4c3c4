use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Uniform success/failure envelope handed to callers of the core operations.
///
/// Store failures never reach `error` verbatim: they are logged here and replaced by a
/// generic message naming the operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), message: None, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, data: None, message: None, error: Some(error.into()) }
    }

    pub fn from_result(operation: &str, result: Result<T, ApplicationError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(ApplicationError::Domain(error)) => {
                tracing::warn!(
                    event_name = "core.operation.rejected",
                    operation,
                    error = %error,
                    "operation rejected"
                );
                Self::failed(error.to_string())
            }
            Err(error) => {
                tracing::error!(
                    event_name = "core.operation.failed",
                    operation,
                    error = %error,
                    "operation failed in underlying store"
                );
                Self::failed(format!("{operation} failed"))
            }
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(self.error.unwrap_or_else(|| "operation failed".to_string())),
        }
    }
}
