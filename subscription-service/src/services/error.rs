//! Engine error taxonomy.

use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

use crate::models::SubscriptionStatus;
use crate::services::money::MoneyError;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed or out-of-range input, rejected before any write.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Cannot {action} a subscription in status '{from}'")]
    InvalidTransition {
        action: &'static str,
        from: SubscriptionStatus,
    },

    #[error("Payment of {amount} exceeds remaining balance of {remaining}")]
    ExceedsBalance { amount: Decimal, remaining: Decimal },

    /// Optimistic concurrency check failed; the caller may retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

impl ServiceError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        ServiceError::NotFound(format!("{} '{}'", entity, id))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::ExceedsBalance { .. } => "exceeds_balance",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Database(_) => "database",
        }
    }
}

impl From<MoneyError> for ServiceError {
    fn from(err: MoneyError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<mongodb::error::Error> for ServiceError {
    fn from(err: mongodb::error::Error) -> Self {
        ServiceError::Database(anyhow::Error::new(err))
    }
}

impl From<mongodb::bson::ser::Error> for ServiceError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        ServiceError::Database(anyhow::Error::new(err))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            ServiceError::InvalidTransition { .. } | ServiceError::Conflict(_) => {
                AppError::Conflict(anyhow::anyhow!(err.to_string()))
            }
            ServiceError::ExceedsBalance { .. } => {
                AppError::Unprocessable(anyhow::anyhow!(err.to_string()))
            }
            ServiceError::Database(e) => AppError::DatabaseError(e),
        }
    }
}
