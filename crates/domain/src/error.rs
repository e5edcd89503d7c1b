//! Domain error types.

use store::StoreError;
use thiserror::Error;

/// Why a requested status change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The actor has no relationship that permits this transition.
    #[error("{0}")]
    Forbidden(&'static str),

    /// The current status does not permit the requested target.
    #[error("{0}")]
    InvalidState(&'static str),
}

impl TransitionError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            TransitionError::Forbidden(_) => "forbidden",
            TransitionError::InvalidState(_) => "invalid_state",
        }
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidState(String),

    /// A uniqueness rule was violated.
    #[error("{0}")]
    Conflict(String),

    /// Input failed a field-level check.
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An error occurred in the store that has no domain meaning.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<TransitionError> for DomainError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Forbidden(msg) => DomainError::Forbidden(msg.to_string()),
            TransitionError::InvalidState(msg) => DomainError::InvalidState(msg.to_string()),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StoreError::StatusConflict { .. } => {
                DomainError::InvalidState("Order status changed, please retry.".to_string())
            }
            StoreError::ItemConflict { .. } => {
                DomainError::Conflict("Item status changed, please retry.".to_string())
            }
            StoreError::PaymentConflict { .. } => {
                DomainError::InvalidState("Payment already processed.".to_string())
            }
            StoreError::ActiveTransactionExists(_) => {
                DomainError::Conflict("Item already has an active order".to_string())
            }
            StoreError::DuplicateReview(_) => {
                DomainError::Conflict("You have already reviewed this transaction".to_string())
            }
            StoreError::ItemUnavailable { .. } => {
                DomainError::InvalidState("Item is no longer available".to_string())
            }
            StoreError::AlreadyPaid(_) => {
                DomainError::InvalidState("Order already paid.".to_string())
            }
            StoreError::InvalidPage(field) => {
                DomainError::Validation(format!("Page {field} is out of range."))
            }
            other => DomainError::Store(other),
        }
    }
}
