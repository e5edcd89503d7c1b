use common::{ItemId, ItemStatus, PaymentId, PaymentStatus, TransactionId, TransactionStatus};
use thiserror::Error;

/// Errors that can occur when interacting with the marketplace store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record addressed by a write does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The transaction's status changed between read and write.
    #[error(
        "Status conflict for transaction {transaction_id}: expected {expected}, found {actual}"
    )]
    StatusConflict {
        transaction_id: TransactionId,
        expected: TransactionStatus,
        actual: TransactionStatus,
    },

    /// The item's status changed between read and write.
    #[error("Status conflict for item {item_id}: expected {expected}, found {actual}")]
    ItemConflict {
        item_id: ItemId,
        expected: ItemStatus,
        actual: ItemStatus,
    },

    /// The payment's status changed between read and write.
    #[error("Status conflict for payment {payment_id}: expected {expected}, found {actual}")]
    PaymentConflict {
        payment_id: PaymentId,
        expected: PaymentStatus,
        actual: PaymentStatus,
    },

    /// The item cannot take a new order in its current status.
    #[error("Item {item_id} is {status}")]
    ItemUnavailable { item_id: ItemId, status: ItemStatus },

    /// Another payment of the transaction has already been captured.
    #[error("Transaction {0} is already paid")]
    AlreadyPaid(TransactionId),

    /// The item already has an order that is not in a terminal state.
    #[error("Item {0} already has an active transaction")]
    ActiveTransactionExists(ItemId),

    /// A review was already written for this transaction.
    #[error("Transaction {0} has already been reviewed")]
    DuplicateReview(TransactionId),

    /// A page bound does not fit the database's integer range.
    #[error("Page {0} out of range")]
    InvalidPage(&'static str),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be mapped back onto a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
