//! Shared types for the marketplace workspace.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{ItemCondition, ItemStatus, ParseEnumError, PaymentStatus, Role, TransactionStatus};
pub use types::{ActivityId, CategoryId, ItemId, PaymentId, ReviewId, TransactionId, UserId};
