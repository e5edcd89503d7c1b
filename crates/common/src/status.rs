//! Closed status vocabularies for orders, items, payments and actors.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The status of a transaction in its lifecycle.
///
/// ```text
/// Requested ──► Accepted ──► Shipped ──► Delivered ──► Completed
///     │                         └──────────────────────────▲
///     ├──► Rejected
///     └──► Cancelled ◄── Disputed ──► Refunded
/// ```
///
/// Any active state may move to `Disputed`.
///
/// `ITEM_SENT` and `RECEIVED` are legacy spellings of `SHIPPED` and
/// `DELIVERED`. They are accepted when parsing and never produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Buyer made an offer; waiting for the seller.
    #[default]
    Requested,

    /// Seller accepted the offer; the item is reserved.
    Accepted,

    /// Seller sent the item.
    #[serde(alias = "ITEM_SENT")]
    Shipped,

    /// The item arrived at the buyer.
    #[serde(alias = "RECEIVED")]
    Delivered,

    /// Buyer confirmed the deal (terminal state).
    Completed,

    /// Seller turned the offer down (terminal state).
    Rejected,

    /// Order was called off before shipping (terminal state).
    Cancelled,

    /// One of the parties raised a dispute.
    Disputed,

    /// Admin refunded a disputed order (terminal state).
    Refunded,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 9] = [
        TransactionStatus::Requested,
        TransactionStatus::Accepted,
        TransactionStatus::Shipped,
        TransactionStatus::Delivered,
        TransactionStatus::Completed,
        TransactionStatus::Rejected,
        TransactionStatus::Cancelled,
        TransactionStatus::Disputed,
        TransactionStatus::Refunded,
    ];

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Rejected
                | TransactionStatus::Cancelled
                | TransactionStatus::Refunded
        )
    }

    /// Returns true while the order still holds a claim on its item.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the seller can accept the offer in this state.
    pub fn can_accept(&self) -> bool {
        matches!(self, TransactionStatus::Requested)
    }

    /// Returns true if the seller can reject the offer in this state.
    pub fn can_reject(&self) -> bool {
        matches!(self, TransactionStatus::Requested)
    }

    /// Returns true if the item can be marked as shipped in this state.
    pub fn can_ship(&self) -> bool {
        matches!(self, TransactionStatus::Accepted)
    }

    /// Returns true if delivery can be confirmed in this state.
    pub fn can_deliver(&self) -> bool {
        matches!(self, TransactionStatus::Shipped)
    }

    /// Returns true if the buyer can complete the order in this state.
    pub fn can_complete(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Shipped | TransactionStatus::Delivered
        )
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Requested | TransactionStatus::Disputed
        )
    }

    /// Returns true if a dispute can be opened in this state.
    pub fn can_dispute(&self) -> bool {
        self.is_active() && *self != TransactionStatus::Disputed
    }

    /// Returns true if an admin can refund the order in this state.
    pub fn can_refund(&self) -> bool {
        matches!(self, TransactionStatus::Disputed)
    }

    /// Returns the canonical status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Requested => "REQUESTED",
            TransactionStatus::Accepted => "ACCEPTED",
            TransactionStatus::Shipped => "SHIPPED",
            TransactionStatus::Delivered => "DELIVERED",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Rejected => "REJECTED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Disputed => "DISPUTED",
            TransactionStatus::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REQUESTED" => Ok(TransactionStatus::Requested),
            "ACCEPTED" => Ok(TransactionStatus::Accepted),
            "SHIPPED" | "ITEM_SENT" => Ok(TransactionStatus::Shipped),
            "DELIVERED" | "RECEIVED" => Ok(TransactionStatus::Delivered),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "REJECTED" => Ok(TransactionStatus::Rejected),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            "DISPUTED" => Ok(TransactionStatus::Disputed),
            "REFUNDED" => Ok(TransactionStatus::Refunded),
            _ => Err(ParseEnumError::new("transaction status", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of a listed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    #[default]
    Available,
    Reserved,
    /// Sold items never re-enter a purchase flow.
    Sold,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "AVAILABLE",
            ItemStatus::Reserved => "RESERVED",
            ItemStatus::Sold => "SOLD",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AVAILABLE" => Ok(ItemStatus::Available),
            "RESERVED" => Ok(ItemStatus::Reserved),
            "SOLD" => Ok(ItemStatus::Sold),
            _ => Err(ParseEnumError::new("item status", s)),
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical condition of a listed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCondition {
    New,
    LikeNew,
    Good,
    Fair,
}

impl ItemCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCondition::New => "NEW",
            ItemCondition::LikeNew => "LIKE_NEW",
            ItemCondition::Good => "GOOD",
            ItemCondition::Fair => "FAIR",
        }
    }
}

impl FromStr for ItemCondition {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(ItemCondition::New),
            "LIKE_NEW" => Ok(ItemCondition::LikeNew),
            "GOOD" => Ok(ItemCondition::Good),
            "FAIR" => Ok(ItemCondition::Fair),
            _ => Err(ParseEnumError::new("item condition", s)),
        }
    }
}

impl std::fmt::Display for ItemCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "FAILED" => Ok(PaymentStatus::Failed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            _ => Err(ParseEnumError::new("payment status", s)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform role of an actor.
///
/// `System` is reserved for transitions driven by the platform itself, such
/// as a confirmed payment advancing an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "system" => Ok(Role::System),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
