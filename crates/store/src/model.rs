//! Persisted marketplace records.

use chrono::{DateTime, Utc};
use common::{
    CategoryId, ItemCondition, ItemId, ItemStatus, Money, PaymentId, PaymentStatus, ReviewId,
    TransactionId, TransactionStatus, UserId,
};
use serde::{Deserialize, Serialize};

/// A listed secondhand item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub owner_id: UserId,
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub condition: ItemCondition,
    pub price: Money,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Creates a new available listing.
    pub fn new(
        owner_id: UserId,
        category_id: CategoryId,
        title: impl Into<String>,
        description: impl Into<String>,
        condition: ItemCondition,
        price: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            owner_id,
            category_id,
            title: title.into(),
            description: description.into(),
            condition,
            price,
            status: ItemStatus::Available,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An order between a buyer and the owner of an item.
///
/// `seller_id` is snapshotted from the item owner when the order is created
/// and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub item_id: ItemId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub offered_price: Money,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a new order in the `REQUESTED` state.
    pub fn request(item: &Item, buyer_id: UserId, offered_price: Money) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            item_id: item.id,
            buyer_id,
            seller_id: item.owner_id,
            offered_price,
            status: TransactionStatus::Requested,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_buyer(&self, user_id: UserId) -> bool {
        self.buyer_id == user_id
    }

    pub fn is_seller(&self, user_id: UserId) -> bool {
        self.seller_id == user_id
    }

    /// Returns true if the user is either side of the deal.
    pub fn is_party(&self, user_id: UserId) -> bool {
        self.is_buyer(user_id) || self.is_seller(user_id)
    }
}

/// A payment attempt for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub transaction_id: TransactionId,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a pending payment for the order's offered price.
    pub fn pending(
        transaction: &Transaction,
        currency: impl Into<String>,
        method: Option<String>,
        external_reference: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            transaction_id: transaction.id,
            amount: transaction.offered_price,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            method,
            external_reference,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A buyer's review of a completed order. At most one per transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub transaction_id: TransactionId,
    pub item_id: ItemId,
    pub reviewer_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        transaction: &Transaction,
        rating: u8,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: ReviewId::new(),
            transaction_id: transaction.id,
            item_id: transaction.item_id,
            reviewer_id: transaction.buyer_id,
            rating,
            comment,
            created_at: Utc::now(),
        }
    }
}
