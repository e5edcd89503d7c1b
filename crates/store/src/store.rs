use std::pin::Pin;

use async_trait::async_trait;
use common::{
    ItemId, ItemStatus, PaymentId, PaymentStatus, TransactionId, TransactionStatus, UserId,
};
use futures_core::Stream;

use crate::{
    ActivityLog, ActivityQuery, EntityType, Item, Page, Payment, Result, Review, StoreError,
    Transaction,
};

/// A status change of a transaction together with its side effects.
///
/// Stores apply the whole write as one unit: either the status, the item
/// status, the payment refunds and the activity row all become visible, or
/// none of them do.
#[derive(Debug, Clone)]
pub struct TransitionWrite {
    pub transaction_id: TransactionId,

    /// Status the caller validated against. The write is refused with
    /// `StatusConflict` if the stored status differs.
    pub expected_status: TransactionStatus,

    pub new_status: TransactionStatus,

    /// New status for the transaction's item, if the transition moves it.
    pub item_status: Option<ItemStatus>,

    /// Marks every `PAID` payment of the transaction as `REFUNDED`.
    pub refund_payments: bool,

    pub activity: ActivityLog,
}

/// An explicit owner edit of an item's status.
#[derive(Debug, Clone)]
pub struct ItemStatusWrite {
    pub item_id: ItemId,
    pub expected_status: ItemStatus,
    pub new_status: ItemStatus,
    pub activity: ActivityLog,
}

/// A provider-driven change of a payment's status.
#[derive(Debug, Clone)]
pub struct PaymentStatusWrite {
    pub payment_id: PaymentId,
    pub expected_status: PaymentStatus,
    pub new_status: PaymentStatus,

    /// Payment method reported by the provider, kept if already set.
    pub method: Option<String>,

    pub activity: Option<ActivityLog>,
}

/// A stream of activity rows.
pub type ActivityStream = Pin<Box<dyn Stream<Item = Result<ActivityLog>> + Send + 'static>>;

/// Core trait for marketplace store implementations.
///
/// Covers the item repository, transaction repository, payment and review
/// records and the append-only activity log sink. All implementations must
/// be thread-safe (Send + Sync).
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Inserts a new listing together with its `created` activity row.
    async fn insert_item(&self, item: Item, activity: ActivityLog) -> Result<()>;

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>>;

    /// Applies an owner edit of an item's status.
    ///
    /// Fails with `ItemConflict` if the stored status is not the expected one
    /// and with `ActiveTransactionExists` while an order holds the item.
    async fn update_item_status(&self, write: ItemStatusWrite) -> Result<Item>;

    /// Inserts a new order together with its `created` activity row.
    ///
    /// Fails with `ItemUnavailable` unless the item is `AVAILABLE` at insert
    /// time, and with `ActiveTransactionExists` if the item already has an
    /// order in a non-terminal state.
    async fn create_transaction(
        &self,
        transaction: Transaction,
        activity: ActivityLog,
    ) -> Result<()>;

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>>;

    /// Lists orders where the user is buyer or seller, newest first.
    async fn list_transactions_for_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Transaction>>;

    /// Applies a validated status change atomically.
    ///
    /// Returns the updated transaction, or `StatusConflict` if another writer
    /// changed the status first.
    async fn apply_transition(&self, write: TransitionWrite) -> Result<Transaction>;

    async fn insert_payment(&self, payment: Payment) -> Result<()>;

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>>;

    /// Returns the payments of an order, oldest first.
    async fn payments_for_transaction(&self, transaction_id: TransactionId)
    -> Result<Vec<Payment>>;

    /// Moves a payment from its expected status to a new one.
    ///
    /// Moving to `PAID` fails with `AlreadyPaid` if another payment of the
    /// same transaction is already `PAID`.
    async fn update_payment_status(&self, write: PaymentStatusWrite) -> Result<Payment>;

    /// Inserts a review. Fails with `DuplicateReview` if one exists already.
    async fn insert_review(&self, review: Review) -> Result<()>;

    /// Lists reviews, newest first, optionally restricted to one item.
    async fn list_reviews(&self, item_id: Option<ItemId>) -> Result<Vec<Review>>;

    /// Retrieves activity rows matching a query, oldest first.
    async fn query_activity(&self, query: ActivityQuery) -> Result<Vec<ActivityLog>>;

    /// Streams all activity rows in insertion order without buffering the
    /// whole log.
    async fn stream_activity(&self) -> Result<ActivityStream>;
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait MarketStoreExt: MarketStore {
    /// Loads an item or fails with `NotFound`.
    async fn require_item(&self, item_id: ItemId) -> Result<Item> {
        self.get_item(item_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Item", item_id))
    }

    /// Loads a transaction or fails with `NotFound`.
    async fn require_transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        self.get_transaction(transaction_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Transaction", transaction_id))
    }

    /// Loads a payment or fails with `NotFound`.
    async fn require_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.get_payment(payment_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Payment", payment_id))
    }

    /// Returns the full trail of one entity, oldest first.
    async fn activity_for(
        &self,
        entity_type: EntityType,
        entity_id: uuid::Uuid,
    ) -> Result<Vec<ActivityLog>> {
        self.query_activity(ActivityQuery::for_entity(entity_type, entity_id))
            .await
    }

    /// Returns true if the order has a successful payment.
    async fn is_paid(&self, transaction_id: TransactionId) -> Result<bool> {
        Ok(self
            .payments_for_transaction(transaction_id)
            .await?
            .iter()
            .any(|p| p.status == PaymentStatus::Paid))
    }
}

// Blanket implementation for all MarketStore implementations
impl<T: MarketStore + ?Sized> MarketStoreExt for T {}
