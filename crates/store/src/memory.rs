use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{ItemId, ItemStatus, PaymentId, PaymentStatus, TransactionId, UserId};
use tokio::sync::RwLock;

use crate::{
    ActivityLog, ActivityQuery, Item, Page, Payment, Result, Review, StoreError, Transaction,
    query::sql_bound,
    store::{ActivityStream, ItemStatusWrite, MarketStore, PaymentStatusWrite, TransitionWrite},
};

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<ItemId, Item>,
    transactions: HashMap<TransactionId, Transaction>,
    payments: HashMap<PaymentId, Payment>,
    reviews: HashMap<TransactionId, Review>,
    activity: Vec<ActivityLog>,
}

impl Tables {
    fn active_transaction_for_item(&self, item_id: ItemId) -> Option<&Transaction> {
        self.transactions
            .values()
            .find(|t| t.item_id == item_id && t.status.is_active())
    }
}

/// In-memory store implementation for tests and local runs.
///
/// All tables sit behind a single lock, so every write observes and mutates
/// a consistent snapshot the way a database transaction would.
#[derive(Clone, Default)]
pub struct InMemoryMarketStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of activity rows stored.
    pub async fn activity_count(&self) -> usize {
        self.tables.read().await.activity.len()
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn insert_item(&self, item: Item, activity: ActivityLog) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.items.insert(item.id, item);
        tables.activity.push(activity);
        Ok(())
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        Ok(self.tables.read().await.items.get(&item_id).cloned())
    }

    async fn update_item_status(&self, write: ItemStatusWrite) -> Result<Item> {
        let mut tables = self.tables.write().await;

        if tables.active_transaction_for_item(write.item_id).is_some() {
            return Err(StoreError::ActiveTransactionExists(write.item_id));
        }

        let item = tables
            .items
            .get_mut(&write.item_id)
            .ok_or_else(|| StoreError::not_found("Item", write.item_id))?;

        if item.status != write.expected_status {
            return Err(StoreError::ItemConflict {
                item_id: write.item_id,
                expected: write.expected_status,
                actual: item.status,
            });
        }

        item.status = write.new_status;
        item.updated_at = Utc::now();
        let updated = item.clone();
        tables.activity.push(write.activity);

        Ok(updated)
    }

    async fn create_transaction(
        &self,
        transaction: Transaction,
        activity: ActivityLog,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;

        let item = tables
            .items
            .get(&transaction.item_id)
            .ok_or_else(|| StoreError::not_found("Item", transaction.item_id))?;

        if item.status != ItemStatus::Available {
            return Err(StoreError::ItemUnavailable {
                item_id: item.id,
                status: item.status,
            });
        }

        // Partial unique index simulation
        if tables
            .active_transaction_for_item(transaction.item_id)
            .is_some()
        {
            return Err(StoreError::ActiveTransactionExists(transaction.item_id));
        }

        tables.transactions.insert(transaction.id, transaction);
        tables.activity.push(activity);
        Ok(())
    }

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self
            .tables
            .read()
            .await
            .transactions
            .get(&transaction_id)
            .cloned())
    }

    async fn list_transactions_for_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Transaction>> {
        page.bounds()?;

        let tables = self.tables.read().await;
        let mut transactions: Vec<_> = tables
            .transactions
            .values()
            .filter(|t| t.is_party(user_id))
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(transactions
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn apply_transition(&self, write: TransitionWrite) -> Result<Transaction> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        let current = tables
            .transactions
            .get(&write.transaction_id)
            .ok_or_else(|| StoreError::not_found("Transaction", write.transaction_id))?;

        if current.status != write.expected_status {
            return Err(StoreError::StatusConflict {
                transaction_id: write.transaction_id,
                expected: write.expected_status,
                actual: current.status,
            });
        }
        let item_id = current.item_id;

        // Check every precondition before the first mutation.
        if write.item_status.is_some() && !tables.items.contains_key(&item_id) {
            return Err(StoreError::not_found("Item", item_id));
        }

        if let Some(status) = write.item_status
            && let Some(item) = tables.items.get_mut(&item_id)
        {
            item.status = status;
            item.updated_at = now;
        }

        if write.refund_payments {
            for payment in tables
                .payments
                .values_mut()
                .filter(|p| p.transaction_id == write.transaction_id)
                .filter(|p| p.status == PaymentStatus::Paid)
            {
                payment.status = PaymentStatus::Refunded;
                payment.updated_at = now;
            }
        }

        tables.activity.push(write.activity);

        let transaction = tables
            .transactions
            .get_mut(&write.transaction_id)
            .ok_or_else(|| StoreError::not_found("Transaction", write.transaction_id))?;
        transaction.status = write.new_status;
        transaction.updated_at = now;

        Ok(transaction.clone())
    }

    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        let mut tables = self.tables.write().await;

        if !tables.transactions.contains_key(&payment.transaction_id) {
            return Err(StoreError::not_found(
                "Transaction",
                payment.transaction_id,
            ));
        }

        tables.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.tables.read().await.payments.get(&payment_id).cloned())
    }

    async fn payments_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<_> = tables
            .payments
            .values()
            .filter(|p| p.transaction_id == transaction_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn update_payment_status(&self, write: PaymentStatusWrite) -> Result<Payment> {
        let mut tables = self.tables.write().await;

        let transaction_id = tables
            .payments
            .get(&write.payment_id)
            .map(|p| p.transaction_id)
            .ok_or_else(|| StoreError::not_found("Payment", write.payment_id))?;

        // Unique index simulation: one PAID payment per transaction.
        if write.new_status == PaymentStatus::Paid
            && tables.payments.values().any(|p| {
                p.transaction_id == transaction_id
                    && p.id != write.payment_id
                    && p.status == PaymentStatus::Paid
            })
        {
            return Err(StoreError::AlreadyPaid(transaction_id));
        }

        let payment = tables
            .payments
            .get_mut(&write.payment_id)
            .ok_or_else(|| StoreError::not_found("Payment", write.payment_id))?;

        if payment.status != write.expected_status {
            return Err(StoreError::PaymentConflict {
                payment_id: write.payment_id,
                expected: write.expected_status,
                actual: payment.status,
            });
        }

        payment.status = write.new_status;
        if write.method.is_some() {
            payment.method = write.method;
        }
        payment.updated_at = Utc::now();
        let updated = payment.clone();

        if let Some(activity) = write.activity {
            tables.activity.push(activity);
        }

        Ok(updated)
    }

    async fn insert_review(&self, review: Review) -> Result<()> {
        let mut tables = self.tables.write().await;

        if tables.reviews.contains_key(&review.transaction_id) {
            return Err(StoreError::DuplicateReview(review.transaction_id));
        }

        tables.reviews.insert(review.transaction_id, review);
        Ok(())
    }

    async fn list_reviews(&self, item_id: Option<ItemId>) -> Result<Vec<Review>> {
        let tables = self.tables.read().await;
        let mut reviews: Vec<_> = tables
            .reviews
            .values()
            .filter(|r| item_id.is_none_or(|id| r.item_id == id))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn query_activity(&self, query: ActivityQuery) -> Result<Vec<ActivityLog>> {
        if let Some(limit) = query.limit {
            sql_bound("limit", limit)?;
        }
        if let Some(offset) = query.offset {
            sql_bound("offset", offset)?;
        }

        let tables = self.tables.read().await;
        let rows: Vec<_> = tables
            .activity
            .iter()
            .filter(|row| {
                if let Some(entity_type) = query.entity_type
                    && row.entity_type != entity_type
                {
                    return false;
                }
                if let Some(entity_id) = query.entity_id
                    && row.entity_id != entity_id
                {
                    return false;
                }
                if let Some(actor_id) = query.actor_id
                    && row.actor.as_ref().map(|a| a.id) != Some(actor_id)
                {
                    return false;
                }
                if let Some(ref actions) = query.actions
                    && !actions.contains(&row.action)
                {
                    return false;
                }
                if let Some(from) = query.from_timestamp
                    && row.created_at < from
                {
                    return false;
                }
                if let Some(to) = query.to_timestamp
                    && row.created_at > to
                {
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        // Insertion order is already chronological.
        let rows = rows
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(rows)
    }

    async fn stream_activity(&self) -> Result<ActivityStream> {
        use futures_util::stream;

        let rows = self.tables.read().await.activity.clone();
        let stream = stream::iter(rows.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }
}
