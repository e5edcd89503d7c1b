//! Review gate.

use std::sync::Arc;

use common::{ItemId, TransactionId, TransactionStatus};
use store::{MarketStore, MarketStoreExt, Review};

use crate::actor::Actor;
use crate::error::DomainError;

pub struct ReviewService<S: MarketStore> {
    store: Arc<S>,
}

impl<S: MarketStore> Clone for ReviewService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: MarketStore> ReviewService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records the buyer's review of a completed order.
    ///
    /// At most one review exists per order; the store's uniqueness rule
    /// turns a second attempt into `Conflict`.
    #[tracing::instrument(skip(self, actor, comment), fields(actor_id = %actor.id))]
    pub async fn create(
        &self,
        actor: &Actor,
        transaction_id: TransactionId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Review, DomainError> {
        if !(1..=5).contains(&rating) {
            return Err(DomainError::Validation(
                "Rating must be between 1 and 5.".to_string(),
            ));
        }

        let transaction = self.store.require_transaction(transaction_id).await?;

        if !transaction.is_buyer(actor.id) {
            return Err(DomainError::Forbidden(
                "Only the buyer can leave a review".to_string(),
            ));
        }
        if transaction.status != TransactionStatus::Completed {
            return Err(DomainError::InvalidState(
                "Transaction must be completed to leave a review".to_string(),
            ));
        }

        let comment = comment.filter(|c| !c.trim().is_empty());
        let review = Review::new(&transaction, rating, comment);
        self.store.insert_review(review.clone()).await?;

        metrics::counter!("reviews_created_total").increment(1);
        tracing::info!(review_id = %review.id, %transaction_id, rating, "review created");

        Ok(review)
    }

    /// Lists reviews, newest first, optionally for a single item.
    pub async fn list(&self, item_id: Option<ItemId>) -> Result<Vec<Review>, DomainError> {
        Ok(self.store.list_reviews(item_id).await?)
    }
}
