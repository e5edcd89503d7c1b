//! Transition executor and the order operations around it.

use std::sync::Arc;

use common::{ItemId, ItemStatus, Money, TransactionId, TransactionStatus, UserId};
use store::{
    ActivityLog, EntityType, MarketStore, MarketStoreExt, Page, StoreError, Transaction,
    TransitionWrite, actions,
};

use crate::actor::Actor;
use crate::error::{DomainError, TransitionError};
use crate::notification::{Notification, NotificationDispatcher, NotificationKind};

use super::rules;

/// How many times a transition is re-validated after losing a race.
const MAX_ATTEMPTS: usize = 3;

/// Item status a transition to `target` leaves behind, if it changes.
pub fn item_effect(target: TransactionStatus) -> Option<ItemStatus> {
    match target {
        TransactionStatus::Accepted => Some(ItemStatus::Reserved),
        TransactionStatus::Rejected
        | TransactionStatus::Cancelled
        | TransactionStatus::Refunded => Some(ItemStatus::Available),
        TransactionStatus::Completed => Some(ItemStatus::Sold),
        _ => None,
    }
}

/// Service owning the order lifecycle.
///
/// Every status change goes through [`OrderStateService::transition`], which
/// validates, then writes the status, the item side effect and the activity
/// row in one store unit of work.
pub struct OrderStateService<S: MarketStore> {
    store: Arc<S>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl<S: MarketStore> Clone for OrderStateService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S: MarketStore> OrderStateService<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, notifier }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Places an offer on an item.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn create_transaction(
        &self,
        actor: &Actor,
        item_id: ItemId,
        offered_price: Money,
    ) -> Result<Transaction, DomainError> {
        if offered_price.is_negative() {
            return Err(DomainError::Validation(
                "Offered price must not be negative.".to_string(),
            ));
        }

        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Item", item_id))?;

        if item.owner_id == actor.id {
            return Err(DomainError::Forbidden(
                "You cannot buy your own item".to_string(),
            ));
        }
        if item.status != ItemStatus::Available {
            return Err(DomainError::InvalidState(
                "Item is no longer available".to_string(),
            ));
        }

        let transaction = Transaction::request(&item, actor.id, offered_price);
        let activity = ActivityLog::builder(EntityType::Transaction, transaction.id, actions::CREATED)
            .actor(actor.snapshot())
            .description(format!("Order requested for {}", item.title))
            .property("status", transaction.status.as_str())
            .property("offered_price_cents", offered_price.cents())
            .build();

        self.store
            .create_transaction(transaction.clone(), activity)
            .await?;

        metrics::counter!("order_transitions_total", "to" => TransactionStatus::Requested.as_str())
            .increment(1);
        tracing::info!(transaction_id = %transaction.id, %item_id, "order requested");

        self.notify(Notification {
            recipient: transaction.seller_id,
            kind: NotificationKind::OrderRequested,
            transaction_id: transaction.id,
            status: transaction.status,
            message: format!(
                "{} offered {} for {}",
                actor.name, offered_price, item.title
            ),
        })
        .await;

        Ok(transaction)
    }

    /// Loads an order the actor is allowed to see.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn get_transaction(
        &self,
        actor: &Actor,
        transaction_id: TransactionId,
    ) -> Result<Transaction, DomainError> {
        let transaction = self.store.require_transaction(transaction_id).await?;

        if !transaction.is_party(actor.id) && !actor.is_admin() {
            return Err(DomainError::Forbidden(
                "Not authorized to view this order.".to_string(),
            ));
        }
        Ok(transaction)
    }

    /// Lists orders where the actor is buyer or seller, newest first.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn list_for_user(
        &self,
        actor: &Actor,
        page: Page,
    ) -> Result<Vec<Transaction>, DomainError> {
        Ok(self
            .store
            .list_transactions_for_user(actor.id, page)
            .await?)
    }

    /// Moves an order to a status named by a raw request value.
    ///
    /// Callers with no stake in the order get `Forbidden` whatever they ask
    /// for. Only after that is the value parsed, so an unknown status from a
    /// party is `InvalidState`.
    #[tracing::instrument(skip(self, actor, note), fields(actor_id = %actor.id))]
    pub async fn request_transition(
        &self,
        transaction_id: TransactionId,
        raw_status: &str,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Transaction, DomainError> {
        let transaction = self.store.require_transaction(transaction_id).await?;

        let target = rules::authorize(&transaction, actor)
            .and_then(|()| rules::parse_target(raw_status))
            .inspect_err(|e| {
                metrics::counter!("order_transition_rejections_total", "reason" => e.reason())
                    .increment(1);
            })?;

        self.transition(transaction_id, target, actor, note).await
    }

    /// Moves an order to `target` on behalf of `actor`.
    ///
    /// Fails with `Forbidden` or `InvalidState` without writing anything if
    /// the validator refuses. If another writer changes the status between
    /// read and write, the fresh status is validated again.
    #[tracing::instrument(skip(self, actor, note), fields(actor_id = %actor.id))]
    pub async fn transition(
        &self,
        transaction_id: TransactionId,
        target: TransactionStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Transaction, DomainError> {
        let mut transaction = self.store.require_transaction(transaction_id).await?;

        for _ in 0..MAX_ATTEMPTS {
            let from = transaction.status;
            self.check(&transaction, actor, target).await?;

            let description = note
                .clone()
                .unwrap_or_else(|| format!("Order status changed from {from} to {target}"));

            let write = TransitionWrite {
                transaction_id,
                expected_status: from,
                new_status: target,
                item_status: item_effect(target),
                refund_payments: target == TransactionStatus::Refunded,
                activity: ActivityLog::builder(
                    EntityType::Transaction,
                    transaction_id,
                    actions::STATUS_CHANGED,
                )
                .actor(actor.snapshot())
                .description(description)
                .property("old_status", from.as_str())
                .property("new_status", target.as_str())
                .build(),
            };

            match self.store.apply_transition(write).await {
                Ok(updated) => {
                    metrics::counter!("order_transitions_total", "to" => target.as_str())
                        .increment(1);
                    tracing::info!(%transaction_id, %from, to = %target, "order transitioned");

                    self.notify_parties(&updated, actor, from).await;
                    return Ok(updated);
                }
                Err(StoreError::StatusConflict { actual, .. }) => {
                    tracing::debug!(%transaction_id, %from, %actual, "lost status race, revalidating");
                    transaction = self.store.require_transaction(transaction_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::InvalidState(
            "Order status changed, please retry.".to_string(),
        ))
    }

    async fn check(
        &self,
        transaction: &Transaction,
        actor: &Actor,
        target: TransactionStatus,
    ) -> Result<(), DomainError> {
        if let Err(e) = rules::validate(transaction, actor, target) {
            metrics::counter!("order_transition_rejections_total", "reason" => e.reason())
                .increment(1);
            tracing::debug!(
                transaction_id = %transaction.id,
                from = %transaction.status,
                to = %target,
                reason = %e,
                "transition refused"
            );
            return Err(e.into());
        }

        if target == TransactionStatus::Accepted {
            let item = self.store.require_item(transaction.item_id).await?;
            if item.status != ItemStatus::Available {
                metrics::counter!("order_transition_rejections_total", "reason" => "item_unavailable")
                    .increment(1);
                return Err(TransitionError::InvalidState("Item is no longer available.").into());
            }
        }

        Ok(())
    }

    async fn notify_parties(&self, transaction: &Transaction, actor: &Actor, from: TransactionStatus) {
        let recipients: Vec<UserId> = [transaction.buyer_id, transaction.seller_id]
            .into_iter()
            .filter(|id| *id != actor.id)
            .collect();

        for recipient in recipients {
            self.notify(Notification {
                recipient,
                kind: NotificationKind::OrderStatusChanged,
                transaction_id: transaction.id,
                status: transaction.status,
                message: format!(
                    "Order status changed from {from} to {}",
                    transaction.status
                ),
            })
            .await;
        }
    }

    async fn notify(&self, notification: Notification) {
        let recipient = notification.recipient;
        if let Err(e) = self.notifier.dispatch(notification).await {
            tracing::warn!(%recipient, error = %e, "failed to dispatch notification");
        }
    }
}
