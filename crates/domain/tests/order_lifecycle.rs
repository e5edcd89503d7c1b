//! Integration tests for the order state machine.
//!
//! These tests drive the services against the in-memory store and check the
//! status, the item side effect and the activity trail together.

use std::sync::Arc;

use common::{
    CategoryId, ItemCondition, ItemStatus, Money, PaymentStatus, TransactionId, TransactionStatus,
    UserId,
};
use domain::{
    Actor, DomainError, InMemoryNotificationDispatcher, OrderStateService, PaymentOutcome,
    PaymentService, ProviderStatus, ReviewService,
};
use store::{
    ActivityLog, EntityType, InMemoryMarketStore, Item, MarketStore, MarketStoreExt, Transaction,
    actions,
};

struct Market {
    store: Arc<InMemoryMarketStore>,
    orders: OrderStateService<InMemoryMarketStore>,
    payments: PaymentService<InMemoryMarketStore>,
    reviews: ReviewService<InMemoryMarketStore>,
    notifier: InMemoryNotificationDispatcher,
    seller: Actor,
    buyer: Actor,
    admin: Actor,
}

impl Market {
    fn new() -> Self {
        let store = Arc::new(InMemoryMarketStore::new());
        let notifier = InMemoryNotificationDispatcher::new();
        let orders = OrderStateService::new(store.clone(), Arc::new(notifier.clone()));

        Self {
            payments: PaymentService::new(orders.clone()),
            reviews: ReviewService::new(store.clone()),
            orders,
            store,
            notifier,
            seller: Actor::user(UserId::new(), "Siti"),
            buyer: Actor::user(UserId::new(), "Kumar"),
            admin: Actor::admin(UserId::new(), "Moderator"),
        }
    }

    async fn list_item(&self) -> Item {
        let item = Item::new(
            self.seller.id,
            CategoryId::new(),
            "Mechanical keyboard",
            "Brown switches, all keycaps present",
            ItemCondition::Good,
            Money::from_units(180),
        );
        self.store
            .insert_item(
                item.clone(),
                ActivityLog::builder(EntityType::Item, item.id, actions::CREATED).build(),
            )
            .await
            .unwrap();
        item
    }

    async fn order(&self, item: &Item) -> Transaction {
        self.orders
            .create_transaction(&self.buyer, item.id, Money::from_units(160))
            .await
            .unwrap()
    }

    /// Drives a fresh order to `status` through the legal path.
    async fn order_in(&self, status: TransactionStatus) -> (Item, Transaction) {
        use TransactionStatus::*;

        let item = self.list_item().await;
        let tx = self.order(&item).await;

        let path: Vec<(TransactionStatus, &Actor)> = match status {
            Requested => vec![],
            Accepted => vec![(Accepted, &self.seller)],
            Shipped => vec![(Accepted, &self.seller), (Shipped, &self.seller)],
            Delivered => vec![
                (Accepted, &self.seller),
                (Shipped, &self.seller),
                (Delivered, &self.buyer),
            ],
            Completed => vec![
                (Accepted, &self.seller),
                (Shipped, &self.seller),
                (Completed, &self.buyer),
            ],
            Rejected => vec![(Rejected, &self.seller)],
            Cancelled => vec![(Cancelled, &self.buyer)],
            Disputed => vec![(Disputed, &self.buyer)],
            Refunded => vec![(Disputed, &self.buyer), (Refunded, &self.admin)],
        };

        let mut tx = tx;
        for (target, actor) in path {
            tx = self
                .orders
                .transition(tx.id, target, actor, None)
                .await
                .unwrap();
        }
        (item, tx)
    }

    async fn item_status(&self, item: &Item) -> ItemStatus {
        self.store.require_item(item.id).await.unwrap().status
    }

    async fn trail(&self, tx: &Transaction) -> Vec<ActivityLog> {
        self.store
            .activity_for(EntityType::Transaction, tx.id.as_uuid())
            .await
            .unwrap()
    }
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn seller_accepts_requested_offer() {
        let market = Market::new();
        let (item, tx) = market.order_in(TransactionStatus::Requested).await;
        let before = market.trail(&tx).await.len();

        let updated = market
            .orders
            .transition(tx.id, TransactionStatus::Accepted, &market.seller, None)
            .await
            .unwrap();

        assert_eq!(updated.status, TransactionStatus::Accepted);
        assert_eq!(market.item_status(&item).await, ItemStatus::Reserved);

        let trail = market.trail(&tx).await;
        assert_eq!(trail.len(), before + 1);
        let row = trail.last().unwrap();
        assert_eq!(row.action, actions::STATUS_CHANGED);
        assert_eq!(row.property("old_status"), Some(&serde_json::json!("REQUESTED")));
        assert_eq!(row.property("new_status"), Some(&serde_json::json!("ACCEPTED")));
        assert_eq!(
            row.description.as_deref(),
            Some("Order status changed from REQUESTED to ACCEPTED")
        );
        assert_eq!(row.actor.as_ref().map(|a| a.id), Some(market.seller.id));
    }

    #[tokio::test]
    async fn buyer_cannot_accept() {
        let market = Market::new();
        let (item, tx) = market.order_in(TransactionStatus::Requested).await;
        let before = market.trail(&tx).await.len();

        let err = market
            .orders
            .transition(tx.id, TransactionStatus::Accepted, &market.buyer, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Forbidden(_)));
        let stored = market.store.require_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Requested);
        assert_eq!(market.item_status(&item).await, ItemStatus::Available);
        assert_eq!(market.trail(&tx).await.len(), before);
    }

    #[tokio::test]
    async fn accepted_order_cannot_be_cancelled() {
        let market = Market::new();
        let (item, tx) = market.order_in(TransactionStatus::Accepted).await;

        let err = market
            .orders
            .transition(tx.id, TransactionStatus::Cancelled, &market.seller, None)
            .await
            .unwrap_err();

        match err {
            DomainError::InvalidState(msg) => assert!(msg.starts_with("Cannot cancel")),
            other => panic!("Expected InvalidState, got {other:?}"),
        }
        assert_eq!(market.item_status(&item).await, ItemStatus::Reserved);
    }

    #[tokio::test]
    async fn buyer_completes_shipped_order() {
        let market = Market::new();
        let (item, tx) = market.order_in(TransactionStatus::Shipped).await;

        let updated = market
            .orders
            .transition(tx.id, TransactionStatus::Completed, &market.buyer, None)
            .await
            .unwrap();

        assert_eq!(updated.status, TransactionStatus::Completed);
        assert_eq!(market.item_status(&item).await, ItemStatus::Sold);
    }

    #[tokio::test]
    async fn concurrent_accept_and_cancel_have_one_winner() {
        let market = Market::new();
        let (item, tx) = market.order_in(TransactionStatus::Requested).await;

        let (accept, cancel) = tokio::join!(
            market
                .orders
                .transition(tx.id, TransactionStatus::Accepted, &market.seller, None),
            market
                .orders
                .transition(tx.id, TransactionStatus::Cancelled, &market.buyer, None),
        );

        assert!(accept.is_ok() ^ cancel.is_ok());
        let loser = accept.err().or(cancel.err()).unwrap();
        assert!(matches!(loser, DomainError::InvalidState(_)));

        let stored = market.store.require_transaction(tx.id).await.unwrap();
        match stored.status {
            TransactionStatus::Accepted => {
                assert_eq!(market.item_status(&item).await, ItemStatus::Reserved)
            }
            TransactionStatus::Cancelled => {
                assert_eq!(market.item_status(&item).await, ItemStatus::Available)
            }
            other => panic!("unexpected status {other}"),
        }
    }

    #[tokio::test]
    async fn concurrent_accept_and_cancel_on_threads() {
        let market = Arc::new(Market::new());
        let (_, tx) = market.order_in(TransactionStatus::Requested).await;

        let accept = {
            let market = Arc::clone(&market);
            tokio::spawn(async move {
                market
                    .orders
                    .transition(tx.id, TransactionStatus::Accepted, &market.seller, None)
                    .await
            })
        };
        let cancel = {
            let market = Arc::clone(&market);
            tokio::spawn(async move {
                market
                    .orders
                    .transition(tx.id, TransactionStatus::Cancelled, &market.buyer, None)
                    .await
            })
        };

        let accept = accept.await.unwrap();
        let cancel = cancel.await.unwrap();
        assert!(accept.is_ok() ^ cancel.is_ok());
    }
}

mod properties {
    use super::*;

    #[tokio::test]
    async fn terminal_orders_refuse_every_transition() {
        let market = Market::new();

        for status in TransactionStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            let (item, tx) = market.order_in(status).await;
            let item_before = market.item_status(&item).await;
            let trail_before = market.trail(&tx).await.len();

            for target in TransactionStatus::ALL {
                for actor in [&market.buyer, &market.seller, &market.admin] {
                    let result = market.orders.transition(tx.id, target, actor, None).await;
                    assert!(result.is_err(), "{status} -> {target} should be refused");
                }
            }

            let stored = market.store.require_transaction(tx.id).await.unwrap();
            assert_eq!(stored.status, status);
            assert_eq!(market.item_status(&item).await, item_before);
            assert_eq!(market.trail(&tx).await.len(), trail_before);
        }
    }

    #[tokio::test]
    async fn strangers_are_forbidden_everywhere() {
        let market = Market::new();
        let stranger = Actor::user(UserId::new(), "Stranger");

        for status in TransactionStatus::ALL {
            let (_, tx) = market.order_in(status).await;
            for target in TransactionStatus::ALL {
                let err = market
                    .orders
                    .transition(tx.id, target, &stranger, None)
                    .await
                    .unwrap_err();
                assert!(
                    matches!(err, DomainError::Forbidden(_)),
                    "{status} -> {target}: {err:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn stranger_with_unknown_status_is_forbidden() {
        let market = Market::new();
        let stranger = Actor::user(UserId::new(), "Stranger");
        let (_, tx) = market.order_in(TransactionStatus::Accepted).await;
        let trail_before = market.trail(&tx).await.len();

        for raw in ["BOGUS", "REQUESTED", "requested", ""] {
            let err = market
                .orders
                .request_transition(tx.id, raw, &stranger, None)
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::Forbidden(_)), "{raw:?}: {err:?}");
        }
        assert_eq!(market.trail(&tx).await.len(), trail_before);
    }

    #[tokio::test]
    async fn accept_then_reject_is_invalid() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Accepted).await;

        let err = market
            .orders
            .transition(tx.id, TransactionStatus::Rejected, &market.seller, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[tokio::test]
    async fn stored_status_is_always_canonical() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Accepted).await;

        let target = domain::parse_target("ITEM_SENT").unwrap();
        let updated = market
            .orders
            .transition(tx.id, target, &market.seller, None)
            .await
            .unwrap();

        assert_eq!(updated.status, TransactionStatus::Shipped);
        assert_eq!(updated.status.as_str(), "SHIPPED");
    }

    #[tokio::test]
    async fn closed_order_frees_item_for_next_buyer() {
        let market = Market::new();
        let (item, _) = market.order_in(TransactionStatus::Rejected).await;
        assert_eq!(market.item_status(&item).await, ItemStatus::Available);

        let next = market.order(&item).await;
        assert_eq!(next.status, TransactionStatus::Requested);
    }

    #[tokio::test]
    async fn counterparty_is_notified() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Requested).await;

        market
            .orders
            .transition(tx.id, TransactionStatus::Accepted, &market.seller, None)
            .await
            .unwrap();

        let to_buyer = market.notifier.sent_to(market.buyer.id);
        assert_eq!(to_buyer.len(), 1);
        assert_eq!(to_buyer[0].status, TransactionStatus::Accepted);
    }
}

mod payments {
    use super::*;

    #[tokio::test]
    async fn successful_payment_ships_the_order() {
        let market = Market::new();
        let (item, tx) = market.order_in(TransactionStatus::Accepted).await;

        let payment = market
            .payments
            .checkout(tx.id, &market.buyer, None)
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, tx.offered_price);
        assert_eq!(payment.currency, "RM");

        let outcome = market
            .payments
            .callback(payment.id, ProviderStatus::Success, Some("fpx".to_string()))
            .await
            .unwrap();

        let PaymentOutcome::Paid {
            payment,
            transaction,
        } = outcome
        else {
            panic!("expected a paid outcome");
        };
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(transaction.status, TransactionStatus::Shipped);
        assert_eq!(market.item_status(&item).await, ItemStatus::Reserved);

        let row = market.trail(&tx).await.pop().unwrap();
        assert_eq!(
            row.description.as_deref(),
            Some("Payment received via fpx. Marked as SHIPPED automatically.")
        );
        assert_eq!(row.actor.map(|a| a.role), Some(common::Role::System));
    }

    #[tokio::test]
    async fn only_buyer_checks_out_accepted_unpaid_orders() {
        let market = Market::new();
        let (_, requested) = market.order_in(TransactionStatus::Requested).await;

        let err = market
            .payments
            .checkout(requested.id, &market.buyer, None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, DomainError::InvalidState(msg) if msg == "Payment only possible for accepted offers.")
        );

        let (_, accepted) = market.order_in(TransactionStatus::Accepted).await;
        let err = market
            .payments
            .checkout(accepted.id, &market.seller, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let payment = market
            .payments
            .checkout(accepted.id, &market.buyer, None)
            .await
            .unwrap();
        market
            .store
            .update_payment_status(store::PaymentStatusWrite {
                payment_id: payment.id,
                expected_status: PaymentStatus::Pending,
                new_status: PaymentStatus::Paid,
                method: None,
                activity: None,
            })
            .await
            .unwrap();

        let err = market
            .payments
            .checkout(accepted.id, &market.buyer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(msg) if msg == "Order already paid."));
    }

    #[tokio::test]
    async fn failed_payment_leaves_order_alone() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Accepted).await;
        let payment = market
            .payments
            .checkout(tx.id, &market.buyer, None)
            .await
            .unwrap();

        let outcome = market
            .payments
            .callback(payment.id, ProviderStatus::Failed, None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            PaymentOutcome::Failed { ref payment } if payment.status == PaymentStatus::Failed
        ));

        let stored = market.store.require_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Accepted);

        let err = market
            .payments
            .callback(payment.id, ProviderStatus::Success, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(msg) if msg == "Payment already processed."));
    }

    #[tokio::test]
    async fn success_for_disputed_order_is_voided() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Accepted).await;
        let payment = market
            .payments
            .checkout(tx.id, &market.buyer, None)
            .await
            .unwrap();

        // The buyer disputes before the provider calls back.
        market
            .orders
            .transition(tx.id, TransactionStatus::Disputed, &market.buyer, None)
            .await
            .unwrap();

        let err = market
            .payments
            .callback(payment.id, ProviderStatus::Success, None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, DomainError::InvalidState(msg) if msg == "Order is no longer awaiting payment.")
        );

        let stored = market.store.require_payment(payment.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert!(!market.store.is_paid(tx.id).await.unwrap());

        let order = market.store.require_transaction(tx.id).await.unwrap();
        assert_eq!(order.status, TransactionStatus::Disputed);
    }

    #[tokio::test]
    async fn repeated_checkout_reuses_the_open_session() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Accepted).await;

        let first = market
            .payments
            .checkout(tx.id, &market.buyer, None)
            .await
            .unwrap();
        let second = market
            .payments
            .checkout(tx.id, &market.buyer, Some("card".to_string()))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(market.store.payments_for_transaction(tx.id).await.unwrap().len(), 1);

        market
            .payments
            .callback(first.id, ProviderStatus::Failed, None)
            .await
            .unwrap();

        let retry = market
            .payments
            .checkout(tx.id, &market.buyer, None)
            .await
            .unwrap();
        assert_ne!(retry.id, first.id);
        assert_eq!(retry.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn order_is_captured_at_most_once() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Accepted).await;

        // Two sessions opened outside checkout, as two racing requests could.
        let first = store::Payment::pending(&tx, "RM", None, None);
        let second = store::Payment::pending(&tx, "RM", None, None);
        market.store.insert_payment(first.clone()).await.unwrap();
        market.store.insert_payment(second.clone()).await.unwrap();

        let outcome = market
            .payments
            .callback(first.id, ProviderStatus::Success, None)
            .await
            .unwrap();
        assert!(matches!(outcome, PaymentOutcome::Paid { .. }));

        let err = market
            .payments
            .callback(second.id, ProviderStatus::Success, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        let payments = market.store.payments_for_transaction(tx.id).await.unwrap();
        let paid: Vec<_> = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Paid)
            .map(|p| p.id)
            .collect();
        assert_eq!(paid, vec![first.id]);

        let voided = market.store.require_payment(second.id).await.unwrap();
        assert_eq!(voided.status, PaymentStatus::Failed);
        assert_eq!(
            market.store.require_transaction(tx.id).await.unwrap().status,
            TransactionStatus::Shipped
        );
    }

    #[tokio::test]
    async fn refund_marks_payments_refunded() {
        let market = Market::new();
        let (item, tx) = market.order_in(TransactionStatus::Accepted).await;
        let payment = market
            .payments
            .checkout(tx.id, &market.buyer, None)
            .await
            .unwrap();
        market
            .payments
            .callback(payment.id, ProviderStatus::Success, Some("card".to_string()))
            .await
            .unwrap();

        market
            .orders
            .transition(tx.id, TransactionStatus::Disputed, &market.buyer, None)
            .await
            .unwrap();
        market
            .orders
            .transition(tx.id, TransactionStatus::Refunded, &market.admin, None)
            .await
            .unwrap();

        let stored = market.store.require_payment(payment.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Refunded);
        assert_eq!(market.item_status(&item).await, ItemStatus::Available);
    }
}

mod reviews {
    use super::*;

    #[tokio::test]
    async fn buyer_reviews_completed_order_once() {
        let market = Market::new();
        let (item, tx) = market.order_in(TransactionStatus::Completed).await;

        let review = market
            .reviews
            .create(&market.buyer, tx.id, 5, Some("Great seller".to_string()))
            .await
            .unwrap();
        assert_eq!(review.item_id, item.id);
        assert_eq!(review.reviewer_id, market.buyer.id);

        let err = market
            .reviews
            .create(&market.buyer, tx.id, 4, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        assert_eq!(market.reviews.list(Some(item.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn review_requires_completed_order() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Shipped).await;

        let err = market
            .reviews
            .create(&market.buyer, tx.id, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[tokio::test]
    async fn only_buyer_reviews() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Completed).await;

        let err = market
            .reviews
            .create(&market.seller, tx.id, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rating_must_be_one_to_five() {
        let market = Market::new();
        let (_, tx) = market.order_in(TransactionStatus::Completed).await;

        for rating in [0, 6] {
            let err = market
                .reviews
                .create(&market.buyer, tx.id, rating, None)
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let market = Market::new();
        let err = market
            .reviews
            .create(&market.buyer, TransactionId::new(), 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}
