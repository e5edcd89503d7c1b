//! Checkout and the payment advancement hook.

use std::sync::Arc;

use common::{PaymentId, PaymentStatus, TransactionId, TransactionStatus};
use store::{
    ActivityLog, EntityType, MarketStore, MarketStoreExt, Payment, PaymentStatusWrite,
    StoreError, Transaction, actions,
};
use uuid::Uuid;

use crate::actor::Actor;
use crate::error::DomainError;
use crate::transaction::OrderStateService;

/// Currency every payment is taken in.
pub const CURRENCY: &str = "RM";

const NOT_AWAITING_PAYMENT: &str = "Order is no longer awaiting payment.";

/// Result reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Success,
    Failed,
}

/// What a provider callback did.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// The payment was captured and the order advanced to `SHIPPED`.
    Paid {
        payment: Payment,
        transaction: Transaction,
    },
    /// The provider declined the payment.
    Failed { payment: Payment },
}

fn external_reference() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("mock_{}", &token[..10])
}

/// Service handling checkout sessions and provider callbacks.
pub struct PaymentService<S: MarketStore> {
    store: Arc<S>,
    orders: OrderStateService<S>,
}

impl<S: MarketStore> Clone for PaymentService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            orders: self.orders.clone(),
        }
    }
}

impl<S: MarketStore> PaymentService<S> {
    pub fn new(orders: OrderStateService<S>) -> Self {
        Self {
            store: Arc::clone(orders.store()),
            orders,
        }
    }

    /// Opens a pending payment for an accepted order.
    ///
    /// An order has at most one open session: if a `PENDING` payment already
    /// exists it is returned instead of creating another.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn checkout(
        &self,
        transaction_id: TransactionId,
        actor: &Actor,
        method: Option<String>,
    ) -> Result<Payment, DomainError> {
        let transaction = self.store.require_transaction(transaction_id).await?;

        if !transaction.is_buyer(actor.id) {
            return Err(DomainError::Forbidden(
                "Only the buyer can pay for this order.".to_string(),
            ));
        }
        if transaction.status != TransactionStatus::Accepted {
            return Err(DomainError::InvalidState(
                "Payment only possible for accepted offers.".to_string(),
            ));
        }
        if self.store.is_paid(transaction_id).await? {
            return Err(DomainError::InvalidState("Order already paid.".to_string()));
        }

        let existing = self.store.payments_for_transaction(transaction_id).await?;
        if let Some(open) = existing
            .into_iter()
            .find(|p| p.status == PaymentStatus::Pending)
        {
            tracing::info!(payment_id = %open.id, %transaction_id, "reusing open checkout session");
            return Ok(open);
        }

        let payment = Payment::pending(&transaction, CURRENCY, method, Some(external_reference()));
        self.store.insert_payment(payment.clone()).await?;

        metrics::counter!("payments_total", "outcome" => "pending").increment(1);
        tracing::info!(payment_id = %payment.id, %transaction_id, "checkout session created");

        Ok(payment)
    }

    /// Applies a provider callback.
    ///
    /// A successful payment moves the order to `SHIPPED` as the system actor.
    /// If that advancement fails the payment stays `PAID` and the error is
    /// returned to the caller.
    ///
    /// A success for an order that is no longer `ACCEPTED`, or that another
    /// payment already captured, is not recorded: the payment is voided as
    /// `FAILED` and `InvalidState` is returned.
    #[tracing::instrument(skip(self))]
    pub async fn callback(
        &self,
        payment_id: PaymentId,
        status: ProviderStatus,
        method: Option<String>,
    ) -> Result<PaymentOutcome, DomainError> {
        let payment = self.store.require_payment(payment_id).await?;

        if payment.status != PaymentStatus::Pending {
            return Err(DomainError::InvalidState(
                "Payment already processed.".to_string(),
            ));
        }

        let system = Actor::system();

        match status {
            ProviderStatus::Failed => {
                let payment = self
                    .record_failure(&payment, method, "Payment failed.")
                    .await?;

                metrics::counter!("payments_total", "outcome" => "failed").increment(1);
                tracing::info!(%payment_id, "payment failed");

                Ok(PaymentOutcome::Failed { payment })
            }
            ProviderStatus::Success => {
                let transaction = self.store.require_transaction(payment.transaction_id).await?;
                if transaction.status != TransactionStatus::Accepted
                    || self.store.is_paid(transaction.id).await?
                {
                    return Err(self.void(&payment, method, NOT_AWAITING_PAYMENT).await);
                }

                let activity =
                    ActivityLog::builder(EntityType::Payment, payment_id, actions::PAYMENT_RECEIVED)
                        .actor(system.snapshot())
                        .description(format!("Payment of {} {} received", payment.currency, payment.amount))
                        .property("transaction_id", payment.transaction_id.to_string())
                        .property("amount_cents", payment.amount.cents())
                        .build();

                let captured = self
                    .store
                    .update_payment_status(PaymentStatusWrite {
                        payment_id,
                        expected_status: PaymentStatus::Pending,
                        new_status: PaymentStatus::Paid,
                        method: method.clone(),
                        activity: Some(activity),
                    })
                    .await;

                let payment = match captured {
                    Ok(payment) => payment,
                    Err(StoreError::AlreadyPaid(_)) => {
                        return Err(self.void(&payment, method, "Order already paid.").await);
                    }
                    Err(e) => return Err(e.into()),
                };

                metrics::counter!("payments_total", "outcome" => "paid").increment(1);

                let via = payment.method.as_deref().unwrap_or("unknown");
                let note = format!("Payment received via {via}. Marked as SHIPPED automatically.");

                let transaction = self
                    .orders
                    .transition(
                        payment.transaction_id,
                        TransactionStatus::Shipped,
                        &system,
                        Some(note),
                    )
                    .await
                    .map_err(|e| {
                        tracing::error!(
                            %payment_id,
                            transaction_id = %payment.transaction_id,
                            error = %e,
                            "payment captured but order could not be advanced"
                        );
                        e
                    })?;

                Ok(PaymentOutcome::Paid {
                    payment,
                    transaction,
                })
            }
        }
    }

    async fn record_failure(
        &self,
        payment: &Payment,
        method: Option<String>,
        description: &str,
    ) -> Result<Payment, DomainError> {
        let activity = ActivityLog::builder(EntityType::Payment, payment.id, actions::PAYMENT_FAILED)
            .actor(Actor::system().snapshot())
            .description(description)
            .property("transaction_id", payment.transaction_id.to_string())
            .build();

        Ok(self
            .store
            .update_payment_status(PaymentStatusWrite {
                payment_id: payment.id,
                expected_status: PaymentStatus::Pending,
                new_status: PaymentStatus::Failed,
                method,
                activity: Some(activity),
            })
            .await?)
    }

    /// Marks a success that cannot be applied as failed and returns the
    /// error to report.
    async fn void(&self, payment: &Payment, method: Option<String>, reason: &str) -> DomainError {
        metrics::counter!("payments_total", "outcome" => "voided").increment(1);
        tracing::warn!(
            payment_id = %payment.id,
            transaction_id = %payment.transaction_id,
            reason,
            "payment success not applied"
        );

        match self.record_failure(payment, method, reason).await {
            Ok(_) => DomainError::InvalidState(reason.to_string()),
            Err(e) => e,
        }
    }

    /// Lists the payments of an order visible to the actor.
    pub async fn payments_for(
        &self,
        transaction_id: TransactionId,
        actor: &Actor,
    ) -> Result<Vec<Payment>, DomainError> {
        let transaction = self.orders.get_transaction(actor, transaction_id).await?;
        Ok(self.store.payments_for_transaction(transaction.id).await?)
    }
}
