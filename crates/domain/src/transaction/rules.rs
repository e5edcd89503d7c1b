//! Transition validator.
//!
//! Every requested status change is checked here before anything is written.
//! Callers with no stake in the order are refused before the target is even
//! looked at. The per-target relationship check yields `Forbidden`; the
//! current-status check runs last and yields `InvalidState`.

use common::TransactionStatus;
use store::Transaction;

use crate::actor::Actor;
use crate::error::TransitionError;

pub(crate) const INVALID_TRANSITION: &str = "Invalid status transition.";
pub(crate) const NOT_A_PARTY: &str = "Not authorized to update this order.";

/// Checks that `actor` may ask for any change to `transaction` at all.
///
/// Only the buyer, the seller, an admin or the system actor qualify.
pub fn authorize(transaction: &Transaction, actor: &Actor) -> Result<(), TransitionError> {
    let involved = transaction.is_buyer(actor.id) || transaction.is_seller(actor.id);
    if involved || actor.is_admin() || actor.is_system() {
        Ok(())
    } else {
        Err(TransitionError::Forbidden(NOT_A_PARTY))
    }
}

/// Parses a requested status, accepting the legacy aliases.
///
/// Anything that does not name a known status is an invalid transition.
pub fn parse_target(raw: &str) -> Result<TransactionStatus, TransitionError> {
    raw.trim()
        .parse()
        .map_err(|_| TransitionError::InvalidState(INVALID_TRANSITION))
}

/// Checks whether `actor` may move `transaction` to `target`.
pub fn validate(
    transaction: &Transaction,
    actor: &Actor,
    target: TransactionStatus,
) -> Result<(), TransitionError> {
    use TransactionStatus::*;

    authorize(transaction, actor)?;

    let current = transaction.status;
    let is_buyer = transaction.is_buyer(actor.id);
    let is_seller = transaction.is_seller(actor.id);

    let (allowed, permitted, forbidden, invalid) = match target {
        Accepted | Rejected => (
            is_seller,
            current.can_accept(),
            "Only sellers can accept or reject offers.",
            "Can only accept/reject a requested offer.",
        ),
        Shipped => (
            is_seller || actor.is_system(),
            current.can_ship(),
            "Only sellers can mark as shipped.",
            "Can only ship an accepted order.",
        ),
        Delivered => (
            is_buyer || is_seller,
            current.can_deliver(),
            "Only the buyer or seller can confirm delivery.",
            "Can only mark as delivered/received after shipping.",
        ),
        Completed => (
            is_buyer,
            current.can_complete(),
            "Only buyers can complete the order.",
            "Cannot complete order yet.",
        ),
        Cancelled => (
            is_buyer || is_seller || actor.is_admin(),
            current.can_cancel(),
            "Not authorized to cancel.",
            "Cannot cancel an accepted, shipped or completed order.",
        ),
        Disputed => (
            is_buyer || is_seller,
            current.can_dispute(),
            "Only the buyer or seller can open a dispute.",
            "Cannot dispute a closed order.",
        ),
        Refunded => (
            actor.is_admin(),
            current.can_refund(),
            "Only admins can process refunds.",
            "Can only refund disputed orders.",
        ),
        Requested => return Err(TransitionError::InvalidState(INVALID_TRANSITION)),
    };

    if !allowed {
        return Err(TransitionError::Forbidden(forbidden));
    }
    if !permitted {
        return Err(TransitionError::InvalidState(invalid));
    }
    Ok(())
}
