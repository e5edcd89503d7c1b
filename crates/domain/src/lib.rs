//! Domain layer for the marketplace.
//!
//! This crate provides:
//! - The order state machine: the transition validator and `OrderStateService`
//! - Checkout and the payment advancement hook
//! - The review gate and owner-side item operations
//! - The notification dispatcher interface

pub mod activity;
pub mod actor;
pub mod error;
pub mod item;
pub mod notification;
pub mod payment;
pub mod review;
pub mod transaction;

pub use activity::ActivityService;
pub use actor::Actor;
pub use error::{DomainError, TransitionError};
pub use item::{ItemService, NewItem};
pub use notification::{
    DispatchError, InMemoryNotificationDispatcher, Notification, NotificationDispatcher,
    NotificationKind, TracingNotificationDispatcher,
};
pub use payment::{CURRENCY, PaymentOutcome, PaymentService, ProviderStatus};
pub use review::ReviewService;
pub use transaction::{OrderStateService, authorize, item_effect, parse_target, validate};
