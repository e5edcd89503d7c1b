//! Order state machine.

pub mod rules;
mod service;

pub use rules::{authorize, parse_target, validate};
pub use service::{OrderStateService, item_effect};
