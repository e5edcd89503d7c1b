pub mod activity;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use activity::{ActivityLog, ActivityLogBuilder, ActorSnapshot, EntityType, actions};
pub use error::{Result, StoreError};
pub use memory::InMemoryMarketStore;
pub use model::{Item, Payment, Review, Transaction};
pub use postgres::PostgresMarketStore;
pub use query::{ActivityQuery, Page};
pub use store::{
    ActivityStream, ItemStatusWrite, MarketStore, MarketStoreExt, PaymentStatusWrite,
    TransitionWrite,
};
