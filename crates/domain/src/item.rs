//! Owner-side item operations.

use std::sync::Arc;

use common::{CategoryId, ItemCondition, ItemId, ItemStatus, Money};
use store::{ActivityLog, EntityType, Item, ItemStatusWrite, MarketStore, MarketStoreExt, actions};

use crate::actor::Actor;
use crate::error::DomainError;

/// Fields of a new listing.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub condition: ItemCondition,
    pub price: Money,
}

pub struct ItemService<S: MarketStore> {
    store: Arc<S>,
}

impl<S: MarketStore> Clone for ItemService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: MarketStore> ItemService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Lists a new item owned by the actor.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn create(&self, actor: &Actor, new: NewItem) -> Result<Item, DomainError> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(DomainError::Validation("Title is required.".to_string()));
        }
        if new.price.is_negative() {
            return Err(DomainError::Validation(
                "Price must not be negative.".to_string(),
            ));
        }

        let item = Item::new(
            actor.id,
            new.category_id,
            title,
            new.description,
            new.condition,
            new.price,
        );
        let activity = ActivityLog::builder(EntityType::Item, item.id, actions::CREATED)
            .actor(actor.snapshot())
            .description(format!("Item listed: {}", item.title))
            .property("status", item.status.as_str())
            .property("price_cents", item.price.cents())
            .build();

        self.store.insert_item(item.clone(), activity).await?;
        tracing::info!(item_id = %item.id, "item listed");

        Ok(item)
    }

    pub async fn get(&self, item_id: ItemId) -> Result<Item, DomainError> {
        Ok(self.store.require_item(item_id).await?)
    }

    /// Explicit owner edit of an item's availability.
    ///
    /// Sold items never change again, and nothing changes while an order
    /// holds the item.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        item_id: ItemId,
        status: ItemStatus,
    ) -> Result<Item, DomainError> {
        let item = self.store.require_item(item_id).await?;

        if item.owner_id != actor.id && !actor.is_admin() {
            return Err(DomainError::Forbidden(
                "Only the owner can change this item.".to_string(),
            ));
        }
        if item.status == ItemStatus::Sold {
            return Err(DomainError::InvalidState(
                "Sold items cannot be changed.".to_string(),
            ));
        }
        if item.status == status {
            return Ok(item);
        }

        let activity = ActivityLog::builder(EntityType::Item, item_id, actions::STATUS_CHANGED)
            .actor(actor.snapshot())
            .description(format!("Item status changed from {} to {status}", item.status))
            .property("old_status", item.status.as_str())
            .property("new_status", status.as_str())
            .build();

        Ok(self
            .store
            .update_item_status(ItemStatusWrite {
                item_id,
                expected_status: item.status,
                new_status: status,
                activity,
            })
            .await?)
    }
}
