//! Read access to the audit trail.

use std::sync::Arc;

use store::{ActivityLog, ActivityQuery, ActivityStream, EntityType, MarketStore};
use uuid::Uuid;

use crate::actor::Actor;
use crate::error::DomainError;

pub struct ActivityService<S: MarketStore> {
    store: Arc<S>,
}

impl<S: MarketStore> Clone for ActivityService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: MarketStore> ActivityService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the trail of one entity, oldest first. Admins only.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn trail(
        &self,
        actor: &Actor,
        entity_type: EntityType,
        entity_id: Uuid,
        query: ActivityQuery,
    ) -> Result<Vec<ActivityLog>, DomainError> {
        require_admin(actor)?;

        let query = ActivityQuery {
            entity_type: Some(entity_type),
            entity_id: Some(entity_id),
            ..query
        };
        Ok(self.store.query_activity(query).await?)
    }

    /// Streams the whole log in write order. Admins only.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn export(&self, actor: &Actor) -> Result<ActivityStream, DomainError> {
        require_admin(actor)?;
        Ok(self.store.stream_activity().await?)
    }
}

fn require_admin(actor: &Actor) -> Result<(), DomainError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(DomainError::Forbidden(
            "Only admins can view activity logs.".to_string(),
        ))
    }
}
