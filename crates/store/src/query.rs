use chrono::{DateTime, Utc};
use common::UserId;
use uuid::Uuid;

use crate::{EntityType, Result, StoreError};

/// Builder for constructing activity log queries.
///
/// Allows filtering rows by entity, actor, action tag and time range.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    /// Filter by entity type.
    pub entity_type: Option<EntityType>,

    /// Filter by entity ID.
    pub entity_id: Option<Uuid>,

    /// Filter by the acting user.
    pub actor_id: Option<UserId>,

    /// Filter by action tags (any of these).
    pub actions: Option<Vec<String>>,

    /// Filter by rows at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Filter by rows at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of rows to return.
    pub limit: Option<usize>,

    /// Number of rows to skip.
    pub offset: Option<usize>,
}

impl ActivityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for the trail of one entity.
    pub fn for_entity(entity_type: EntityType, entity_id: impl Into<Uuid>) -> Self {
        Self {
            entity_type: Some(entity_type),
            entity_id: Some(entity_id.into()),
            ..Default::default()
        }
    }

    pub fn actor_id(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions = Some(vec![action.into()]);
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Offset pagination for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 20;
    pub const MAX_LIMIT: usize = 100;

    /// Creates a page, capping the limit at [`Page::MAX_LIMIT`].
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: limit.min(Self::MAX_LIMIT),
            offset,
        }
    }

    /// Limit and offset as signed SQL integers.
    pub fn bounds(&self) -> Result<(i64, i64)> {
        Ok((sql_bound("limit", self.limit)?, sql_bound("offset", self.offset)?))
    }
}

/// Converts a row count into a `LIMIT`/`OFFSET` argument.
pub(crate) fn sql_bound(name: &'static str, value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidPage(name))
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TransactionId;

    #[test]
    fn query_for_entity() {
        let id = TransactionId::new();
        let query = ActivityQuery::for_entity(EntityType::Transaction, id);

        assert_eq!(query.entity_type, Some(EntityType::Transaction));
        assert_eq!(query.entity_id, Some(id.as_uuid()));
        assert!(query.actions.is_none());
    }

    #[test]
    fn query_builder_chain() {
        let actor = UserId::new();
        let query = ActivityQuery::new()
            .actor_id(actor)
            .action("status_changed")
            .limit(10)
            .offset(5);

        assert_eq!(query.actor_id, Some(actor));
        assert_eq!(query.actions, Some(vec!["status_changed".to_string()]));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(5));
    }

    #[test]
    fn default_page() {
        assert_eq!(Page::default(), Page::new(20, 0));
    }

    #[test]
    fn page_limit_is_capped() {
        assert_eq!(Page::new(usize::MAX, 0).limit, Page::MAX_LIMIT);
        assert_eq!(Page::new(5, 0).limit, 5);
    }

    #[test]
    fn page_bounds_reject_offsets_beyond_sql_range() {
        assert_eq!(Page::new(10, 30).bounds().unwrap(), (10, 30));
        assert!(matches!(
            Page::new(10, usize::MAX).bounds(),
            Err(StoreError::InvalidPage("offset"))
        ));
    }
}
