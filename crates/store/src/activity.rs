use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{ActivityId, ParseEnumError, Role, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entity an activity row is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Item,
    Transaction,
    Payment,
    User,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Item => "Item",
            EntityType::Transaction => "Transaction",
            EntityType::Payment => "Payment",
            EntityType::User => "User",
        }
    }
}

impl FromStr for EntityType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "item" => Ok(EntityType::Item),
            "transaction" => Ok(EntityType::Transaction),
            "payment" => Ok(EntityType::Payment),
            "user" => Ok(EntityType::User),
            _ => Err(ParseEnumError {
                kind: "entity type",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed an action, captured at the time it happened.
///
/// The snapshot is stored alongside the row so renaming or deleting a user
/// later does not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

/// Well-known action tags.
pub mod actions {
    pub const CREATED: &str = "created";
    pub const STATUS_CHANGED: &str = "status_changed";
    pub const PAYMENT_RECEIVED: &str = "payment_received";
    pub const PAYMENT_FAILED: &str = "payment_failed";
}

/// An append-only audit record of a mutation.
///
/// Rows are never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: ActivityId,

    /// The actor, absent for rows written by the platform itself.
    pub actor: Option<ActorSnapshot>,

    pub entity_type: EntityType,
    pub entity_id: Uuid,

    /// Short machine-readable tag, e.g. `status_changed`.
    pub action: String,

    /// Human-readable description.
    pub description: Option<String>,

    /// Structured old/new property diff.
    pub properties: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    /// Starts building a row about the given entity.
    pub fn builder(
        entity_type: EntityType,
        entity_id: impl Into<Uuid>,
        action: impl Into<String>,
    ) -> ActivityLogBuilder {
        ActivityLogBuilder {
            entity_type,
            entity_id: entity_id.into(),
            action: action.into(),
            actor: None,
            description: None,
            properties: serde_json::Map::new(),
            created_at: None,
        }
    }

    /// Returns a property from the diff, if present.
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }
}

/// Builder for [`ActivityLog`] rows.
#[derive(Debug)]
pub struct ActivityLogBuilder {
    entity_type: EntityType,
    entity_id: Uuid,
    action: String,
    actor: Option<ActorSnapshot>,
    description: Option<String>,
    properties: serde_json::Map<String, serde_json::Value>,
    created_at: Option<DateTime<Utc>>,
}

impl ActivityLogBuilder {
    pub fn actor(mut self, actor: ActorSnapshot) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds an entry to the property diff.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn build(self) -> ActivityLog {
        ActivityLog {
            id: ActivityId::new(),
            actor: self.actor,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action: self.action,
            description: self.description,
            properties: serde_json::Value::Object(self.properties),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}
