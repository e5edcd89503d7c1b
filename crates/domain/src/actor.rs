//! The identity on whose behalf an operation runs.

use common::{Role, UserId};
use store::ActorSnapshot;
use uuid::Uuid;

/// Caller identity passed explicitly into every domain operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            role,
        }
    }

    /// A regular marketplace user.
    pub fn user(id: UserId, name: impl Into<String>) -> Self {
        Self::new(id, name, Role::User)
    }

    pub fn admin(id: UserId, name: impl Into<String>) -> Self {
        Self::new(id, name, Role::Admin)
    }

    /// The platform itself, used by the payment hook.
    ///
    /// Never a buyer or seller of anything: its id is the nil UUID.
    pub fn system() -> Self {
        Self::new(UserId::from_uuid(Uuid::nil()), "System", Role::System)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Captures the actor for an activity row.
    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
        }
    }
}
