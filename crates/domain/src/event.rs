use rolebind_core::EntityRef;
use serde::{Deserialize, Serialize};

use crate::RoleIdentity;

/// Binding carried by role events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Entity holding the role.
    pub assignable: EntityRef,
    /// Entity the role is held on.
    pub roleable: EntityRef,
    /// Stored key of the role.
    pub role_key: String,
    /// Resolved role, absent when the key references a retired role.
    pub role: Option<RoleIdentity>,
}

/// Domain events emitted after a binding mutation commits.
///
/// A role change is observed as `Removed` followed by `Assigned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoleEvent {
    /// A role was bound to a pair.
    Assigned(RoleBinding),
    /// A role was unbound from a pair.
    Removed(RoleBinding),
}

impl RoleEvent {
    /// Returns a stable name for this event.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned(_) => "role.assigned",
            Self::Removed(_) => "role.removed",
        }
    }

    /// Returns the binding the event refers to.
    #[must_use]
    pub fn binding(&self) -> &RoleBinding {
        match self {
            Self::Assigned(binding) | Self::Removed(binding) => binding,
        }
    }
}
