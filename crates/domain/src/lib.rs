//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod assignment;
mod entity;
mod event;
mod registry;
mod role;
mod role_key;
mod tenant_policy;

pub use assignment::{Assignment, AssignmentPair, AssignmentStrategy, IdStrategy, NewAssignment};
pub use entity::{Assignable, EntityHandle, Roleable};
pub use event::{RoleBinding, RoleEvent};
pub use registry::RoleRegistry;
pub use role::RoleIdentity;
pub use role_key::{KeyStorage, RoleKeyCipher, RoleKeyCodec};
pub use tenant_policy::{TenantPolicyInput, evaluate_tenant_policy};
