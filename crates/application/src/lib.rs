//! Application services and ports.

#![forbid(unsafe_code)]

mod assignment_engine;
mod assignment_ports;
mod cache_coordinator;
mod rbac_config;

pub use assignment_engine::{AssignmentEngine, CacheTarget, Participant, RoleRef};
pub use assignment_ports::{
    AssignOutcome, AssignmentRepository, ChangeOutcome, RoleCache, RoleEventPublisher,
};
pub use cache_coordinator::{CacheCoordinator, CacheEntryKey, CachePurpose};
pub use rbac_config::{CacheConfig, MultitenancyConfig, RbacConfig, validate_identifier};
