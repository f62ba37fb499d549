use async_trait::async_trait;

use rolebind_core::{AppResult, EntityRef, TenantKey};
use rolebind_domain::{Assignment, AssignmentPair, AssignmentStrategy, NewAssignment, RoleEvent};

/// Result of binding a role to a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignOutcome {
    /// Row holding the requested role after the operation.
    pub assignment: Assignment,
    /// Whether the row was inserted by this operation.
    pub created: bool,
    /// Rows holding other roles that were deleted under the `replace` strategy.
    pub replaced: Vec<Assignment>,
}

/// Result of changing the role held on a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The pair held no role; nothing was written.
    Missing,
    /// The pair already held the requested role.
    Unchanged(Assignment),
    /// The role key of an existing row was overwritten.
    Changed {
        /// Row as it was before the change.
        previous: Assignment,
        /// Row as it is after the change.
        current: Assignment,
    },
}

/// Persistence port for role bindings.
///
/// Every mutating method runs as one transaction and serializes concurrent
/// writers on the same pair. Read methods take an optional tenant filter that
/// restricts results to rows written under that tenant.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Inserts the binding if absent. Under `Replace`, rows of the pair holding
    /// any other role are deleted first within the same transaction.
    async fn assign(
        &self,
        assignment: NewAssignment,
        strategy: AssignmentStrategy,
    ) -> AppResult<AssignOutcome>;

    /// Deletes every row of the pair and returns the deleted rows.
    async fn remove_all(&self, pair: &AssignmentPair) -> AppResult<Vec<Assignment>>;

    /// Overwrites the role key of the pair's oldest row.
    async fn change_role(
        &self,
        pair: &AssignmentPair,
        role_key: &str,
        tenant: Option<TenantKey>,
    ) -> AppResult<ChangeOutcome>;

    /// Returns whether the pair holds the role key.
    async fn exists(
        &self,
        pair: &AssignmentPair,
        role_key: &str,
        tenant: Option<&TenantKey>,
    ) -> AppResult<bool>;

    /// Lists the rows of one pair.
    async fn list_for_pair(
        &self,
        pair: &AssignmentPair,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>>;

    /// Lists the rows targeting one roleable entity.
    async fn list_for_roleable(
        &self,
        roleable: &EntityRef,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>>;

    /// Lists the rows held by one assignable entity, optionally narrowed to a roleable type.
    async fn list_for_assignable(
        &self,
        assignable: &EntityRef,
        roleable_type: Option<&str>,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>>;
}

/// Backend port for derived read caches.
///
/// Values are opaque strings; callers own serialization.
#[async_trait]
pub trait RoleCache: Send + Sync {
    /// Reads one entry.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Writes one entry with ttl. A zero ttl skips the write.
    async fn set(&self, key: &str, value: String, ttl_seconds: u32) -> AppResult<()>;

    /// Deletes entries. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> AppResult<()>;

    /// Records `key` as a member of `tag`.
    async fn tag(&self, tag: &str, key: &str) -> AppResult<()>;

    /// Deletes every entry recorded under `tag`, then the tag itself.
    async fn invalidate_tag(&self, tag: &str) -> AppResult<()>;
}

/// Port receiving domain events after mutations commit.
#[async_trait]
pub trait RoleEventPublisher: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: RoleEvent) -> AppResult<()>;
}
