use async_trait::async_trait;
use chrono::Utc;
use rolebind_application::{AssignOutcome, AssignmentRepository, ChangeOutcome};
use rolebind_core::{AppResult, EntityRef, TenantKey};
use rolebind_domain::{Assignment, AssignmentPair, AssignmentStrategy, NewAssignment};
use tokio::sync::RwLock;


#[derive(Debug, Default)]
struct AssignmentTable {
    rows: Vec<Assignment>,
    last_id: i64,
}

impl AssignmentTable {
    fn insert(&mut self, assignment: NewAssignment) -> Assignment {
        self.last_id += 1;
        let now = Utc::now();
        let row = Assignment {
            id: self.last_id,
            pair: assignment.pair,
            role_key: assignment.role_key,
            tenant: assignment.tenant,
            created_at: now,
            updated_at: now,
        };
        self.rows.push(row.clone());
        row
    }

    fn drain_where(&mut self, predicate: impl Fn(&Assignment) -> bool) -> Vec<Assignment> {
        let (drained, kept): (Vec<Assignment>, Vec<Assignment>) = std::mem::take(&mut self.rows)
            .into_iter()
            .partition(|row| predicate(row));
        self.rows = kept;
        drained
    }

    fn scoped(
        &self,
        tenant: Option<&TenantKey>,
        predicate: impl Fn(&Assignment) -> bool,
    ) -> Vec<Assignment> {
        self.rows
            .iter()
            .filter(|row| tenant.is_none_or(|tenant| row.tenant.as_ref() == Some(tenant)))
            .filter(|row| predicate(row))
            .cloned()
            .collect()
    }
}

/// In-memory role assignment repository.
///
/// A single write lock serializes every mutation, which gives the same
/// per-pair atomicity as the PostgreSQL adapter.
#[derive(Debug, Default)]
pub struct InMemoryAssignmentRepository {
    table: RwLock<AssignmentTable>,
}

impl InMemoryAssignmentRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn assign(
        &self,
        assignment: NewAssignment,
        strategy: AssignmentStrategy,
    ) -> AppResult<AssignOutcome> {
        let mut table = self.table.write().await;

        let replaced = match strategy {
            AssignmentStrategy::Replace => table.drain_where(|row| {
                row.pair == assignment.pair && row.role_key != assignment.role_key
            }),
            AssignmentStrategy::Add => Vec::new(),
        };

        if let Some(existing) = table
            .rows
            .iter()
            .find(|row| row.pair == assignment.pair && row.role_key == assignment.role_key)
        {
            return Ok(AssignOutcome {
                assignment: existing.clone(),
                created: false,
                replaced,
            });
        }

        Ok(AssignOutcome {
            assignment: table.insert(assignment),
            created: true,
            replaced,
        })
    }

    async fn remove_all(&self, pair: &AssignmentPair) -> AppResult<Vec<Assignment>> {
        Ok(self.table.write().await.drain_where(|row| &row.pair == pair))
    }

    async fn change_role(
        &self,
        pair: &AssignmentPair,
        role_key: &str,
        tenant: Option<TenantKey>,
    ) -> AppResult<ChangeOutcome> {
        let mut table = self.table.write().await;

        let Some(oldest) = table
            .rows
            .iter()
            .filter(|row| &row.pair == pair)
            .min_by_key(|row| row.id)
            .cloned()
        else {
            return Ok(ChangeOutcome::Missing);
        };

        if oldest.role_key == role_key {
            return Ok(ChangeOutcome::Unchanged(oldest));
        }

        if let Some(holder) = table
            .rows
            .iter()
            .find(|row| &row.pair == pair && row.role_key == role_key)
            .cloned()
        {
            table.drain_where(|row| row.id == oldest.id);
            return Ok(ChangeOutcome::Changed {
                previous: oldest,
                current: holder,
            });
        }

        let mut current = oldest.clone();
        current.role_key = role_key.to_owned();
        current.tenant = tenant;
        current.updated_at = Utc::now();
        if let Some(row) = table.rows.iter_mut().find(|row| row.id == oldest.id) {
            *row = current.clone();
        }

        Ok(ChangeOutcome::Changed {
            previous: oldest,
            current,
        })
    }

    async fn exists(
        &self,
        pair: &AssignmentPair,
        role_key: &str,
        tenant: Option<&TenantKey>,
    ) -> AppResult<bool> {
        Ok(!self
            .table
            .read()
            .await
            .scoped(tenant, |row| &row.pair == pair && row.role_key == role_key)
            .is_empty())
    }

    async fn list_for_pair(
        &self,
        pair: &AssignmentPair,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>> {
        Ok(self
            .table
            .read()
            .await
            .scoped(tenant, |row| &row.pair == pair))
    }

    async fn list_for_roleable(
        &self,
        roleable: &EntityRef,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>> {
        Ok(self
            .table
            .read()
            .await
            .scoped(tenant, |row| &row.pair.roleable == roleable))
    }

    async fn list_for_assignable(
        &self,
        assignable: &EntityRef,
        roleable_type: Option<&str>,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>> {
        Ok(self.table.read().await.scoped(tenant, |row| {
            &row.pair.assignable == assignable
                && roleable_type
                    .is_none_or(|roleable_type| row.pair.roleable.entity_type() == roleable_type)
        }))
    }
}
