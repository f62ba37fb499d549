use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolebind_application::{AssignOutcome, AssignmentRepository, ChangeOutcome};
use rolebind_core::{AppError, AppResult, EntityRef, TenantKey};
use rolebind_domain::{Assignment, AssignmentPair, AssignmentStrategy, NewAssignment};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::AssignmentTableSchema;

mod reads;
mod writes;


#[derive(Debug, FromRow)]
struct AssignmentRow {
    id: i64,
    assignable_type: String,
    assignable_id: String,
    roleable_type: String,
    roleable_id: String,
    role_key: String,
    tenant_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = AppError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            pair: AssignmentPair::new(
                EntityRef::new(row.assignable_type, row.assignable_id)?,
                EntityRef::new(row.roleable_type, row.roleable_id)?,
            ),
            role_key: row.role_key,
            tenant: row.tenant_key.map(TenantKey::new).transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-backed role assignment repository.
///
/// Mutations take a transaction-scoped advisory lock on the pair before
/// touching its rows, so concurrent writers on one pair run one after another.
#[derive(Clone)]
pub struct PostgresAssignmentRepository {
    pool: PgPool,
    schema: AssignmentTableSchema,
    returning: String,
}

impl PostgresAssignmentRepository {
    /// Creates a repository with the provided connection pool and table layout.
    #[must_use]
    pub fn new(pool: PgPool, schema: AssignmentTableSchema) -> Self {
        let tenant_projection = schema
            .tenant_column()
            .map(|column| format!("{column}::text AS tenant_key"))
            .unwrap_or_else(|| "NULL::text AS tenant_key".to_owned());
        let returning = format!(
            "id, assignable_type, assignable_id::text AS assignable_id, roleable_type, \
             roleable_id::text AS roleable_id, role_key, {tenant_projection}, \
             created_at, updated_at"
        );

        Self {
            pool,
            schema,
            returning,
        }
    }

    fn table(&self) -> &str {
        self.schema.table_name()
    }

    /// `WHERE` fragment matching one pair through parameters `$1..$4`.
    fn pair_predicate(&self) -> String {
        let cast = self.schema.id_parameter_cast();
        format!(
            "assignable_type = $1 AND assignable_id = $2{cast} \
             AND roleable_type = $3 AND roleable_id = $4{cast}"
        )
    }

    /// Tenant filter bound at parameter `$index`, when a column exists and a tenant is given.
    fn tenant_predicate(&self, tenant: Option<&TenantKey>, index: usize) -> Option<String> {
        match (self.schema.tenant_column(), tenant) {
            (Some(column), Some(_)) => Some(format!(" AND {column} = ${index}")),
            _ => None,
        }
    }

    fn validate_entity(&self, entity: &EntityRef) -> AppResult<()> {
        self.schema.id_strategy().validate_id(entity.entity_id())
    }

    fn validate_pair(&self, pair: &AssignmentPair) -> AppResult<()> {
        self.validate_entity(&pair.assignable)?;
        self.validate_entity(&pair.roleable)
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|error| map_sqlx_error("failed to begin transaction", error))
    }

    async fn lock_pair(
        &self,
        transaction: &mut Transaction<'static, Postgres>,
        pair: &AssignmentPair,
    ) -> AppResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}:{}", self.table(), pair.lock_key()))
            .execute(&mut **transaction)
            .await
            .map_err(|error| {
                map_sqlx_error(
                    &format!("failed to lock assignment pair '{}'", pair.lock_key()),
                    error,
                )
            })?;

        Ok(())
    }

    async fn lock_pair_rows(
        &self,
        transaction: &mut Transaction<'static, Postgres>,
        pair: &AssignmentPair,
    ) -> AppResult<Vec<Assignment>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY id FOR UPDATE",
            self.returning,
            self.table(),
            self.pair_predicate()
        );

        let rows = sqlx::query_as::<_, AssignmentRow>(sql.as_str())
            .bind(pair.assignable.entity_type())
            .bind(pair.assignable.entity_id())
            .bind(pair.roleable.entity_type())
            .bind(pair.roleable.entity_id())
            .fetch_all(&mut **transaction)
            .await
            .map_err(|error| map_sqlx_error("failed to lock assignment rows", error))?;

        rows.into_iter().map(Assignment::try_from).collect()
    }

    async fn commit(transaction: Transaction<'static, Postgres>) -> AppResult<()> {
        transaction
            .commit()
            .await
            .map_err(|error| map_sqlx_error("failed to commit transaction", error))
    }
}

/// Maps a sqlx error, classifying lock and serialization failures as
/// conflicts and connectivity failures as unavailability.
fn map_sqlx_error(context: &str, error: sqlx::Error) -> AppError {
    match &error {
        sqlx::Error::Database(database_error) => match database_error.code().as_deref() {
            Some("40001" | "40P01" | "55P03" | "23505") => {
                AppError::Conflict(format!("{context}: {error}"))
            }
            _ => AppError::Internal(format!("{context}: {error}")),
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            AppError::Unavailable(format!("{context}: {error}"))
        }
        _ => AppError::Internal(format!("{context}: {error}")),
    }
}

#[async_trait]
impl AssignmentRepository for PostgresAssignmentRepository {
    async fn assign(
        &self,
        assignment: NewAssignment,
        strategy: AssignmentStrategy,
    ) -> AppResult<AssignOutcome> {
        self.assign_impl(assignment, strategy).await
    }

    async fn remove_all(&self, pair: &AssignmentPair) -> AppResult<Vec<Assignment>> {
        self.remove_all_impl(pair).await
    }

    async fn change_role(
        &self,
        pair: &AssignmentPair,
        role_key: &str,
        tenant: Option<TenantKey>,
    ) -> AppResult<ChangeOutcome> {
        self.change_role_impl(pair, role_key, tenant).await
    }

    async fn exists(
        &self,
        pair: &AssignmentPair,
        role_key: &str,
        tenant: Option<&TenantKey>,
    ) -> AppResult<bool> {
        self.exists_impl(pair, role_key, tenant).await
    }

    async fn list_for_pair(
        &self,
        pair: &AssignmentPair,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>> {
        self.list_for_pair_impl(pair, tenant).await
    }

    async fn list_for_roleable(
        &self,
        roleable: &EntityRef,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>> {
        self.list_for_roleable_impl(roleable, tenant).await
    }

    async fn list_for_assignable(
        &self,
        assignable: &EntityRef,
        roleable_type: Option<&str>,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>> {
        self.list_for_assignable_impl(assignable, roleable_type, tenant)
            .await
    }
}
