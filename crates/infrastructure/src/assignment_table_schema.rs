//! DDL and column layout of the role assignment table.

use rolebind_application::{RbacConfig, validate_identifier};
use rolebind_core::{AppError, AppResult};
use rolebind_domain::{IdStrategy, KeyStorage};
use sqlx::PgPool;
use tracing::info;

/// Layout of the assignments table derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentTableSchema {
    table_name: String,
    id_strategy: IdStrategy,
    key_storage: KeyStorage,
    tenant_column: Option<String>,
}

impl AssignmentTableSchema {
    /// Derives the layout from validated configuration.
    pub fn from_config(config: &RbacConfig) -> AppResult<Self> {
        config.validate()?;

        Ok(Self {
            table_name: config.table_name.clone(),
            id_strategy: config.id_strategy,
            key_storage: config.key_storage,
            tenant_column: config
                .multitenancy
                .enabled
                .then(|| config.multitenancy.tenant_column.clone()),
        })
    }

    /// Creates a layout from explicit parts.
    pub fn new(
        table_name: impl Into<String>,
        id_strategy: IdStrategy,
        key_storage: KeyStorage,
        tenant_column: Option<String>,
    ) -> AppResult<Self> {
        let table_name = table_name.into();
        validate_identifier("table_name", table_name.as_str())?;
        if let Some(tenant_column) = tenant_column.as_deref() {
            validate_identifier("tenant_column", tenant_column)?;
        }

        Ok(Self {
            table_name,
            id_strategy,
            key_storage,
            tenant_column,
        })
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.table_name.as_str()
    }

    /// Returns the tenant column when multitenancy is enabled.
    #[must_use]
    pub fn tenant_column(&self) -> Option<&str> {
        self.tenant_column.as_deref()
    }

    /// Returns the id format of entity id columns.
    #[must_use]
    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    /// Column type of `assignable_id` and `roleable_id`.
    #[must_use]
    pub fn id_column_type(&self) -> &'static str {
        match self.id_strategy {
            IdStrategy::Ulid => "CHAR(26)",
            IdStrategy::Uuid => "UUID",
            IdStrategy::Integer => "BIGINT",
        }
    }

    /// Cast applied to text parameters compared with entity id columns.
    #[must_use]
    pub fn id_parameter_cast(&self) -> &'static str {
        match self.id_strategy {
            IdStrategy::Ulid => "",
            IdStrategy::Uuid => "::uuid",
            IdStrategy::Integer => "::bigint",
        }
    }

    /// Column type of `role_key`; ciphertext does not fit the bounded type.
    #[must_use]
    pub fn role_key_column_type(&self) -> &'static str {
        match self.key_storage {
            KeyStorage::Encrypted => "TEXT",
            KeyStorage::Plain | KeyStorage::Hashed => "VARCHAR(255)",
        }
    }

    /// Renders every statement needed to create the table and its indexes.
    #[must_use]
    pub fn create_statements(&self) -> Vec<String> {
        let table = self.table_name.as_str();
        let id_type = self.id_column_type();
        let tenant_definition = self
            .tenant_column
            .as_deref()
            .map(|column| format!("\n    {column} VARCHAR(255) NULL,"))
            .unwrap_or_default();

        let mut statements = vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    assignable_type VARCHAR(255) NOT NULL,
    assignable_id {id_type} NOT NULL,
    roleable_type VARCHAR(255) NOT NULL,
    roleable_id {id_type} NOT NULL,
    role_key {role_key_type} NOT NULL,{tenant_definition}
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)",
                role_key_type = self.role_key_column_type(),
            ),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}_binding_unique \
                 ON {table} (assignable_type, assignable_id, roleable_type, roleable_id, role_key)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_roleable_idx \
                 ON {table} (roleable_type, roleable_id)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {table}_assignable_idx \
                 ON {table} (assignable_type, assignable_id, roleable_type)"
            ),
            format!("CREATE INDEX IF NOT EXISTS {table}_role_key_idx ON {table} (role_key)"),
        ];

        if let Some(column) = self.tenant_column.as_deref() {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {table}_{column}_idx ON {table} ({column})"
            ));
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {table}_roleable_{column}_idx \
                 ON {table} ({column}, roleable_type, roleable_id)"
            ));
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {table}_assignable_{column}_idx \
                 ON {table} ({column}, assignable_type, assignable_id)"
            ));
        }

        statements
    }

    /// Applies the rendered DDL. Safe to run repeatedly.
    pub async fn ensure(&self, pool: &PgPool) -> AppResult<()> {
        let mut transaction = pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

        for statement in self.create_statements() {
            sqlx::query(statement.as_str())
                .execute(&mut *transaction)
                .await
                .map_err(|error| {
                    AppError::Internal(format!(
                        "failed to apply schema for table '{}': {error}",
                        self.table_name
                    ))
                })?;
        }

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))?;

        info!(table = %self.table_name, "role assignment schema ensured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rolebind_application::RbacConfig;
    use rolebind_core::AppResult;
    use rolebind_domain::{IdStrategy, KeyStorage};

    use super::AssignmentTableSchema;

    #[test]
    fn default_layout_uses_ulid_and_bounded_keys() -> AppResult<()> {
        let schema = AssignmentTableSchema::from_config(&RbacConfig::default())?;
        let statements = schema.create_statements();

        assert_eq!(statements.len(), 5);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS model_has_roles ("));
        assert!(statements[0].contains("assignable_id CHAR(26) NOT NULL"));
        assert!(statements[0].contains("role_key VARCHAR(255) NOT NULL"));
        assert!(!statements[0].contains("tenant_id"));
        assert!(statements[1].contains(
            "(assignable_type, assignable_id, roleable_type, roleable_id, role_key)"
        ));
        Ok(())
    }

    #[test]
    fn multitenant_layout_adds_tenant_column_and_indexes() -> AppResult<()> {
        let mut config = RbacConfig {
            id_strategy: IdStrategy::Uuid,
            ..RbacConfig::default()
        };
        config.multitenancy.enabled = true;
        config.multitenancy.tenant_column = "org_id".to_owned();

        let schema = AssignmentTableSchema::from_config(&config)?;
        let statements = schema.create_statements();

        assert_eq!(schema.tenant_column(), Some("org_id"));
        assert!(statements[0].contains("org_id VARCHAR(255) NULL"));
        assert!(statements[0].contains("roleable_id UUID NOT NULL"));
        assert_eq!(statements.len(), 8);
        assert!(statements[5].contains("model_has_roles_org_id_idx"));
        assert!(statements[7].contains("(org_id, assignable_type, assignable_id)"));
        Ok(())
    }

    #[test]
    fn encrypted_keys_use_unbounded_column() -> AppResult<()> {
        let schema = AssignmentTableSchema::new(
            "project_roles",
            IdStrategy::Integer,
            KeyStorage::Encrypted,
            None,
        )?;

        assert_eq!(schema.role_key_column_type(), "TEXT");
        assert_eq!(schema.id_parameter_cast(), "::bigint");
        assert!(schema.create_statements()[0].contains("assignable_id BIGINT NOT NULL"));
        Ok(())
    }

    #[test]
    fn unsafe_identifiers_are_rejected() {
        let result = AssignmentTableSchema::new(
            "roles\"; DROP TABLE users; --",
            IdStrategy::Ulid,
            KeyStorage::Plain,
            None,
        );
        assert!(result.is_err());
    }
}
