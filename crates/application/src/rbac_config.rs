use rolebind_core::{AppError, AppResult};
use rolebind_domain::{AssignmentStrategy, IdStrategy, KeyStorage};
use serde::{Deserialize, Serialize};

/// Multitenancy options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultitenancyConfig {
    /// Enables tenant integrity checks and the tenant column.
    pub enabled: bool,
    /// Name of the denormalized tenant column.
    pub tenant_column: String,
    /// Restricts reads to rows written under the caller's tenant.
    pub auto_scope: bool,
    /// Adds a tenant segment to every cache key.
    pub cache_per_tenant: bool,
}

impl Default for MultitenancyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tenant_column: "tenant_id".to_owned(),
            auto_scope: true,
            cache_per_tenant: true,
        }
    }
}

/// Read cache options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enables derived read caches.
    pub enabled: bool,
    /// Default ttl in seconds.
    pub ttl_seconds: u32,
    /// Ttl override for role checks.
    pub role_check_ttl_seconds: Option<u32>,
    /// Ttl override for participant lists.
    pub participants_ttl_seconds: Option<u32>,
    /// Ttl override for assigned entity lists.
    pub assigned_entities_ttl_seconds: Option<u32>,
    /// Prefix of every cache key.
    pub key_prefix: String,
    /// Records entries under per-entity tags so an entity can be flushed at once.
    pub use_tags: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600,
            role_check_ttl_seconds: None,
            participants_ttl_seconds: None,
            assigned_entities_ttl_seconds: None,
            key_prefix: "rolebind".to_owned(),
            use_tags: false,
        }
    }
}

/// Recognized configuration surface of the role assignment core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    /// Name of the assignments table.
    pub table_name: String,
    /// Identifier format of assignable and roleable ids.
    pub id_strategy: IdStrategy,
    /// Replace-or-add policy for new assignments.
    pub assignment_strategy: AssignmentStrategy,
    /// Representation of role names in storage.
    pub key_storage: KeyStorage,
    /// Secret for hashed keys. Encrypted keys use a hex key from the cipher adapter.
    pub key_secret: String,
    /// Attempts per mutation when infrastructure errors are retryable.
    pub retry_attempts: u32,
    /// Base pause between attempts; grows linearly with the attempt number.
    pub retry_backoff_ms: u64,
    /// Multitenancy options.
    pub multitenancy: MultitenancyConfig,
    /// Read cache options.
    pub cache: CacheConfig,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            table_name: "model_has_roles".to_owned(),
            id_strategy: IdStrategy::default(),
            assignment_strategy: AssignmentStrategy::default(),
            key_storage: KeyStorage::default(),
            key_secret: String::new(),
            retry_attempts: 3,
            retry_backoff_ms: 20,
            multitenancy: MultitenancyConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl RbacConfig {
    /// Checks cross-field invariants.
    pub fn validate(&self) -> AppResult<()> {
        validate_identifier("table_name", self.table_name.as_str())?;
        validate_identifier(
            "multitenancy.tenant_column",
            self.multitenancy.tenant_column.as_str(),
        )?;

        if self.retry_attempts == 0 {
            return Err(AppError::Validation(
                "retry_attempts must be at least 1".to_owned(),
            ));
        }

        if self.cache.key_prefix.trim().is_empty() {
            return Err(AppError::Validation(
                "cache.key_prefix must not be empty".to_owned(),
            ));
        }

        if self.key_storage == KeyStorage::Hashed && self.key_secret.is_empty() {
            return Err(AppError::Validation(
                "key_secret is required when key_storage is 'hashed'".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Checks that a value is usable as an unquoted SQL identifier.
pub fn validate_identifier(field: &str, value: &str) -> AppResult<()> {
    let mut characters = value.chars();
    let starts_well = characters
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_');
    let rest_ok = characters.all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    });

    if !starts_well || !rest_ok || value.len() > 63 {
        return Err(AppError::Validation(format!(
            "{field} '{value}' must be a lowercase SQL identifier of at most 63 characters"
        )));
    }

    Ok(())
}
