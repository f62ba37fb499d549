use std::env;
use std::str::FromStr;
use std::sync::Arc;

use rolebind_application::RbacConfig;
use rolebind_core::{AppError, AppResult};
use rolebind_domain::{KeyStorage, RoleIdentity, RoleKeyCodec, RoleRegistry};
use rolebind_infrastructure::AesRoleKeyCipher;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Role definition as written in `ROLEBIND_ROLES`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    pub level: i32,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RoleDefinition {
    fn into_identity(self) -> AppResult<RoleIdentity> {
        let mut identity = RoleIdentity::new(self.name, self.level)?;
        if let Some(label) = self.label {
            identity = identity.with_label(label);
        }
        if let Some(description) = self.description {
            identity = identity.with_description(description);
        }

        Ok(identity)
    }
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub encryption_key: Option<String>,
    pub rbac: RbacConfig,
    pub roles: Vec<RoleDefinition>,
}

impl AdminConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut rbac = RbacConfig::default();

        if let Some(table_name) = lookup("ROLEBIND_TABLE_NAME") {
            rbac.table_name = table_name;
        }
        if let Some(value) = lookup("ROLEBIND_ID_STRATEGY") {
            rbac.id_strategy = value.parse()?;
        }
        if let Some(value) = lookup("ROLEBIND_ASSIGNMENT_STRATEGY") {
            rbac.assignment_strategy = value.parse()?;
        }
        if let Some(value) = lookup("ROLEBIND_KEY_STORAGE") {
            rbac.key_storage = value.parse()?;
        }
        if let Some(secret) = lookup("ROLEBIND_KEY_SECRET") {
            rbac.key_secret = secret;
        }
        rbac.retry_attempts = parse_or(&lookup, "ROLEBIND_RETRY_ATTEMPTS", rbac.retry_attempts)?;
        rbac.retry_backoff_ms =
            parse_or(&lookup, "ROLEBIND_RETRY_BACKOFF_MS", rbac.retry_backoff_ms)?;

        let multitenancy = &mut rbac.multitenancy;
        multitenancy.enabled =
            parse_bool_or(&lookup, "ROLEBIND_MULTITENANCY", multitenancy.enabled)?;
        if let Some(column) = lookup("ROLEBIND_TENANT_COLUMN") {
            multitenancy.tenant_column = column;
        }
        multitenancy.auto_scope =
            parse_bool_or(&lookup, "ROLEBIND_AUTO_SCOPE", multitenancy.auto_scope)?;
        multitenancy.cache_per_tenant = parse_bool_or(
            &lookup,
            "ROLEBIND_CACHE_PER_TENANT",
            multitenancy.cache_per_tenant,
        )?;

        let cache = &mut rbac.cache;
        cache.enabled = parse_bool_or(&lookup, "ROLEBIND_CACHE_ENABLED", cache.enabled)?;
        cache.ttl_seconds = parse_or(&lookup, "ROLEBIND_CACHE_TTL_SECONDS", cache.ttl_seconds)?;
        cache.role_check_ttl_seconds = parse_optional(&lookup, "ROLEBIND_ROLE_CHECK_TTL_SECONDS")?
            .or(cache.role_check_ttl_seconds);
        cache.participants_ttl_seconds =
            parse_optional(&lookup, "ROLEBIND_PARTICIPANTS_TTL_SECONDS")?
                .or(cache.participants_ttl_seconds);
        cache.assigned_entities_ttl_seconds =
            parse_optional(&lookup, "ROLEBIND_ASSIGNED_ENTITIES_TTL_SECONDS")?
                .or(cache.assigned_entities_ttl_seconds);
        if let Some(prefix) = lookup("ROLEBIND_CACHE_PREFIX") {
            cache.key_prefix = prefix;
        }
        cache.use_tags = parse_bool_or(&lookup, "ROLEBIND_CACHE_USE_TAGS", cache.use_tags)?;

        rbac.validate()?;

        let roles = match lookup("ROLEBIND_ROLES") {
            Some(raw) => parse_roles(raw.as_str())?,
            None => Vec::new(),
        };

        let encryption_key = lookup("ROLEBIND_KEY_ENCRYPTION_KEY");
        if rbac.key_storage == KeyStorage::Encrypted && encryption_key.is_none() {
            return Err(AppError::Validation(
                "ROLEBIND_KEY_ENCRYPTION_KEY is required for 'encrypted' key storage".to_owned(),
            ));
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL"),
            redis_url: lookup("ROLEBIND_REDIS_URL"),
            encryption_key,
            rbac,
            roles,
        })
    }

    pub fn required_database_url(&self) -> AppResult<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))
    }

    pub fn role_registry(&self) -> AppResult<RoleRegistry> {
        let codec = match self.rbac.key_storage {
            KeyStorage::Plain => RoleKeyCodec::plain(),
            KeyStorage::Hashed => RoleKeyCodec::hashed(self.rbac.key_secret.as_str())?,
            KeyStorage::Encrypted => {
                let key = self.encryption_key.as_deref().ok_or_else(|| {
                    AppError::Validation("ROLEBIND_KEY_ENCRYPTION_KEY is required".to_owned())
                })?;
                RoleKeyCodec::encrypted(Arc::new(AesRoleKeyCipher::from_hex(key)?))
            }
        };

        let roles = self
            .roles
            .iter()
            .cloned()
            .map(RoleDefinition::into_identity)
            .collect::<AppResult<Vec<_>>>()?;

        RoleRegistry::new(roles, codec)
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_roles(raw: &str) -> AppResult<Vec<RoleDefinition>> {
    serde_json::from_str(raw)
        .map_err(|error| AppError::Validation(format!("invalid ROLEBIND_ROLES json: {error}")))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_optional<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value.parse::<T>().map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            })
        })
        .transpose()
}

fn parse_bool_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> AppResult<bool> {
    match lookup(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "TRUE" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "no") => Ok(false),
        Some(other) => Err(AppError::Validation(format!(
            "invalid {name} value '{other}': expected true or false"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rolebind_domain::{AssignmentStrategy, IdStrategy, KeyStorage};

    use super::AdminConfig;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AdminConfig, String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();

        AdminConfig::from_lookup(|name| values.get(name).cloned())
            .map_err(|error| error.to_string())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = config_from(&[]);
        assert!(config.is_ok());

        let config = config.unwrap_or_else(|_| unreachable!());
        assert_eq!(config.rbac.table_name, "model_has_roles");
        assert_eq!(config.rbac.retry_attempts, 3);
        assert!(config.roles.is_empty());
        assert!(config.required_database_url().is_err());
    }

    #[test]
    fn reads_strategies_and_roles() {
        let config = config_from(&[
            ("ROLEBIND_ID_STRATEGY", "uuid"),
            ("ROLEBIND_ASSIGNMENT_STRATEGY", "add"),
            ("ROLEBIND_MULTITENANCY", "true"),
            (
                "ROLEBIND_ROLES",
                r#"[{"name":"viewer","level":10},{"name":"owner","level":90,"label":"Owner"}]"#,
            ),
        ])
        .unwrap_or_else(|error| panic!("{error}"));

        assert_eq!(config.rbac.id_strategy, IdStrategy::Uuid);
        assert_eq!(config.rbac.assignment_strategy, AssignmentStrategy::Add);
        assert!(config.rbac.multitenancy.enabled);

        let registry = config
            .role_registry()
            .unwrap_or_else(|error| panic!("{error}"));
        assert_eq!(registry.highest().map(|role| role.label()), Some("Owner"));
    }

    #[test]
    fn reads_cache_scoping_and_ttl_overrides() {
        let config = config_from(&[
            ("ROLEBIND_CACHE_PER_TENANT", "false"),
            ("ROLEBIND_CACHE_TTL_SECONDS", "600"),
            ("ROLEBIND_ROLE_CHECK_TTL_SECONDS", "30"),
            ("ROLEBIND_PARTICIPANTS_TTL_SECONDS", "120"),
            ("ROLEBIND_ASSIGNED_ENTITIES_TTL_SECONDS", "240"),
            ("ROLEBIND_RETRY_BACKOFF_MS", "5"),
        ])
        .unwrap_or_else(|error| panic!("{error}"));

        assert!(!config.rbac.multitenancy.cache_per_tenant);
        assert_eq!(config.rbac.cache.ttl_seconds, 600);
        assert_eq!(config.rbac.cache.role_check_ttl_seconds, Some(30));
        assert_eq!(config.rbac.cache.participants_ttl_seconds, Some(120));
        assert_eq!(config.rbac.cache.assigned_entities_ttl_seconds, Some(240));
        assert_eq!(config.rbac.retry_backoff_ms, 5);

        let defaults = config_from(&[]).unwrap_or_else(|error| panic!("{error}"));
        assert!(defaults.rbac.multitenancy.cache_per_tenant);
        assert_eq!(defaults.rbac.cache.role_check_ttl_seconds, None);
        assert!(config_from(&[("ROLEBIND_PARTICIPANTS_TTL_SECONDS", "soon")]).is_err());
    }

    #[test]
    fn hashed_storage_requires_secret() {
        assert!(config_from(&[("ROLEBIND_KEY_STORAGE", "hashed")]).is_err());
        assert!(
            config_from(&[
                ("ROLEBIND_KEY_STORAGE", "hashed"),
                ("ROLEBIND_KEY_SECRET", "pepper"),
            ])
            .is_ok()
        );
    }

    #[test]
    fn encrypted_storage_requires_cipher_key() {
        assert!(config_from(&[("ROLEBIND_KEY_STORAGE", "encrypted")]).is_err());

        let key = "11".repeat(32);
        let config = config_from(&[
            ("ROLEBIND_KEY_STORAGE", "encrypted"),
            ("ROLEBIND_KEY_ENCRYPTION_KEY", key.as_str()),
            ("ROLEBIND_ROLES", r#"[{"name":"viewer","level":10}]"#),
        ])
        .unwrap_or_else(|error| panic!("{error}"));

        let registry = config
            .role_registry()
            .unwrap_or_else(|error| panic!("{error}"));
        assert_eq!(registry.key_storage(), KeyStorage::Encrypted);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(config_from(&[("ROLEBIND_RETRY_ATTEMPTS", "many")]).is_err());
        assert!(config_from(&[("ROLEBIND_CACHE_USE_TAGS", "maybe")]).is_err());
        assert!(config_from(&[("ROLEBIND_ROLES", "{not json")]).is_err());

        let duplicate_levels = config_from(&[(
            "ROLEBIND_ROLES",
            r#"[{"name":"a","level":1},{"name":"b","level":1}]"#,
        )])
        .unwrap_or_else(|error| panic!("{error}"));
        assert!(duplicate_levels.role_registry().is_err());
    }
}
