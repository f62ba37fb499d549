//! Operator tool for the role assignment store.

#![forbid(unsafe_code)]

mod admin_config;

use std::env;
use std::sync::Arc;

use rolebind_application::{AssignmentEngine, CacheCoordinator, RoleCache};
use rolebind_core::{AppError, AppResult};
use rolebind_domain::{EntityHandle, RoleRegistry};
use rolebind_infrastructure::{
    AssignmentTableSchema, InMemoryRoleCache, PostgresAssignmentRepository, RedisRoleCache,
    TracingRoleEventPublisher,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::admin_config::{AdminConfig, init_tracing};

const USAGE: &str = "usage: rolebind-admin <migrate | roles | assign <holder> <target> <role> | \
                     remove <holder> <target> | show <holder> <target>>\n\
                     entities are written as type:id or type:id@tenant";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Migrate,
    Roles,
    Assign {
        holder: String,
        target: String,
        role: String,
    },
    Remove {
        holder: String,
        target: String,
    },
    Show {
        holder: String,
        target: String,
    },
}

impl Command {
    fn parse(arguments: &[String]) -> AppResult<Self> {
        let arguments: Vec<&str> = arguments.iter().map(String::as_str).collect();
        match arguments.as_slice() {
            ["migrate"] => Ok(Self::Migrate),
            ["roles"] => Ok(Self::Roles),
            ["assign", holder, target, role] => Ok(Self::Assign {
                holder: (*holder).to_owned(),
                target: (*target).to_owned(),
                role: (*role).to_owned(),
            }),
            ["remove", holder, target] => Ok(Self::Remove {
                holder: (*holder).to_owned(),
                target: (*target).to_owned(),
            }),
            ["show", holder, target] => Ok(Self::Show {
                holder: (*holder).to_owned(),
                target: (*target).to_owned(),
            }),
            _ => Err(AppError::Validation(USAGE.to_owned())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let arguments: Vec<String> = env::args().skip(1).collect();
    let command = Command::parse(&arguments)?;
    let config = AdminConfig::load()?;

    match command {
        Command::Migrate => {
            let pool = connect_pool(config.required_database_url()?).await?;
            AssignmentTableSchema::from_config(&config.rbac)?
                .ensure(&pool)
                .await?;
            info!(table = %config.rbac.table_name, "migration finished");
        }
        Command::Roles => print_roles(&config.role_registry()?)?,
        Command::Assign {
            holder,
            target,
            role,
        } => {
            let engine = build_engine(&config).await?;
            let outcome = engine
                .assign(&parse_entity(&holder)?, &parse_entity(&target)?, &role)
                .await?;
            println!(
                "{} {} on {} ({} displaced)",
                if outcome.created { "assigned" } else { "already held" },
                role,
                target,
                outcome.replaced.len()
            );
        }
        Command::Remove { holder, target } => {
            let engine = build_engine(&config).await?;
            let removed = engine
                .remove(&parse_entity(&holder)?, &parse_entity(&target)?)
                .await?;
            let count = removed.len();
            println!("removed {count} binding(s) of {holder} on {target}");
        }
        Command::Show { holder, target } => {
            let engine = build_engine(&config).await?;
            let roles = engine
                .get_roles_on(&parse_entity(&holder)?, &parse_entity(&target)?)
                .await?;
            if roles.is_empty() {
                println!("{holder} holds no role on {target}");
            }
            for role in roles {
                println!("{:>6}  {}", role.level(), role.name());
            }
        }
    }

    Ok(())
}

fn print_roles(registry: &RoleRegistry) -> AppResult<()> {
    if registry.is_empty() {
        println!("no roles registered; set ROLEBIND_ROLES");
        return Ok(());
    }

    for role in registry.all().collect::<Vec<_>>().into_iter().rev() {
        println!(
            "{:>6}  {:<20} {:<24} {}",
            role.level(),
            role.name(),
            role.label(),
            registry.storage_key(role.name())?
        );
    }

    Ok(())
}

/// Parses `type:id` or `type:id@tenant` into an entity handle.
fn parse_entity(value: &str) -> AppResult<EntityHandle> {
    let (reference, tenant) = match value.split_once('@') {
        Some((reference, tenant)) => (reference, Some(tenant)),
        None => (value, None),
    };

    let (entity_type, entity_id) = reference.split_once(':').ok_or_else(|| {
        AppError::Validation(format!("entity '{value}' must be written as type:id"))
    })?;

    let handle = EntityHandle::new(entity_type, entity_id)?;
    match tenant {
        Some(tenant) => handle.with_tenant(tenant),
        None => Ok(handle),
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to connect to database: {error}")))
}

async fn build_engine(config: &AdminConfig) -> AppResult<AssignmentEngine> {
    let pool = connect_pool(config.required_database_url()?).await?;
    let schema = AssignmentTableSchema::from_config(&config.rbac)?;
    let repository = Arc::new(PostgresAssignmentRepository::new(pool, schema));

    let cache: Arc<dyn RoleCache> = match config.redis_url.as_deref() {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url).map_err(|error| {
                AppError::Validation(format!("invalid ROLEBIND_REDIS_URL: {error}"))
            })?;
            Arc::new(RedisRoleCache::new(client))
        }
        None => Arc::new(InMemoryRoleCache::new()),
    };
    let multitenancy = &config.rbac.multitenancy;
    let coordinator = CacheCoordinator::new(
        cache,
        config.rbac.cache.clone(),
        multitenancy.enabled && multitenancy.cache_per_tenant,
    );

    AssignmentEngine::new(
        &config.rbac,
        config.role_registry()?,
        repository,
        coordinator,
        Arc::new(TracingRoleEventPublisher::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::{Command, parse_entity};

    fn arguments(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn parses_commands() {
        let migrate = Command::parse(&arguments(&["migrate"]));
        assert_eq!(migrate.ok(), Some(Command::Migrate));
        assert_eq!(
            Command::parse(&arguments(&["assign", "user:1", "project:2", "editor"])).ok(),
            Some(Command::Assign {
                holder: "user:1".to_owned(),
                target: "project:2".to_owned(),
                role: "editor".to_owned(),
            })
        );
        assert!(Command::parse(&arguments(&["assign", "user:1"])).is_err());
        assert!(Command::parse(&arguments(&[])).is_err());
    }

    #[test]
    fn parses_entities_with_optional_tenant() {
        let plain = parse_entity("user:42");
        assert!(plain.is_ok_and(|handle| handle.entity().entity_id() == "42"));

        assert!(parse_entity("project:7@org_1").is_ok());
        assert!(parse_entity("no-separator").is_err());
        assert!(parse_entity("user:").is_err());
    }
}
