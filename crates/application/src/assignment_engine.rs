use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rolebind_core::{AppError, AppResult, EntityRef, TenantKey};
use rolebind_domain::{
    Assignable, Assignment, AssignmentPair, AssignmentStrategy, RoleBinding, RoleEvent,
    RoleIdentity, RoleRegistry, Roleable, TenantPolicyInput, evaluate_tenant_policy,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    AssignOutcome, AssignmentRepository, CacheCoordinator, CacheEntryKey, ChangeOutcome,
    MultitenancyConfig, RbacConfig, RoleEventPublisher,
};

mod mutations;
mod queries;


/// Role argument accepted by engine operations: a name, a stored key or a definition.
#[derive(Debug, Clone, Copy)]
pub enum RoleRef<'a> {
    /// Role name or stored key.
    Name(&'a str),
    /// Role definition; must be registered.
    Identity(&'a RoleIdentity),
}

impl<'a> From<&'a str> for RoleRef<'a> {
    fn from(value: &'a str) -> Self {
        Self::Name(value)
    }
}

impl<'a> From<&'a String> for RoleRef<'a> {
    fn from(value: &'a String) -> Self {
        Self::Name(value.as_str())
    }
}

impl<'a> From<&'a RoleIdentity> for RoleRef<'a> {
    fn from(value: &'a RoleIdentity) -> Self {
        Self::Identity(value)
    }
}

/// Holder of a role on a roleable entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Holder.
    pub assignable: EntityRef,
    /// Role held.
    pub role: RoleIdentity,
}

/// Pair whose derived caches should be cleared.
#[derive(Clone, Copy)]
pub struct CacheTarget<'a> {
    /// Holder side.
    pub assignable: &'a dyn Assignable,
    /// Target side.
    pub roleable: &'a dyn Roleable,
}

/// Cached projection of one row: who holds which stored key on what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HeldRole {
    entity: EntityRef,
    role_key: String,
}

/// Pair plus the tenant keys resolved from both entities at call time.
#[derive(Debug, Clone)]
struct BindingContext {
    pair: AssignmentPair,
    assignable_tenant: Option<TenantKey>,
    roleable_tenant: Option<TenantKey>,
    roleable_is_tenant_entity: bool,
}

/// Orchestrates role assignment, removal, change and role queries.
///
/// Construct one per process and share it; clones share the registry.
#[derive(Clone)]
pub struct AssignmentEngine {
    registry: Arc<RwLock<Arc<RoleRegistry>>>,
    repository: Arc<dyn AssignmentRepository>,
    cache: CacheCoordinator,
    events: Arc<dyn RoleEventPublisher>,
    strategy: AssignmentStrategy,
    multitenancy: MultitenancyConfig,
    retry_attempts: u32,
    retry_backoff_ms: u64,
}

impl AssignmentEngine {
    /// Creates an engine from validated configuration and its collaborators.
    pub fn new(
        config: &RbacConfig,
        registry: RoleRegistry,
        repository: Arc<dyn AssignmentRepository>,
        cache: CacheCoordinator,
        events: Arc<dyn RoleEventPublisher>,
    ) -> AppResult<Self> {
        config.validate()?;

        if registry.key_storage() != config.key_storage {
            return Err(AppError::Validation(format!(
                "registry uses '{}' key storage but configuration requests '{}'",
                registry.key_storage().as_str(),
                config.key_storage.as_str()
            )));
        }

        Ok(Self {
            registry: Arc::new(RwLock::new(Arc::new(registry))),
            repository,
            cache,
            events,
            strategy: config.assignment_strategy,
            multitenancy: config.multitenancy.clone(),
            retry_attempts: config.retry_attempts,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    /// Returns the current registry snapshot.
    pub fn registry(&self) -> AppResult<Arc<RoleRegistry>> {
        self.registry
            .read()
            .map(|registry| Arc::clone(&*registry))
            .map_err(|_| AppError::Internal("role registry lock is poisoned".to_owned()))
    }

    /// Replaces the registry. Stored keys of removed roles stay in storage and
    /// resolve to nothing until the role is registered again.
    pub fn refresh_registry(&self, registry: RoleRegistry) -> AppResult<()> {
        let current_storage = self.registry()?.key_storage();
        if registry.key_storage() != current_storage {
            return Err(AppError::Validation(format!(
                "refreshed registry must keep '{}' key storage",
                current_storage.as_str()
            )));
        }

        let role_count = registry.len();
        let mut guard = self
            .registry
            .write()
            .map_err(|_| AppError::Internal("role registry lock is poisoned".to_owned()))?;
        *guard = Arc::new(registry);

        info!(role_count, "role registry refreshed");
        Ok(())
    }

    fn resolve_role(registry: &RoleRegistry, role: RoleRef<'_>) -> AppResult<RoleIdentity> {
        match role {
            RoleRef::Name(name_or_key) => registry
                .resolve(name_or_key)
                .cloned()
                .ok_or_else(|| {
                    AppError::RoleNotFound(format!("role '{name_or_key}' is not registered"))
                }),
            RoleRef::Identity(identity) => registry.by_name(identity.name()).cloned(),
        }
    }

    fn binding_context(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
    ) -> BindingContext {
        let (assignable_tenant, roleable_tenant) = if self.multitenancy.enabled {
            (
                assignable.current_tenant_key(),
                roleable.effective_tenant_key(),
            )
        } else {
            (None, None)
        };

        BindingContext {
            pair: AssignmentPair::new(assignable.assignable_ref(), roleable.roleable_ref()),
            assignable_tenant,
            roleable_tenant,
            roleable_is_tenant_entity: roleable.is_tenant_entity(),
        }
    }

    fn check_tenant_integrity(&self, context: &BindingContext) -> AppResult<()> {
        evaluate_tenant_policy(TenantPolicyInput {
            enabled: self.multitenancy.enabled,
            assignable_tenant: context.assignable_tenant.as_ref().map(TenantKey::as_str),
            roleable_tenant: context.roleable_tenant.as_ref().map(TenantKey::as_str),
            roleable_is_tenant_entity: context.roleable_is_tenant_entity,
        })
        .map_err(|violation| {
            warn!(
                assignable = %context.pair.assignable,
                roleable = %context.pair.roleable,
                violation = %violation,
                "assignment rejected by tenant policy"
            );
            AppError::TenantIntegrity(violation)
        })
    }

    fn read_scope<'a>(&self, tenant: Option<&'a TenantKey>) -> Option<&'a TenantKey> {
        if self.multitenancy.enabled && self.multitenancy.auto_scope {
            tenant
        } else {
            None
        }
    }

    /// Every cache entry a mutation on the pair can make stale.
    fn pair_cache_entries(
        &self,
        registry: &RoleRegistry,
        context: &BindingContext,
    ) -> Vec<CacheEntryKey> {
        let assignable = &context.pair.assignable;
        let roleable = &context.pair.roleable;
        let assignable_tenant = context.assignable_tenant.as_ref();

        let mut entries = vec![
            self.cache
                .participants_key(roleable, context.roleable_tenant.as_ref()),
            self.cache.assigned_entities_key(
                assignable,
                roleable.entity_type(),
                assignable_tenant,
            ),
            self.cache
                .pair_roles_key(assignable, roleable, assignable_tenant),
        ];
        entries.extend(registry.all().map(|role| {
            self.cache
                .role_check_key(assignable, roleable, role.name(), assignable_tenant)
        }));

        entries
    }

    /// Invalidates the pair for the caller's tenant context and for every
    /// tenant the affected rows were written under.
    async fn invalidate_pair(
        &self,
        registry: &RoleRegistry,
        context: &BindingContext,
        affected: &[Assignment],
    ) {
        if !self.cache.is_enabled() {
            return;
        }

        let mut entries = self.pair_cache_entries(registry, context);
        let mut row_tenants: Vec<Option<&TenantKey>> = Vec::new();
        for assignment in affected {
            let tenant = assignment.tenant.as_ref();
            if !row_tenants.contains(&tenant) {
                row_tenants.push(tenant);
            }
        }

        for tenant in row_tenants {
            let row_context = BindingContext {
                pair: context.pair.clone(),
                assignable_tenant: tenant.cloned(),
                roleable_tenant: tenant.cloned(),
                roleable_is_tenant_entity: context.roleable_is_tenant_entity,
            };
            for entry in self.pair_cache_entries(registry, &row_context) {
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }

        self.cache.invalidate(&entries).await;
    }

    async fn publish(&self, event: RoleEvent) {
        let name = event.as_str();
        if let Err(error) = self.events.publish(event).await {
            warn!(event = name, error = %error, "failed to publish role event");
        }
    }

    fn binding(registry: &RoleRegistry, assignment: &Assignment) -> RoleBinding {
        RoleBinding {
            assignable: assignment.pair.assignable.clone(),
            roleable: assignment.pair.roleable.clone(),
            role_key: assignment.role_key.clone(),
            role: registry.by_key(assignment.role_key.as_str()).cloned(),
        }
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error or
    /// exhausts the configured attempts.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt_number = 1;
        loop {
            match attempt().await {
                Err(error) if error.is_retryable() && attempt_number < self.retry_attempts => {
                    warn!(
                        operation,
                        attempt = attempt_number,
                        max_attempts = self.retry_attempts,
                        error = %error,
                        "retrying role assignment operation"
                    );
                    let delay = u64::from(attempt_number).saturating_mul(self.retry_backoff_ms);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt_number += 1;
                }
                result => return result,
            }
        }
    }
}
