use rolebind_core::{AppResult, EntityRef, TenantKey};

/// Capability of an entity that can hold roles (a user, a team).
pub trait Assignable: Send + Sync {
    /// Returns the polymorphic identity of the holder.
    fn assignable_ref(&self) -> EntityRef;

    /// Returns the tenant the holder is currently acting in.
    fn current_tenant_key(&self) -> Option<TenantKey> {
        None
    }
}

/// Capability of an entity on which roles are held (a project, an organization).
pub trait Roleable: Send + Sync {
    /// Returns the polymorphic identity of the target.
    fn roleable_ref(&self) -> EntityRef;

    /// Returns the tenant the target belongs to.
    fn tenant_key(&self) -> Option<TenantKey> {
        None
    }

    /// Returns whether the target is itself a tenant.
    fn is_tenant_entity(&self) -> bool {
        false
    }

    /// Tenant key used for policy checks: a tenant entity is its own tenant.
    fn effective_tenant_key(&self) -> Option<TenantKey> {
        if self.is_tenant_entity() {
            return TenantKey::new(self.roleable_ref().entity_id()).ok();
        }

        self.tenant_key()
    }
}

/// Plain entity handle implementing both capabilities.
///
/// Useful when callers only know the type tag, identity and tenant of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    entity: EntityRef,
    tenant: Option<TenantKey>,
    is_tenant_entity: bool,
}

impl EntityHandle {
    /// Creates a handle outside any tenant.
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            entity: EntityRef::new(entity_type, entity_id)?,
            tenant: None,
            is_tenant_entity: false,
        })
    }

    /// Scopes the handle to a tenant.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> AppResult<Self> {
        self.tenant = Some(TenantKey::new(tenant)?);
        Ok(self)
    }

    /// Marks the handle as a tenant entity.
    #[must_use]
    pub fn as_tenant_entity(mut self) -> Self {
        self.is_tenant_entity = true;
        self
    }

    /// Returns the wrapped reference.
    #[must_use]
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }
}

impl From<EntityRef> for EntityHandle {
    fn from(entity: EntityRef) -> Self {
        Self {
            entity,
            tenant: None,
            is_tenant_entity: false,
        }
    }
}

impl Assignable for EntityHandle {
    fn assignable_ref(&self) -> EntityRef {
        self.entity.clone()
    }

    fn current_tenant_key(&self) -> Option<TenantKey> {
        self.tenant.clone()
    }
}

impl Roleable for EntityHandle {
    fn roleable_ref(&self) -> EntityRef {
        self.entity.clone()
    }

    fn tenant_key(&self) -> Option<TenantKey> {
        self.tenant.clone()
    }

    fn is_tenant_entity(&self) -> bool {
        self.is_tenant_entity
    }
}

#[cfg(test)]
mod tests {
    use rolebind_core::{AppResult, TenantKey};

    use super::{EntityHandle, Roleable};

    #[test]
    fn tenant_entity_uses_its_identity_as_tenant() -> AppResult<()> {
        let organization = EntityHandle::new("organization", "123")?.as_tenant_entity();
        let tenant = organization.effective_tenant_key();
        assert_eq!(tenant.as_ref().map(TenantKey::as_str), Some("123"));
        Ok(())
    }

    #[test]
    fn ordinary_roleable_uses_declared_tenant() -> AppResult<()> {
        let project = EntityHandle::new("project", "p1")?.with_tenant("org_1")?;
        let tenant = project.effective_tenant_key();
        assert_eq!(tenant.as_ref().map(TenantKey::as_str), Some("org_1"));
        Ok(())
    }
}
