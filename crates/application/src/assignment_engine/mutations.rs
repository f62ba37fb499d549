use rolebind_domain::NewAssignment;

use super::*;

impl AssignmentEngine {
    /// Binds `role` to the pair, applying tenant integrity rules and the
    /// configured assignment strategy.
    ///
    /// Under `replace`, roles previously held on the pair are removed in the
    /// same transaction. Re-assigning a held role is a no-op.
    pub async fn assign<'r>(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
        role: impl Into<RoleRef<'r>>,
    ) -> AppResult<AssignOutcome> {
        let registry = self.registry()?;
        let role = Self::resolve_role(&registry, role.into())?;
        let context = self.binding_context(assignable, roleable);
        self.check_tenant_integrity(&context)?;

        self.assign_resolved(&registry, &context, &role).await
    }

    /// Deletes every role the assignable entity holds on the roleable entity.
    ///
    /// Idempotent: returns an empty list when nothing was bound.
    pub async fn remove(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
    ) -> AppResult<Vec<Assignment>> {
        let registry = self.registry()?;
        let context = self.binding_context(assignable, roleable);
        let pair = &context.pair;

        let removed = self
            .with_retry("remove", || self.repository.remove_all(pair))
            .await?;

        for assignment in &removed {
            self.publish(RoleEvent::Removed(Self::binding(&registry, assignment)))
                .await;
        }

        if !removed.is_empty() {
            info!(
                assignable = %context.pair.assignable,
                roleable = %context.pair.roleable,
                removed = removed.len(),
                "roles removed"
            );
        }

        self.invalidate_pair(&registry, &context, &removed).await;
        Ok(removed)
    }

    /// Changes the role held on the pair, assigning it when none is held.
    ///
    /// Observable as `Removed(old)` followed by `Assigned(new)`.
    pub async fn change_role_on<'r>(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
        new_role: impl Into<RoleRef<'r>>,
    ) -> AppResult<Assignment> {
        let registry = self.registry()?;
        let role = Self::resolve_role(&registry, new_role.into())?;
        let context = self.binding_context(assignable, roleable);
        self.check_tenant_integrity(&context)?;

        let role_key = registry.storage_key(role.name())?;
        let tenant = self.row_tenant(&context);
        let pair = &context.pair;

        let outcome = self
            .with_retry("change_role", || {
                self.repository.change_role(pair, role_key, tenant.clone())
            })
            .await?;

        match outcome {
            ChangeOutcome::Missing => {
                let assigned = self.assign_resolved(&registry, &context, &role).await?;
                Ok(assigned.assignment)
            }
            ChangeOutcome::Unchanged(current) => Ok(current),
            ChangeOutcome::Changed { previous, current } => {
                self.publish(RoleEvent::Removed(Self::binding(&registry, &previous)))
                    .await;
                self.publish(RoleEvent::Assigned(RoleBinding {
                    assignable: current.pair.assignable.clone(),
                    roleable: current.pair.roleable.clone(),
                    role_key: current.role_key.clone(),
                    role: Some(role.clone()),
                }))
                .await;

                info!(
                    assignable = %context.pair.assignable,
                    roleable = %context.pair.roleable,
                    role = role.name(),
                    "role changed"
                );

                self.invalidate_pair(&registry, &context, std::slice::from_ref(&previous))
                    .await;
                Ok(current)
            }
        }
    }

    /// Clears every derived cache entry of one pair.
    pub async fn clear_cache_for(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
    ) -> AppResult<()> {
        let registry = self.registry()?;
        let context = self.binding_context(assignable, roleable);
        self.invalidate_pair(&registry, &context, &[]).await;
        Ok(())
    }

    /// Clears derived caches for many pairs; equivalent to clearing each one.
    pub async fn bulk_clear_cache(&self, targets: &[CacheTarget<'_>]) -> AppResult<()> {
        let registry = self.registry()?;
        let entries: Vec<CacheEntryKey> = targets
            .iter()
            .flat_map(|target| {
                let context = self.binding_context(target.assignable, target.roleable);
                self.pair_cache_entries(&registry, &context)
            })
            .collect();

        self.cache.invalidate(&entries).await;
        Ok(())
    }

    /// Drops every cache entry mentioning the entity. Requires cache tags.
    pub async fn flush_entity_cache(&self, entity: &EntityRef) {
        self.cache.invalidate_entity(entity).await;
    }

    async fn assign_resolved(
        &self,
        registry: &RoleRegistry,
        context: &BindingContext,
        role: &RoleIdentity,
    ) -> AppResult<AssignOutcome> {
        let assignment = NewAssignment {
            pair: context.pair.clone(),
            role_key: registry.storage_key(role.name())?.to_owned(),
            tenant: self.row_tenant(context),
        };
        let strategy = self.strategy;
        let repository = &self.repository;

        let outcome = self
            .with_retry("assign", || repository.assign(assignment.clone(), strategy))
            .await?;

        for replaced in &outcome.replaced {
            self.publish(RoleEvent::Removed(Self::binding(registry, replaced)))
                .await;
        }

        if outcome.created {
            self.publish(RoleEvent::Assigned(RoleBinding {
                assignable: context.pair.assignable.clone(),
                roleable: context.pair.roleable.clone(),
                role_key: outcome.assignment.role_key.clone(),
                role: Some(role.clone()),
            }))
            .await;

            info!(
                assignable = %context.pair.assignable,
                roleable = %context.pair.roleable,
                role = role.name(),
                strategy = strategy.as_str(),
                "role assigned"
            );
        }

        self.invalidate_pair(registry, context, &outcome.replaced)
            .await;
        Ok(outcome)
    }

    fn row_tenant(&self, context: &BindingContext) -> Option<TenantKey> {
        if !self.multitenancy.enabled {
            return None;
        }

        context
            .assignable_tenant
            .clone()
            .or_else(|| context.roleable_tenant.clone())
    }
}
