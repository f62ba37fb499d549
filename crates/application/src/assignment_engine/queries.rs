use super::*;

impl AssignmentEngine {
    /// Returns whether the pair holds `role`.
    ///
    /// An unresolvable role yields `false` rather than an error.
    pub async fn has_role_on<'r>(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
        role: impl Into<RoleRef<'r>>,
    ) -> AppResult<bool> {
        let registry = self.registry()?;
        let Ok(role) = Self::resolve_role(&registry, role.into()) else {
            return Ok(false);
        };

        let context = self.binding_context(assignable, roleable);
        let role_key = registry.storage_key(role.name())?;
        let scope = self.read_scope(context.assignable_tenant.as_ref());
        let pair = &context.pair;
        let entry = self.cache.role_check_key(
            &pair.assignable,
            &pair.roleable,
            role.name(),
            context.assignable_tenant.as_ref(),
        );

        self.cache
            .remember(&entry, || self.repository.exists(pair, role_key, scope))
            .await
    }

    /// Returns whether the pair holds any registered role.
    pub async fn has_any_role_on(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
    ) -> AppResult<bool> {
        Ok(!self.get_roles_on(assignable, roleable).await?.is_empty())
    }

    /// Returns every registered role held on the pair, highest level first.
    pub async fn get_roles_on(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
    ) -> AppResult<Vec<RoleIdentity>> {
        let registry = self.registry()?;
        let context = self.binding_context(assignable, roleable);
        let scope = self.read_scope(context.assignable_tenant.as_ref());
        let pair = &context.pair;
        let entry = self.cache.pair_roles_key(
            &pair.assignable,
            &pair.roleable,
            context.assignable_tenant.as_ref(),
        );

        let role_keys: Vec<String> = self
            .cache
            .remember(&entry, move || async move {
                let rows = self.repository.list_for_pair(pair, scope).await?;
                Ok(rows.into_iter().map(|row| row.role_key).collect())
            })
            .await?;

        let mut roles: Vec<RoleIdentity> = role_keys
            .iter()
            .filter_map(|role_key| registry.by_key(role_key).cloned())
            .collect();
        roles.sort_by(|left, right| right.compare_level(left));
        roles.dedup_by(|left, right| left.name() == right.name());

        Ok(roles)
    }

    /// Returns the highest-level role held on the pair.
    pub async fn get_role_on(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
    ) -> AppResult<Option<RoleIdentity>> {
        Ok(self
            .get_roles_on(assignable, roleable)
            .await?
            .into_iter()
            .next())
    }

    /// Returns whether the pair holds `minimum` or any higher-level role.
    ///
    /// An unresolvable minimum yields `false`.
    pub async fn has_role_at_least_on<'r>(
        &self,
        assignable: &dyn Assignable,
        roleable: &dyn Roleable,
        minimum: impl Into<RoleRef<'r>>,
    ) -> AppResult<bool> {
        let registry = self.registry()?;
        let Ok(minimum) = Self::resolve_role(&registry, minimum.into()) else {
            return Ok(false);
        };

        Ok(self
            .get_role_on(assignable, roleable)
            .await?
            .is_some_and(|held| held.is_at_least(&minimum)))
    }

    /// Lists holders of any registered role on `roleable`, in binding order.
    pub async fn get_participants_with_roles(
        &self,
        roleable: &dyn Roleable,
    ) -> AppResult<Vec<Participant>> {
        let registry = self.registry()?;
        let held = self.participants(roleable).await?;

        Ok(held
            .into_iter()
            .filter_map(|held| {
                let role = registry.by_key(held.role_key.as_str())?;
                Some(Participant {
                    assignable: held.entity,
                    role: role.clone(),
                })
            })
            .collect())
    }

    /// Lists holders of `role` on `roleable`. An unresolvable role has no holders.
    pub async fn get_participants_has_role<'r>(
        &self,
        roleable: &dyn Roleable,
        role: impl Into<RoleRef<'r>>,
    ) -> AppResult<Vec<EntityRef>> {
        let registry = self.registry()?;
        let Ok(role) = Self::resolve_role(&registry, role.into()) else {
            return Ok(Vec::new());
        };
        let role_key = registry.storage_key(role.name())?;

        let held = self.participants(roleable).await?;
        Ok(held
            .into_iter()
            .filter(|held| held.role_key == role_key)
            .map(|held| held.entity)
            .collect())
    }

    /// Lists roleable entities of `roleable_type` on which `assignable` holds a
    /// registered role, sorted and without duplicates.
    pub async fn get_assigned_entities_by_type(
        &self,
        assignable: &dyn Assignable,
        roleable_type: &str,
    ) -> AppResult<Vec<EntityRef>> {
        let registry = self.registry()?;
        let held = self.assigned_entities(assignable, roleable_type).await?;

        let mut entities: Vec<EntityRef> = held
            .into_iter()
            .filter(|held| registry.by_key(held.role_key.as_str()).is_some())
            .map(|held| held.entity)
            .collect();
        entities.sort();
        entities.dedup();

        Ok(entities)
    }

    /// Lists roleable entities of `roleable_type` on which `assignable` holds `role`.
    pub async fn get_assigned_entities_by_type_and_role<'r>(
        &self,
        assignable: &dyn Assignable,
        roleable_type: &str,
        role: impl Into<RoleRef<'r>>,
    ) -> AppResult<Vec<EntityRef>> {
        let registry = self.registry()?;
        let Ok(role) = Self::resolve_role(&registry, role.into()) else {
            return Ok(Vec::new());
        };
        let role_key = registry.storage_key(role.name())?;

        let held = self.assigned_entities(assignable, roleable_type).await?;
        let mut entities: Vec<EntityRef> = held
            .into_iter()
            .filter(|held| held.role_key == role_key)
            .map(|held| held.entity)
            .collect();
        entities.sort();
        entities.dedup();

        Ok(entities)
    }

    /// Lists every stored row held by `assignable`, including rows whose role
    /// is no longer registered. Never cached.
    pub async fn get_assignments_for(
        &self,
        assignable: &dyn Assignable,
    ) -> AppResult<Vec<Assignment>> {
        let assignable_ref = assignable.assignable_ref();
        let tenant = if self.multitenancy.enabled {
            assignable.current_tenant_key()
        } else {
            None
        };

        self.repository
            .list_for_assignable(&assignable_ref, None, self.read_scope(tenant.as_ref()))
            .await
    }

    async fn participants(&self, roleable: &dyn Roleable) -> AppResult<Vec<HeldRole>> {
        let roleable_ref = roleable.roleable_ref();
        let tenant = if self.multitenancy.enabled {
            roleable.effective_tenant_key()
        } else {
            None
        };
        let scope = self.read_scope(tenant.as_ref());
        let entry = self.cache.participants_key(&roleable_ref, tenant.as_ref());
        let roleable_ref = &roleable_ref;

        self.cache
            .remember(&entry, move || async move {
                let rows = self
                    .repository
                    .list_for_roleable(roleable_ref, scope)
                    .await?;
                Ok(rows
                    .into_iter()
                    .map(|row| HeldRole {
                        entity: row.pair.assignable,
                        role_key: row.role_key,
                    })
                    .collect())
            })
            .await
    }

    async fn assigned_entities(
        &self,
        assignable: &dyn Assignable,
        roleable_type: &str,
    ) -> AppResult<Vec<HeldRole>> {
        let assignable_ref = assignable.assignable_ref();
        let tenant = if self.multitenancy.enabled {
            assignable.current_tenant_key()
        } else {
            None
        };
        let scope = self.read_scope(tenant.as_ref());
        let entry = self
            .cache
            .assigned_entities_key(&assignable_ref, roleable_type, tenant.as_ref());
        let assignable_ref = &assignable_ref;

        self.cache
            .remember(&entry, move || async move {
                let rows = self
                    .repository
                    .list_for_assignable(assignable_ref, Some(roleable_type), scope)
                    .await?;
                Ok(rows
                    .into_iter()
                    .map(|row| HeldRole {
                        entity: row.pair.roleable,
                        role_key: row.role_key,
                    })
                    .collect())
            })
            .await
    }
}
