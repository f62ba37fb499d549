use super::*;

impl PostgresAssignmentRepository {
    pub(super) async fn exists_impl(
        &self,
        pair: &AssignmentPair,
        role_key: &str,
        tenant: Option<&TenantKey>,
    ) -> AppResult<bool> {
        self.validate_pair(pair)?;

        let tenant_filter = self.tenant_predicate(tenant, 6).unwrap_or_default();
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} AND role_key = $5{tenant_filter})",
            self.table(),
            self.pair_predicate()
        );

        let mut query = sqlx::query_scalar::<_, bool>(sql.as_str())
            .bind(pair.assignable.entity_type())
            .bind(pair.assignable.entity_id())
            .bind(pair.roleable.entity_type())
            .bind(pair.roleable.entity_id())
            .bind(role_key);
        if !tenant_filter.is_empty() {
            query = query.bind(tenant.map(TenantKey::as_str));
        }

        query
            .fetch_one(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("failed to check role assignment", error))
    }

    pub(super) async fn list_for_pair_impl(
        &self,
        pair: &AssignmentPair,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>> {
        self.validate_pair(pair)?;

        let tenant_filter = self.tenant_predicate(tenant, 5).unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM {} WHERE {}{tenant_filter} ORDER BY id",
            self.returning,
            self.table(),
            self.pair_predicate()
        );

        let mut query = sqlx::query_as::<_, AssignmentRow>(sql.as_str())
            .bind(pair.assignable.entity_type())
            .bind(pair.assignable.entity_id())
            .bind(pair.roleable.entity_type())
            .bind(pair.roleable.entity_id());
        if !tenant_filter.is_empty() {
            query = query.bind(tenant.map(TenantKey::as_str));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("failed to list pair role assignments", error))?;

        rows.into_iter().map(Assignment::try_from).collect()
    }

    pub(super) async fn list_for_roleable_impl(
        &self,
        roleable: &EntityRef,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>> {
        self.validate_entity(roleable)?;

        let tenant_filter = self.tenant_predicate(tenant, 3).unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM {} WHERE roleable_type = $1 AND roleable_id = $2{}{tenant_filter} \
             ORDER BY id",
            self.returning,
            self.table(),
            self.schema.id_parameter_cast()
        );

        let mut query = sqlx::query_as::<_, AssignmentRow>(sql.as_str())
            .bind(roleable.entity_type())
            .bind(roleable.entity_id());
        if !tenant_filter.is_empty() {
            query = query.bind(tenant.map(TenantKey::as_str));
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|error| {
            map_sqlx_error(
                &format!("failed to list role assignments on '{roleable}'"),
                error,
            )
        })?;

        rows.into_iter().map(Assignment::try_from).collect()
    }

    pub(super) async fn list_for_assignable_impl(
        &self,
        assignable: &EntityRef,
        roleable_type: Option<&str>,
        tenant: Option<&TenantKey>,
    ) -> AppResult<Vec<Assignment>> {
        self.validate_entity(assignable)?;

        let mut next_index = 3;
        let type_filter = match roleable_type {
            Some(_) => {
                next_index += 1;
                " AND roleable_type = $3".to_owned()
            }
            None => String::new(),
        };
        let tenant_filter = self
            .tenant_predicate(tenant, next_index)
            .unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM {} WHERE assignable_type = $1 AND assignable_id = $2{}\
             {type_filter}{tenant_filter} ORDER BY id",
            self.returning,
            self.table(),
            self.schema.id_parameter_cast()
        );

        let mut query = sqlx::query_as::<_, AssignmentRow>(sql.as_str())
            .bind(assignable.entity_type())
            .bind(assignable.entity_id());
        if let Some(roleable_type) = roleable_type {
            query = query.bind(roleable_type);
        }
        if !tenant_filter.is_empty() {
            query = query.bind(tenant.map(TenantKey::as_str));
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|error| {
            map_sqlx_error(
                &format!("failed to list role assignments held by '{assignable}'"),
                error,
            )
        })?;

        rows.into_iter().map(Assignment::try_from).collect()
    }
}
