use super::*;

impl PostgresAssignmentRepository {
    pub(super) async fn assign_impl(
        &self,
        assignment: NewAssignment,
        strategy: AssignmentStrategy,
    ) -> AppResult<AssignOutcome> {
        self.validate_pair(&assignment.pair)?;
        let pair = &assignment.pair;

        let mut transaction = self.begin().await?;
        self.lock_pair(&mut transaction, pair).await?;
        let held = self.lock_pair_rows(&mut transaction, pair).await?;

        let (same_role, other_roles): (Vec<Assignment>, Vec<Assignment>) = held
            .into_iter()
            .partition(|row| row.role_key == assignment.role_key);

        let mut replaced = Vec::new();
        if strategy == AssignmentStrategy::Replace && !other_roles.is_empty() {
            let ids: Vec<i64> = other_roles.iter().map(|row| row.id).collect();
            sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", self.table()))
                .bind(ids)
                .execute(&mut *transaction)
                .await
                .map_err(|error| map_sqlx_error("failed to replace held roles", error))?;
            replaced = other_roles;
        }

        if let Some(existing) = same_role.into_iter().next() {
            Self::commit(transaction).await?;
            return Ok(AssignOutcome {
                assignment: existing,
                created: false,
                replaced,
            });
        }

        let cast = self.schema.id_parameter_cast();
        let (tenant_column, tenant_value) = match self.schema.tenant_column() {
            Some(column) => (format!(", {column}"), ", $6".to_owned()),
            None => (String::new(), String::new()),
        };
        let sql = format!(
            "INSERT INTO {table} \
             (assignable_type, assignable_id, roleable_type, roleable_id, role_key{tenant_column}) \
             VALUES ($1, $2{cast}, $3, $4{cast}, $5{tenant_value}) \
             RETURNING {returning}",
            table = self.table(),
            returning = self.returning,
        );

        let mut insert = sqlx::query_as::<_, AssignmentRow>(sql.as_str())
            .bind(pair.assignable.entity_type())
            .bind(pair.assignable.entity_id())
            .bind(pair.roleable.entity_type())
            .bind(pair.roleable.entity_id())
            .bind(assignment.role_key.as_str());
        if self.schema.tenant_column().is_some() {
            insert = insert.bind(assignment.tenant.as_ref().map(TenantKey::as_str));
        }

        let created = insert
            .fetch_one(&mut *transaction)
            .await
            .map_err(|error| map_sqlx_error("failed to insert role assignment", error))?;

        Self::commit(transaction).await?;

        Ok(AssignOutcome {
            assignment: Assignment::try_from(created)?,
            created: true,
            replaced,
        })
    }

    pub(super) async fn remove_all_impl(
        &self,
        pair: &AssignmentPair,
    ) -> AppResult<Vec<Assignment>> {
        self.validate_pair(pair)?;

        let mut transaction = self.begin().await?;
        self.lock_pair(&mut transaction, pair).await?;

        let sql = format!(
            "DELETE FROM {} WHERE {} RETURNING {}",
            self.table(),
            self.pair_predicate(),
            self.returning
        );
        let removed = sqlx::query_as::<_, AssignmentRow>(sql.as_str())
            .bind(pair.assignable.entity_type())
            .bind(pair.assignable.entity_id())
            .bind(pair.roleable.entity_type())
            .bind(pair.roleable.entity_id())
            .fetch_all(&mut *transaction)
            .await
            .map_err(|error| map_sqlx_error("failed to remove role assignments", error))?;

        Self::commit(transaction).await?;

        let mut removed = removed
            .into_iter()
            .map(Assignment::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        removed.sort_by_key(|row| row.id);
        Ok(removed)
    }

    pub(super) async fn change_role_impl(
        &self,
        pair: &AssignmentPair,
        role_key: &str,
        tenant: Option<TenantKey>,
    ) -> AppResult<ChangeOutcome> {
        self.validate_pair(pair)?;

        let mut transaction = self.begin().await?;
        self.lock_pair(&mut transaction, pair).await?;
        let held = self.lock_pair_rows(&mut transaction, pair).await?;

        let Some(oldest) = held.first().cloned() else {
            Self::commit(transaction).await?;
            return Ok(ChangeOutcome::Missing);
        };

        if oldest.role_key == role_key {
            Self::commit(transaction).await?;
            return Ok(ChangeOutcome::Unchanged(oldest));
        }

        // The pair already holds the target role on another row: drop the old one.
        if let Some(holder) = held.iter().find(|row| row.role_key == role_key).cloned() {
            sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table()))
                .bind(oldest.id)
                .execute(&mut *transaction)
                .await
                .map_err(|error| map_sqlx_error("failed to change role assignment", error))?;

            Self::commit(transaction).await?;
            return Ok(ChangeOutcome::Changed {
                previous: oldest,
                current: holder,
            });
        }

        let tenant_assignment = self
            .schema
            .tenant_column()
            .map(|column| format!(", {column} = $3"))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE {} SET role_key = $1, updated_at = now(){tenant_assignment} \
             WHERE id = $2 RETURNING {}",
            self.table(),
            self.returning
        );

        let mut update = sqlx::query_as::<_, AssignmentRow>(sql.as_str())
            .bind(role_key)
            .bind(oldest.id);
        if self.schema.tenant_column().is_some() {
            update = update.bind(tenant.as_ref().map(TenantKey::as_str));
        }

        let current = update
            .fetch_one(&mut *transaction)
            .await
            .map_err(|error| map_sqlx_error("failed to change role assignment", error))?;

        Self::commit(transaction).await?;

        Ok(ChangeOutcome::Changed {
            previous: oldest,
            current: Assignment::try_from(current)?,
        })
    }
}
