use rolebind_core::TenantViolation;

/// Resolved tenant context for one prospective assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantPolicyInput<'a> {
    /// Multitenancy feature flag.
    pub enabled: bool,
    /// Current tenant key of the assignable entity.
    pub assignable_tenant: Option<&'a str>,
    /// Tenant key of the roleable entity, or its own identity when it is a tenant entity.
    pub roleable_tenant: Option<&'a str>,
    /// Whether the roleable entity represents a tenant itself.
    pub roleable_is_tenant_entity: bool,
}

/// Decides whether an assignment may cross the given tenant boundary.
///
/// Pure: tenant keys must be resolved from the entities beforehand.
pub fn evaluate_tenant_policy(input: TenantPolicyInput<'_>) -> Result<(), TenantViolation> {
    if !input.enabled {
        return Ok(());
    }

    match (input.assignable_tenant, input.roleable_tenant) {
        (None, None) if !input.roleable_is_tenant_entity => Ok(()),
        (None, roleable_tenant) => Err(TenantViolation::AssignableWithoutTenant {
            roleable_tenant: roleable_tenant.map(str::to_owned),
        }),
        (Some(assignable_tenant), None) => Err(TenantViolation::RoleableWithoutTenant {
            assignable_tenant: assignable_tenant.to_owned(),
        }),
        (Some(assignable), Some(roleable)) if assignable != roleable => {
            Err(TenantViolation::Mismatch {
                assignable_tenant: assignable.to_owned(),
                roleable_tenant: roleable.to_owned(),
            })
        }
        (Some(_), Some(_)) => Ok(()),
    }
}
