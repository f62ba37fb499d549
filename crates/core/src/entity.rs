use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult, NonEmptyString};

/// Tenant key exposed by entities that participate in multitenancy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantKey(NonEmptyString);

impl TenantKey {
    /// Creates a validated tenant key.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value).map(Self)
    }

    /// Returns the underlying key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for TenantKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Polymorphic reference to an entity: a type discriminator plus its identity key.
///
/// Resolving a reference back into a concrete entity is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    entity_type: NonEmptyString,
    entity_id: NonEmptyString,
}

impl EntityRef {
    /// Creates a validated entity reference.
    ///
    /// The type discriminator must not contain `:` since it becomes a cache key segment.
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> AppResult<Self> {
        let entity_type = NonEmptyString::new(entity_type)?;
        if entity_type.as_str().contains(':') {
            return Err(AppError::Validation(format!(
                "entity type '{entity_type}' must not contain ':'"
            )));
        }

        Ok(Self {
            entity_type,
            entity_id: NonEmptyString::new(entity_id)?,
        })
    }

    /// Returns the type discriminator.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.entity_type.as_str()
    }

    /// Returns the identity key.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        self.entity_id.as_str()
    }
}

impl Display for EntityRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}#{}", self.entity_type, self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityRef, TenantKey};

    #[test]
    fn entity_ref_rejects_separator_in_type() {
        assert!(EntityRef::new("app:user", "1").is_err());
        assert!(EntityRef::new("user", " ").is_err());
    }

    #[test]
    fn entity_ref_formats_type_and_id() -> crate::AppResult<()> {
        let entity = EntityRef::new("project", "42")?;
        assert_eq!(entity.to_string(), "project#42");
        Ok(())
    }

    #[test]
    fn tenant_key_rejects_blank_values() {
        assert!(TenantKey::new("").is_err());
        assert!(TenantKey::new("org_1").is_ok());
    }
}
