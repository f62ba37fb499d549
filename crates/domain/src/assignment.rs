use std::str::FromStr;

use chrono::{DateTime, Utc};
use rolebind_core::{AppError, AppResult, EntityRef, TenantKey};
use serde::{Deserialize, Serialize};

/// Policy applied when a pair already holds roles and a new one is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Existing roles on the pair are removed before the new one is inserted.
    #[default]
    Replace,
    /// The new role is added next to existing ones.
    Add,
}

impl AssignmentStrategy {
    /// Returns a stable configuration value for this strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Add => "add",
        }
    }
}

impl FromStr for AssignmentStrategy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "replace" => Ok(Self::Replace),
            "add" => Ok(Self::Add),
            _ => Err(AppError::Validation(format!(
                "unknown assignment strategy '{value}'"
            ))),
        }
    }
}

/// Identifier format used for assignable and roleable ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// 26-character Crockford base32 ULIDs.
    #[default]
    Ulid,
    /// RFC 4122 UUIDs.
    Uuid,
    /// Signed 64-bit integers.
    Integer,
}

impl IdStrategy {
    /// Returns a stable configuration value for this strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ulid => "ulid",
            Self::Uuid => "uuid",
            Self::Integer => "integer",
        }
    }

    /// Checks that an entity id is well-formed for this strategy.
    pub fn validate_id(&self, entity_id: &str) -> AppResult<()> {
        let valid = match self {
            Self::Ulid => is_canonical_ulid(entity_id),
            Self::Uuid => uuid::Uuid::parse_str(entity_id).is_ok(),
            Self::Integer => entity_id.parse::<i64>().is_ok(),
        };

        if valid {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "entity id '{entity_id}' is not a valid {} identifier",
                self.as_str()
            )))
        }
    }
}

impl FromStr for IdStrategy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ulid" => Ok(Self::Ulid),
            "uuid" => Ok(Self::Uuid),
            "integer" => Ok(Self::Integer),
            _ => Err(AppError::Validation(format!("unknown id strategy '{value}'"))),
        }
    }
}

/// Uppercase Crockford base32 of 26 characters, leading character `0`-`7`.
///
/// Lowercase is rejected so one entity never maps to two stored ids.
fn is_canonical_ulid(entity_id: &str) -> bool {
    let bytes = entity_id.as_bytes();
    bytes.len() == 26
        && matches!(bytes[0], b'0'..=b'7')
        && bytes.iter().all(|&byte| {
            byte.is_ascii_digit()
                || (byte.is_ascii_uppercase() && !matches!(byte, b'I' | b'L' | b'O' | b'U'))
        })
}

/// Holder and target of a role binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentPair {
    /// Entity holding the role.
    pub assignable: EntityRef,
    /// Entity the role is held on.
    pub roleable: EntityRef,
}

impl AssignmentPair {
    /// Creates a pair.
    #[must_use]
    pub fn new(assignable: EntityRef, roleable: EntityRef) -> Self {
        Self {
            assignable,
            roleable,
        }
    }

    /// Returns a stable string identifying the pair, used for lock scoping.
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.assignable.entity_type(),
            self.assignable.entity_id(),
            self.roleable.entity_type(),
            self.roleable.entity_id()
        )
    }
}

/// Row to be written for one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    /// Holder and target.
    pub pair: AssignmentPair,
    /// Storage key of the role.
    pub role_key: String,
    /// Denormalized tenant, present only with multitenancy enabled.
    pub tenant: Option<TenantKey>,
}

/// Persisted binding between an assignable entity, a roleable entity and a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Surrogate key.
    pub id: i64,
    /// Holder and target.
    pub pair: AssignmentPair,
    /// Storage key of the role, never the plain name unless storage is `plain`.
    pub role_key: String,
    /// Denormalized tenant, present only with multitenancy enabled.
    pub tenant: Option<TenantKey>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{AssignmentStrategy, IdStrategy};

    #[test]
    fn strategy_parses_config_values() {
        assert_eq!(
            AssignmentStrategy::from_str("add").ok(),
            Some(AssignmentStrategy::Add)
        );
        assert!(AssignmentStrategy::from_str("merge").is_err());
    }

    fn accepts(strategy: IdStrategy, entity_id: &str) -> bool {
        strategy.validate_id(entity_id).is_ok()
    }

    #[test]
    fn ulids_must_be_canonical() {
        assert!(!accepts(IdStrategy::Ulid, "01arz3ndektsv4rrffq69g5fav"));
        assert!(!accepts(IdStrategy::Ulid, "01ARZ3NDEKTSV4RRFFQ69g5FAV"));
        assert!(!accepts(IdStrategy::Ulid, "8ZZZZZZZZZZZZZZZZZZZZZZZZZ"));
        assert!(!accepts(IdStrategy::Ulid, "01ARZ3NDEKTSV4RRFFQ69G5FA"));
    }

    #[test]
    fn id_strategy_validates_formats() {
        assert!(accepts(IdStrategy::Ulid, "01ARZ3NDEKTSV4RRFFQ69G5FAV"));
        assert!(!accepts(IdStrategy::Ulid, "01ARZ3NDEKTSV4RRFFQ69G5FAL"));
        assert!(accepts(IdStrategy::Ulid, "7ZZZZZZZZZZZZZZZZZZZZZZZZZ"));
        assert!(accepts(IdStrategy::Uuid, "67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!accepts(IdStrategy::Uuid, "42"));
        assert!(accepts(IdStrategy::Integer, "42"));
        assert!(!accepts(IdStrategy::Integer, "forty-two"));
    }
}
