//! Shared primitives for all Rust crates in Rolebind.

#![forbid(unsafe_code)]

/// Polymorphic entity references shared across layers.
pub mod entity;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use entity::{EntityRef, TenantKey};

/// Result type used across Rolebind crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl Display for NonEmptyString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Reason an assignment was rejected by tenant integrity rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TenantViolation {
    /// The assignable entity has no current tenant.
    AssignableWithoutTenant {
        /// Tenant the roleable entity belongs to, when known.
        roleable_tenant: Option<String>,
    },
    /// The roleable entity has no tenant.
    RoleableWithoutTenant {
        /// Current tenant of the assignable entity.
        assignable_tenant: String,
    },
    /// Both sides carry a tenant but they differ.
    Mismatch {
        /// Current tenant of the assignable entity.
        assignable_tenant: String,
        /// Tenant of the roleable entity.
        roleable_tenant: String,
    },
}

impl Display for TenantViolation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AssignableWithoutTenant { .. } => {
                formatter.write_str("assignable entity has no current tenant")
            }
            Self::RoleableWithoutTenant { assignable_tenant } => write!(
                formatter,
                "roleable entity has no tenant while assignable is scoped to '{assignable_tenant}'"
            ),
            Self::Mismatch {
                assignable_tenant,
                roleable_tenant,
            } => write!(
                formatter,
                "tenant mismatch: assignable '{assignable_tenant}', roleable '{roleable_tenant}'"
            ),
        }
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Role name or storage key does not resolve against the registry.
    #[error("role not found: {0}")]
    RoleNotFound(String),

    /// Assignment rejected by tenant integrity rules.
    #[error("tenant integrity violation: {0}")]
    TenantIntegrity(TenantViolation),

    /// Stored role key cannot be decoded under the configured storage strategy.
    #[error("invalid role key: {0}")]
    InvalidRoleKey(String),

    /// Write operation conflicts with a concurrent writer (lock timeout, deadlock).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A backing service could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the operation may succeed when attempted again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString, TenantViolation};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn only_infrastructure_errors_are_retryable() {
        assert!(AppError::Conflict("lock timeout".to_owned()).is_retryable());
        assert!(AppError::Unavailable("connection reset".to_owned()).is_retryable());
        assert!(!AppError::RoleNotFound("ghost".to_owned()).is_retryable());
        assert!(
            !AppError::TenantIntegrity(TenantViolation::AssignableWithoutTenant {
                roleable_tenant: None
            })
            .is_retryable()
        );
    }

    #[test]
    fn mismatch_message_names_both_tenants() {
        let error = AppError::TenantIntegrity(TenantViolation::Mismatch {
            assignable_tenant: "org_123".to_owned(),
            roleable_tenant: "org_456".to_owned(),
        });

        let message = error.to_string();
        assert!(message.contains("org_123"));
        assert!(message.contains("org_456"));
    }
}
