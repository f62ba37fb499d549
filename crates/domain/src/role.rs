use std::cmp::Ordering;

use rolebind_core::{AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Immutable role definition: a unique name and its rank in the hierarchy.
///
/// Higher `level` means more privilege. Storage keys are derived from the name,
/// never from the label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleIdentity {
    name: NonEmptyString,
    level: i32,
    label: String,
    description: String,
}

impl RoleIdentity {
    /// Creates a role whose label defaults to its name.
    pub fn new(name: impl Into<String>, level: i32) -> AppResult<Self> {
        let name = NonEmptyString::new(name)?;
        Ok(Self {
            label: name.as_str().to_owned(),
            name,
            level,
            description: String::new(),
        })
    }

    /// Replaces the human-readable label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Replaces the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns the unique role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the hierarchy level.
    #[must_use]
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Returns the display label.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Compares two roles by hierarchy level.
    #[must_use]
    pub fn compare_level(&self, other: &Self) -> Ordering {
        self.level.cmp(&other.level)
    }

    /// Returns whether this role ranks strictly above `other`.
    #[must_use]
    pub fn is_higher_than(&self, other: &Self) -> bool {
        self.level > other.level
    }

    /// Returns whether this role ranks strictly below `other`.
    #[must_use]
    pub fn is_lower_than(&self, other: &Self) -> bool {
        self.level < other.level
    }

    /// Returns whether both roles share the same rank.
    #[must_use]
    pub fn is_equal_to(&self, other: &Self) -> bool {
        self.level == other.level
    }

    /// Returns whether this role ranks at or above `other`.
    #[must_use]
    pub fn is_at_least(&self, other: &Self) -> bool {
        self.is_higher_than(other) || self.is_equal_to(other)
    }

    /// Returns whether this role ranks at or below `other`.
    #[must_use]
    pub fn is_at_most(&self, other: &Self) -> bool {
        self.is_lower_than(other) || self.is_equal_to(other)
    }
}
