use std::collections::HashMap;

use rolebind_core::{AppError, AppResult};

use crate::{KeyStorage, RoleIdentity, RoleKeyCodec};

#[derive(Debug, Clone)]
struct RegisteredRole {
    identity: RoleIdentity,
    storage_key: String,
}

/// Immutable set of role definitions built once at startup.
///
/// Storage keys are derived for every role during construction, so key
/// lookups never recompute digests. Roles are kept ordered by ascending level.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: Vec<RegisteredRole>,
    by_name: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
    codec: RoleKeyCodec,
}

impl RoleRegistry {
    /// Builds a registry, rejecting duplicate names and duplicate levels.
    pub fn new(roles: Vec<RoleIdentity>, codec: RoleKeyCodec) -> AppResult<Self> {
        let mut ordered = roles;
        ordered.sort_by_key(RoleIdentity::level);

        for pair in ordered.windows(2) {
            if pair[0].level() == pair[1].level() {
                return Err(AppError::Validation(format!(
                    "roles '{}' and '{}' share hierarchy level {}",
                    pair[0].name(),
                    pair[1].name(),
                    pair[0].level()
                )));
            }
        }

        let mut registered = Vec::with_capacity(ordered.len());
        let mut by_name = HashMap::with_capacity(ordered.len());
        let mut by_key = HashMap::with_capacity(ordered.len());

        for (index, identity) in ordered.into_iter().enumerate() {
            if by_name
                .insert(identity.name().to_owned(), index)
                .is_some()
            {
                return Err(AppError::Validation(format!(
                    "role '{}' is registered more than once",
                    identity.name()
                )));
            }

            let storage_key = codec.derive_key(identity.name())?;
            by_key.insert(storage_key.clone(), index);
            registered.push(RegisteredRole {
                identity,
                storage_key,
            });
        }

        Ok(Self {
            roles: registered,
            by_name,
            by_key,
            codec,
        })
    }

    /// Returns an empty registry. Valid, but no assignment can resolve against it.
    #[must_use]
    pub fn empty(codec: RoleKeyCodec) -> Self {
        Self {
            roles: Vec::new(),
            by_name: HashMap::new(),
            by_key: HashMap::new(),
            codec,
        }
    }

    /// Returns every role ordered by ascending level.
    pub fn all(&self) -> impl Iterator<Item = &RoleIdentity> {
        self.roles.iter().map(|role| &role.identity)
    }

    /// Returns the number of registered roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns whether no role is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the configured key storage strategy.
    #[must_use]
    pub fn key_storage(&self) -> KeyStorage {
        self.codec.storage()
    }

    /// Returns whether a role with this name exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Looks up a role by name without failing.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&RoleIdentity> {
        self.by_name
            .get(name)
            .map(|index| &self.roles[*index].identity)
    }

    /// Looks up a role by name.
    pub fn by_name(&self, name: &str) -> AppResult<&RoleIdentity> {
        self.find_by_name(name)
            .ok_or_else(|| AppError::RoleNotFound(format!("role '{name}' is not registered")))
    }

    /// Resolves a stored key, returning `None` for unknown, retired or corrupt keys.
    #[must_use]
    pub fn by_key(&self, stored_key: &str) -> Option<&RoleIdentity> {
        self.require_key(stored_key).ok()
    }

    /// Resolves a stored key.
    ///
    /// Fails with `InvalidRoleKey` when the key cannot be decoded under the
    /// configured strategy and with `RoleNotFound` when it decodes to an
    /// unregistered name.
    pub fn require_key(&self, stored_key: &str) -> AppResult<&RoleIdentity> {
        if let Some(index) = self.by_key.get(stored_key) {
            return Ok(&self.roles[*index].identity);
        }

        match self.codec.reverse(stored_key)? {
            Some(name) => self.by_name(name.as_str()),
            None => Err(AppError::RoleNotFound(format!(
                "no registered role matches stored key '{stored_key}'"
            ))),
        }
    }

    /// Resolves either a role name or a stored key.
    #[must_use]
    pub fn resolve(&self, name_or_key: &str) -> Option<&RoleIdentity> {
        self.find_by_name(name_or_key)
            .or_else(|| self.by_key(name_or_key))
    }

    /// Returns the storage key for a registered role name.
    pub fn storage_key(&self, name: &str) -> AppResult<&str> {
        self.by_name
            .get(name)
            .map(|index| self.roles[*index].storage_key.as_str())
            .ok_or_else(|| AppError::RoleNotFound(format!("role '{name}' is not registered")))
    }

    /// Returns the storage key of every registered role.
    pub fn storage_keys(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|role| role.storage_key.as_str())
    }

    /// Returns the highest ranked role.
    #[must_use]
    pub fn highest(&self) -> Option<&RoleIdentity> {
        self.roles.last().map(|role| &role.identity)
    }

    /// Returns the lowest ranked role.
    #[must_use]
    pub fn lowest(&self) -> Option<&RoleIdentity> {
        self.roles.first().map(|role| &role.identity)
    }

    /// Roles ranked strictly below `role`.
    #[must_use]
    pub fn lower_than(&self, role: &RoleIdentity) -> Vec<&RoleIdentity> {
        self.filter(|candidate| candidate.is_lower_than(role))
    }

    /// Roles ranked strictly above `role`.
    #[must_use]
    pub fn higher_than(&self, role: &RoleIdentity) -> Vec<&RoleIdentity> {
        self.filter(|candidate| candidate.is_higher_than(role))
    }

    /// Roles ranked at or below `role`.
    #[must_use]
    pub fn lower_or_equal(&self, role: &RoleIdentity) -> Vec<&RoleIdentity> {
        self.filter(|candidate| candidate.is_at_most(role))
    }

    /// Roles ranked at or above `role`.
    #[must_use]
    pub fn higher_or_equal(&self, role: &RoleIdentity) -> Vec<&RoleIdentity> {
        self.filter(|candidate| candidate.is_at_least(role))
    }

    fn filter(&self, predicate: impl Fn(&RoleIdentity) -> bool) -> Vec<&RoleIdentity> {
        self.all()
            .filter(|candidate| predicate(candidate))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use rolebind_core::{AppError, AppResult};

    use crate::{RoleIdentity, RoleKeyCipher, RoleKeyCodec};

    use super::RoleRegistry;

    struct PrefixCipher;

    impl RoleKeyCipher for PrefixCipher {
        fn encrypt(&self, plaintext: &str) -> AppResult<String> {
            Ok(format!("v1.{plaintext}"))
        }

        fn decrypt(&self, stored_key: &str) -> AppResult<String> {
            stored_key
                .strip_prefix("v1.")
                .map(str::to_owned)
                .ok_or_else(|| AppError::InvalidRoleKey(stored_key.to_owned()))
        }
    }

    fn roles() -> Vec<RoleIdentity> {
        [("viewer", 10), ("admin", 40), ("editor", 20), ("manager", 30)]
            .into_iter()
            .map(|(name, level)| RoleIdentity::new(name, level).unwrap_or_else(|_| unreachable!()))
            .collect()
    }

    fn codecs() -> Vec<RoleKeyCodec> {
        vec![
            RoleKeyCodec::plain(),
            RoleKeyCodec::hashed("pepper").unwrap_or_else(|_| unreachable!()),
            RoleKeyCodec::encrypted(Arc::new(PrefixCipher)),
        ]
    }

    #[test]
    fn duplicate_levels_are_rejected() -> AppResult<()> {
        let result = RoleRegistry::new(
            vec![RoleIdentity::new("a", 1)?, RoleIdentity::new("b", 1)?],
            RoleKeyCodec::plain(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() -> AppResult<()> {
        let result = RoleRegistry::new(
            vec![RoleIdentity::new("a", 1)?, RoleIdentity::new("a", 2)?],
            RoleKeyCodec::plain(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
        Ok(())
    }

    #[test]
    fn empty_registry_is_valid() {
        let registry = RoleRegistry::empty(RoleKeyCodec::plain());
        assert!(registry.is_empty());
        assert!(registry.highest().is_none());
        assert!(registry.by_key("admin").is_none());
    }

    #[test]
    fn every_strategy_roundtrips_registered_names() -> AppResult<()> {
        for codec in codecs() {
            let registry = RoleRegistry::new(roles(), codec)?;
            let names: Vec<String> = registry.all().map(|role| role.name().to_owned()).collect();

            for name in names {
                let key = registry.storage_key(name.as_str())?.to_owned();
                assert_eq!(registry.require_key(key.as_str())?.name(), name);
            }
        }
        Ok(())
    }

    #[test]
    fn hashed_lookup_fails_closed_for_unknown_key() -> AppResult<()> {
        let registry = RoleRegistry::new(roles(), RoleKeyCodec::hashed("pepper")?)?;

        assert!(registry.by_key("deadbeef").is_none());
        assert!(matches!(
            registry.require_key("deadbeef"),
            Err(AppError::RoleNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn encrypted_lookup_distinguishes_corrupt_from_unknown() -> AppResult<()> {
        let registry = RoleRegistry::new(roles(), RoleKeyCodec::encrypted(Arc::new(PrefixCipher)))?;

        assert!(matches!(
            registry.require_key("not-a-ciphertext"),
            Err(AppError::InvalidRoleKey(_))
        ));
        assert!(matches!(
            registry.require_key("v1.retired"),
            Err(AppError::RoleNotFound(_))
        ));
        assert!(registry.by_key("not-a-ciphertext").is_none());
        Ok(())
    }

    #[test]
    fn ordering_queries_follow_levels() -> AppResult<()> {
        let registry = RoleRegistry::new(roles(), RoleKeyCodec::plain())?;
        let editor = registry.by_name("editor")?.clone();

        assert_eq!(names(registry.lower_than(&editor)), vec!["viewer"]);
        assert_eq!(
            names(registry.higher_than(&editor)),
            vec!["manager", "admin"]
        );
        assert_eq!(
            names(registry.lower_or_equal(&editor)),
            vec!["viewer", "editor"]
        );
        assert_eq!(
            names(registry.higher_or_equal(&editor)),
            vec!["editor", "manager", "admin"]
        );
        assert_eq!(registry.highest().map(RoleIdentity::name), Some("admin"));
        Ok(())
    }

    #[test]
    fn resolve_accepts_name_or_key() -> AppResult<()> {
        let registry = RoleRegistry::new(roles(), RoleKeyCodec::hashed("pepper")?)?;
        let key = registry.storage_key("manager")?.to_owned();

        let by_name = registry.resolve("manager").map(RoleIdentity::name);
        let by_key = registry.resolve(key.as_str()).map(RoleIdentity::name);
        assert_eq!(by_name, Some("manager"));
        assert_eq!(by_key, Some("manager"));
        assert!(registry.resolve("ghost").is_none());
        Ok(())
    }

    fn names(roles: Vec<&RoleIdentity>) -> Vec<String> {
        roles
            .into_iter()
            .map(|role| role.name().to_owned())
            .collect()
    }

    proptest! {
        #[test]
        fn hashed_keys_roundtrip_for_any_name(
            name in "[a-z_]{1,24}",
            secret in "[a-zA-Z0-9]{1,32}",
        ) {
            let codec = RoleKeyCodec::hashed(secret).unwrap_or_else(|_| unreachable!());
            let role = RoleIdentity::new(name.clone(), 1).unwrap_or_else(|_| unreachable!());
            let registry = RoleRegistry::new(vec![role], codec)
                .unwrap_or_else(|_| unreachable!());
            let key = registry
                .storage_key(name.as_str())
                .unwrap_or_else(|_| unreachable!())
                .to_owned();

            let resolved = registry.by_key(key.as_str()).map(RoleIdentity::name);
            prop_assert_eq!(resolved, Some(name.as_str()));
        }
    }
}
