//! Derived read caches over role bindings.
//!
//! Every cache call is best-effort: backend failures are logged and treated as
//! misses so that the store stays the only source of truth. Concurrent misses
//! on the same key may compute the value more than once.

use std::future::Future;
use std::sync::Arc;

use rolebind_core::{AppResult, EntityRef, TenantKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{CacheConfig, RoleCache};

/// Cache purpose, selecting key shape and ttl class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePurpose {
    /// Whether a pair holds one role.
    RoleCheck,
    /// Role keys held by a pair. Shares the role check ttl.
    PairRoles,
    /// Holders and roles on one roleable entity.
    Participants,
    /// Roleable entities of one type held by an assignable entity.
    AssignedEntities,
}

impl CachePurpose {
    /// Returns the key segment for this purpose.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleCheck => "role_check",
            Self::PairRoles => "roles",
            Self::Participants => "participants",
            Self::AssignedEntities => "assigned_entities",
        }
    }
}

/// Cache key and tags for one cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryKey {
    /// Purpose the entry belongs to.
    pub purpose: CachePurpose,
    /// Full key.
    pub key: String,
    /// Tags the entry is recorded under when tagging is enabled.
    pub tags: Vec<String>,
}

/// Coordinates cache reads, writes and invalidation for the assignment engine.
#[derive(Clone)]
pub struct CacheCoordinator {
    cache: Option<Arc<dyn RoleCache>>,
    config: CacheConfig,
    tenant_segments: bool,
}

impl CacheCoordinator {
    /// Creates a coordinator over a cache backend.
    ///
    /// `tenant_segments` appends the tenant key to every cache key; set it when
    /// multitenancy and per-tenant caching are both enabled.
    #[must_use]
    pub fn new(cache: Arc<dyn RoleCache>, config: CacheConfig, tenant_segments: bool) -> Self {
        let cache = config.enabled.then_some(cache);
        Self {
            cache,
            config,
            tenant_segments,
        }
    }

    /// Creates a coordinator that always computes.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            cache: None,
            config: CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
            tenant_segments: false,
        }
    }

    /// Returns whether a backend is attached.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Returns the ttl class for a purpose.
    #[must_use]
    pub fn ttl_for(&self, purpose: CachePurpose) -> u32 {
        let override_ttl = match purpose {
            CachePurpose::RoleCheck | CachePurpose::PairRoles => self.config.role_check_ttl_seconds,
            CachePurpose::Participants => self.config.participants_ttl_seconds,
            CachePurpose::AssignedEntities => self.config.assigned_entities_ttl_seconds,
        };

        override_ttl.unwrap_or(self.config.ttl_seconds)
    }

    /// Key of the role check entry for one pair and role name.
    #[must_use]
    pub fn role_check_key(
        &self,
        assignable: &EntityRef,
        roleable: &EntityRef,
        role_name: &str,
        tenant: Option<&TenantKey>,
    ) -> CacheEntryKey {
        self.entry(
            CachePurpose::RoleCheck,
            assignable,
            &[roleable.entity_type(), roleable.entity_id(), role_name],
            tenant,
            &[assignable, roleable],
        )
    }

    /// Key of the held roles entry for one pair.
    #[must_use]
    pub fn pair_roles_key(
        &self,
        assignable: &EntityRef,
        roleable: &EntityRef,
        tenant: Option<&TenantKey>,
    ) -> CacheEntryKey {
        self.entry(
            CachePurpose::PairRoles,
            assignable,
            &[roleable.entity_type(), roleable.entity_id()],
            tenant,
            &[assignable, roleable],
        )
    }

    /// Key of the participants entry for one roleable entity.
    #[must_use]
    pub fn participants_key(
        &self,
        roleable: &EntityRef,
        tenant: Option<&TenantKey>,
    ) -> CacheEntryKey {
        self.entry(
            CachePurpose::Participants,
            roleable,
            &[],
            tenant,
            &[roleable],
        )
    }

    /// Key of the assigned entities entry for one assignable entity and roleable type.
    #[must_use]
    pub fn assigned_entities_key(
        &self,
        assignable: &EntityRef,
        roleable_type: &str,
        tenant: Option<&TenantKey>,
    ) -> CacheEntryKey {
        self.entry(
            CachePurpose::AssignedEntities,
            assignable,
            &[roleable_type],
            tenant,
            &[assignable],
        )
    }

    /// Tag grouping every entry that mentions `entity`.
    #[must_use]
    pub fn entity_tag(&self, entity: &EntityRef) -> String {
        format!(
            "{}:tag:{}:{}",
            self.config.key_prefix,
            entity.entity_type(),
            entity.entity_id()
        )
    }

    /// Returns the cached value for `entry` or computes, stores and returns it.
    pub async fn remember<T, F, Fut>(&self, entry: &CacheEntryKey, compute: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
    {
        let Some(cache) = self.cache.as_ref() else {
            return compute().await;
        };

        match cache.get(entry.key.as_str()).await {
            Ok(Some(encoded)) => match serde_json::from_str::<T>(encoded.as_str()) {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!(key = %entry.key, error = %error, "discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(error) => {
                warn!(key = %entry.key, error = %error, "cache read failed, computing from store");
            }
        }

        let value = compute().await?;
        self.store(cache.as_ref(), entry, &value).await;
        Ok(value)
    }

    /// Deletes entries. Failures are logged, never returned.
    pub async fn invalidate(&self, entries: &[CacheEntryKey]) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };

        if entries.is_empty() {
            return;
        }

        let keys: Vec<String> = entries.iter().map(|entry| entry.key.clone()).collect();
        match cache.delete(&keys).await {
            Ok(()) => debug!(count = keys.len(), "invalidated cache entries"),
            Err(error) => {
                warn!(count = keys.len(), error = %error, "cache invalidation failed");
            }
        }
    }

    /// Deletes every entry mentioning `entity`. No-op unless tagging is enabled.
    pub async fn invalidate_entity(&self, entity: &EntityRef) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };

        if !self.config.use_tags {
            debug!(entity = %entity, "entity flush skipped, cache tags are disabled");
            return;
        }

        let tag = self.entity_tag(entity);
        if let Err(error) = cache.invalidate_tag(tag.as_str()).await {
            warn!(tag = %tag, error = %error, "cache tag invalidation failed");
        }
    }

    async fn store<T: Serialize>(&self, cache: &dyn RoleCache, entry: &CacheEntryKey, value: &T) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(error) => {
                warn!(key = %entry.key, error = %error, "failed to encode cache entry");
                return;
            }
        };

        let ttl_seconds = self.ttl_for(entry.purpose);
        if let Err(error) = cache.set(entry.key.as_str(), encoded, ttl_seconds).await {
            warn!(key = %entry.key, error = %error, "cache write failed");
            return;
        }

        if self.config.use_tags {
            for tag in &entry.tags {
                if let Err(error) = cache.tag(tag.as_str(), entry.key.as_str()).await {
                    warn!(key = %entry.key, tag = %tag, error = %error, "cache tagging failed");
                }
            }
        }
    }

    fn entry(
        &self,
        purpose: CachePurpose,
        entity: &EntityRef,
        qualifiers: &[&str],
        tenant: Option<&TenantKey>,
        tagged: &[&EntityRef],
    ) -> CacheEntryKey {
        let mut key = format!(
            "{}:{}:{}:{}",
            self.config.key_prefix,
            purpose.as_str(),
            entity.entity_type(),
            entity.entity_id()
        );

        for qualifier in qualifiers {
            key.push(':');
            key.push_str(qualifier);
        }

        if self.tenant_segments
            && let Some(tenant) = tenant
        {
            key.push_str(":tenant=");
            key.push_str(tenant.as_str());
        }

        CacheEntryKey {
            purpose,
            key,
            tags: tagged
                .iter()
                .map(|entity| self.entity_tag(entity))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rolebind_core::{AppError, AppResult, EntityRef, TenantKey};
    use tokio::sync::Mutex;

    use crate::{CacheConfig, RoleCache};

    use super::{CacheCoordinator, CachePurpose};

    #[derive(Default)]
    struct FakeCache {
        entries: Mutex<HashMap<String, String>>,
        tags: Mutex<HashMap<String, Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl RoleCache for FakeCache {
        async fn get(&self, key: &str) -> AppResult<Option<String>> {
            if self.fail {
                return Err(AppError::Unavailable("cache down".to_owned()));
            }
            Ok(self.entries.lock().await.get(key).cloned())
        }

        async fn set(&self, key: &str, value: String, _ttl_seconds: u32) -> AppResult<()> {
            if self.fail {
                return Err(AppError::Unavailable("cache down".to_owned()));
            }
            self.entries.lock().await.insert(key.to_owned(), value);
            Ok(())
        }

        async fn delete(&self, keys: &[String]) -> AppResult<()> {
            let mut entries = self.entries.lock().await;
            for key in keys {
                entries.remove(key);
            }
            Ok(())
        }

        async fn tag(&self, tag: &str, key: &str) -> AppResult<()> {
            self.tags
                .lock()
                .await
                .entry(tag.to_owned())
                .or_default()
                .push(key.to_owned());
            Ok(())
        }

        async fn invalidate_tag(&self, tag: &str) -> AppResult<()> {
            let keys = self.tags.lock().await.remove(tag).unwrap_or_default();
            self.delete(&keys).await
        }
    }

    fn entity(entity_type: &str, entity_id: &str) -> EntityRef {
        EntityRef::new(entity_type, entity_id).unwrap_or_else(|_| unreachable!())
    }

    fn coordinator(tenant_segments: bool) -> CacheCoordinator {
        CacheCoordinator::new(
            Arc::new(FakeCache::default()),
            CacheConfig::default(),
            tenant_segments,
        )
    }

    #[test]
    fn keys_follow_prefix_purpose_entity_layout() {
        let coordinator = coordinator(false);
        let user = entity("user", "u1");
        let project = entity("project", "p1");

        let participants = coordinator.participants_key(&project, None);
        let role_check = coordinator.role_check_key(&user, &project, "editor", None);
        let assigned = coordinator.assigned_entities_key(&user, "project", None);

        assert_eq!(participants.key, "rolebind:participants:project:p1");
        assert_eq!(
            role_check.key,
            "rolebind:role_check:user:u1:project:p1:editor"
        );
        assert_eq!(assigned.key, "rolebind:assigned_entities:user:u1:project");
    }

    #[test]
    fn tenant_segment_only_when_enabled() -> AppResult<()> {
        let tenant = TenantKey::new("org_1")?;
        let project = entity("project", "p1");
        let scoped = coordinator(true);
        let global = coordinator(false);

        assert_eq!(
            scoped.participants_key(&project, Some(&tenant)).key,
            "rolebind:participants:project:p1:tenant=org_1"
        );
        assert_eq!(
            global.participants_key(&project, Some(&tenant)).key,
            "rolebind:participants:project:p1"
        );
        Ok(())
    }

    #[test]
    fn ttl_overrides_apply_per_purpose() {
        let coordinator = CacheCoordinator::new(
            Arc::new(FakeCache::default()),
            CacheConfig {
                ttl_seconds: 600,
                participants_ttl_seconds: Some(60),
                ..CacheConfig::default()
            },
            false,
        );

        assert_eq!(coordinator.ttl_for(CachePurpose::Participants), 60);
        assert_eq!(coordinator.ttl_for(CachePurpose::RoleCheck), 600);
    }

    #[tokio::test]
    async fn remember_computes_once_then_serves_cached_value() -> AppResult<()> {
        let coordinator = coordinator(false);
        let entry = coordinator.participants_key(&entity("project", "p1"), None);
        let computed = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Vec<String> = coordinator
                .remember(&entry, || async {
                    computed.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["u1".to_owned()])
                })
                .await?;
            assert_eq!(value, vec!["u1".to_owned()]);
        }

        assert_eq!(computed.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn backend_failure_falls_through_to_compute() -> AppResult<()> {
        let coordinator = CacheCoordinator::new(
            Arc::new(FakeCache {
                fail: true,
                ..FakeCache::default()
            }),
            CacheConfig::default(),
            false,
        );
        let entry = coordinator.participants_key(&entity("project", "p1"), None);

        let value: bool = coordinator.remember(&entry, || async { Ok(true) }).await?;
        assert!(value);
        Ok(())
    }

    #[tokio::test]
    async fn entity_flush_uses_tags() -> AppResult<()> {
        let cache = Arc::new(FakeCache::default());
        let coordinator = CacheCoordinator::new(
            cache.clone(),
            CacheConfig {
                use_tags: true,
                ..CacheConfig::default()
            },
            false,
        );
        let user = entity("user", "u1");
        let project = entity("project", "p1");
        let entry = coordinator.role_check_key(&user, &project, "editor", None);

        let _: bool = coordinator.remember(&entry, || async { Ok(true) }).await?;
        assert_eq!(cache.entries.lock().await.len(), 1);

        coordinator.invalidate_entity(&project).await;
        assert!(cache.entries.lock().await.is_empty());
        Ok(())
    }
}
