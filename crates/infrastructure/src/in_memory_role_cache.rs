use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rolebind_application::RoleCache;
use rolebind_core::AppResult;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct RoleCacheEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct RoleCacheState {
    entries: HashMap<String, RoleCacheEntry>,
    tags: HashMap<String, HashSet<String>>,
}

impl RoleCacheState {
    fn forget(&mut self, key: &str) {
        self.entries.remove(key);
        self.tags.retain(|_, members| {
            members.remove(key);
            !members.is_empty()
        });
    }

    fn sweep_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            self.forget(key.as_str());
        }
    }
}

/// In-memory cache adapter for derived role reads.
///
/// Expired entries are swept on every write; deleted keys leave their tags.
#[derive(Default)]
pub struct InMemoryRoleCache {
    state: RwLock<RoleCacheState>,
}

impl InMemoryRoleCache {
    /// Creates an empty in-memory role cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleCache for InMemoryRoleCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        {
            let state = self.state.read().await;
            match state.entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut state = self.state.write().await;
        if state
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            state.forget(key);
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u32) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);

        let mut state = self.state.write().await;
        state.sweep_expired(now);
        state
            .entries
            .insert(key.to_owned(), RoleCacheEntry { value, expires_at });

        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> AppResult<()> {
        let mut state = self.state.write().await;
        for key in keys {
            state.forget(key.as_str());
        }

        Ok(())
    }

    async fn tag(&self, tag: &str, key: &str) -> AppResult<()> {
        self.state
            .write()
            .await
            .tags
            .entry(tag.to_owned())
            .or_default()
            .insert(key.to_owned());

        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> AppResult<()> {
        let mut state = self.state.write().await;
        let Some(keys) = state.tags.remove(tag) else {
            return Ok(());
        };

        for key in keys {
            state.forget(key.as_str());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use rolebind_application::RoleCache;
    use rolebind_core::AppResult;

    use super::{InMemoryRoleCache, RoleCacheEntry};

    #[tokio::test]
    async fn stores_and_deletes_entries() -> AppResult<()> {
        let cache = InMemoryRoleCache::new();
        cache
            .set("rolebind:roles:user:u1", "[\"editor\"]".to_owned(), 60)
            .await?;

        assert_eq!(
            cache.get("rolebind:roles:user:u1").await?.as_deref(),
            Some("[\"editor\"]")
        );

        cache.delete(&["rolebind:roles:user:u1".to_owned()]).await?;
        assert_eq!(cache.get("rolebind:roles:user:u1").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn zero_ttl_skips_write() -> AppResult<()> {
        let cache = InMemoryRoleCache::new();
        cache.set("key", "value".to_owned(), 0).await?;

        assert_eq!(cache.get("key").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn tag_invalidation_removes_members_only() -> AppResult<()> {
        let cache = InMemoryRoleCache::new();
        cache.set("a", "1".to_owned(), 60).await?;
        cache.set("b", "2".to_owned(), 60).await?;
        cache.set("c", "3".to_owned(), 60).await?;
        cache.tag("rolebind:tag:user:u1", "a").await?;
        cache.tag("rolebind:tag:user:u1", "b").await?;

        cache.invalidate_tag("rolebind:tag:user:u1").await?;

        assert_eq!(cache.get("a").await?, None);
        assert_eq!(cache.get("b").await?, None);
        assert_eq!(cache.get("c").await?.as_deref(), Some("3"));
        cache.invalidate_tag("rolebind:tag:user:u1").await?;
        Ok(())
    }

    #[tokio::test]
    async fn deleted_keys_leave_their_tags() -> AppResult<()> {
        let cache = InMemoryRoleCache::new();
        cache.set("a", "1".to_owned(), 60).await?;
        cache.set("b", "2".to_owned(), 60).await?;
        cache.tag("rolebind:tag:user:u1", "a").await?;
        cache.tag("rolebind:tag:user:u1", "b").await?;
        cache.tag("rolebind:tag:project:p1", "a").await?;

        cache.delete(&["a".to_owned()]).await?;

        let state = cache.state.read().await;
        assert_eq!(state.tags.len(), 1);
        assert!(state.tags.values().all(|members| !members.contains("a")));
        Ok(())
    }

    #[tokio::test]
    async fn writes_sweep_expired_entries() -> AppResult<()> {
        let cache = InMemoryRoleCache::new();
        {
            let mut state = cache.state.write().await;
            state.entries.insert(
                "stale".to_owned(),
                RoleCacheEntry {
                    value: "1".to_owned(),
                    expires_at: Instant::now(),
                },
            );
            state
                .tags
                .entry("rolebind:tag:user:u1".to_owned())
                .or_default()
                .insert("stale".to_owned());
        }

        cache.set("fresh", "2".to_owned(), 60).await?;

        let state = cache.state.read().await;
        assert_eq!(state.entries.len(), 1);
        assert!(state.entries.contains_key("fresh"));
        assert!(state.tags.is_empty());
        Ok(())
    }
}
