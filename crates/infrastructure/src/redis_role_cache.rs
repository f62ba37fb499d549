//! Redis-backed role read cache.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, Script};
use rolebind_application::RoleCache;
use rolebind_core::{AppError, AppResult};

const INVALIDATE_TAG_SCRIPT: &str = r#"
local members = redis.call('SMEMBERS', KEYS[1])
for _, member in ipairs(members) do
  redis.call('DEL', member)
end
redis.call('DEL', KEYS[1])
return #members
"#;

/// Redis implementation of the role cache port.
///
/// Keys arrive fully qualified from the cache coordinator; tags are Redis sets
/// of member keys.
#[derive(Clone)]
pub struct RedisRoleCache {
    client: redis::Client,
}

impl RedisRoleCache {
    /// Creates a cache adapter with a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl RoleCache for RedisRoleCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection().await?;

        connection.get(key).await.map_err(|error| {
            map_redis_error(format!("failed to read role cache entry '{key}'"), error)
        })
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u32) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let mut connection = self.connection().await?;
        connection
            .set_ex(key, value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                map_redis_error(format!("failed to write role cache entry '{key}'"), error)
            })
    }

    async fn delete(&self, keys: &[String]) -> AppResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut connection = self.connection().await?;
        let _: () = connection.del(keys).await.map_err(|error| {
            map_redis_error("failed to delete role cache entries".to_owned(), error)
        })?;

        Ok(())
    }

    async fn tag(&self, tag: &str, key: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let _: () = connection.sadd(tag, key).await.map_err(|error| {
            map_redis_error(format!("failed to tag role cache entry '{key}'"), error)
        })?;

        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let _: i64 = Script::new(INVALIDATE_TAG_SCRIPT)
            .key(tag)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                map_redis_error(format!("failed to invalidate cache tag '{tag}'"), error)
            })?;

        Ok(())
    }
}

/// Connection-level failures mean the backend is down; anything else is a bug.
fn map_redis_error(context: String, error: RedisError) -> AppError {
    if error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
    {
        AppError::Unavailable(format!("{context}: {error}"))
    } else {
        AppError::Internal(format!("{context}: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use redis::RedisError;
    use rolebind_application::RoleCache;
    use rolebind_core::{AppError, AppResult};

    use super::{RedisRoleCache, map_redis_error};

    #[test]
    fn io_failures_map_to_unavailable() {
        let error = RedisError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));

        assert!(matches!(
            map_redis_error("failed to read role cache entry 'k'".to_owned(), error),
            AppError::Unavailable(message) if message.starts_with("failed to read")
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() -> AppResult<()> {
        let client = redis::Client::open("redis://127.0.0.1:1/")
            .map_err(|error| AppError::Internal(format!("invalid redis url: {error}")))?;
        let cache = RedisRoleCache::new(client);

        let result = cache.get("rolebind:role_check:user:u1").await;

        assert!(matches!(result, Err(ref error) if error.is_retryable()));
        assert!(matches!(result, Err(AppError::Unavailable(_))));
        Ok(())
    }
}
