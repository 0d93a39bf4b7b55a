use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};

/// Thin wrapper around the shared cache.
///
/// Holds a lazy `redis::Client` and opens a multiplexed connection per call,
/// so an unreachable Redis surfaces as a per-operation error the callers can
/// degrade around (the rate limiter fails open, typing sets come back empty)
/// instead of failing service startup.
#[derive(Clone)]
pub struct CacheClient {
    client: redis::Client,
}

impl CacheClient {
    pub fn new(redis_url: &str) -> RedisResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }

    async fn conn(&self) -> RedisResult<MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await
    }

    /// Atomically increment `key`, arming the window TTL on the first hit.
    /// Returns the post-increment count.
    pub async fn incr_in_window(&self, key: &str, window_secs: u64) -> RedisResult<i64> {
        let mut conn = self.conn().await?;
        let count: i64 = conn.incr(key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(key, window_secs as i64).await?;
        }
        Ok(count)
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> RedisResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(key).await
    }

    pub async fn delete(&self, key: &str) -> RedisResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    pub async fn keys_matching(&self, pattern: &str) -> RedisResult<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.keys(pattern).await
    }
}
