//! Redis-backed implementation of the shared fast store.

use crate::FastStore;
use comply_core::config::RedisConfig;
use comply_core::ComplyResult;
use redis::AsyncCommands;
use tracing::info;

/// Redis client wrapper (single node or cluster). Connections are
/// multiplexed; every operation grabs the shared multiplexed connection.
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Connect and verify reachability with a PING.
    pub async fn new(config: &RedisConfig) -> ComplyResult<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self { client })
    }

    async fn conn(&self) -> ComplyResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait::async_trait]
impl FastStore for RedisStore {
    async fn get(&self, key: &str) -> ComplyResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> ComplyResult<()> {
        let mut conn = self.conn().await?;
        match ttl_secs {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> ComplyResult<bool> {
        let mut conn = self.conn().await?;
        // SET key value NX EX ttl: atomic acquire-with-expiry.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn incr(&self, key: &str) -> ComplyResult<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.incr(key, 1i64).await?)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> ComplyResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.expire(key, ttl_secs as i64).await?)
    }

    async fn del(&self, key: &str) -> ComplyResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
