use async_trait::async_trait;
use redis::RedisResult;
use vendra_order::repository::{IdempotencyStore, RepoError};

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Record a consumed-event key. SET NX means only the first delivery
    /// wins; redeliveries of the same event see the existing key and are
    /// skipped.
    pub async fn mark_event_processed(&self, key: &str, ttl_seconds: u64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("event:{}", key);

        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }
}

#[async_trait]
impl IdempotencyStore for RedisClient {
    async fn record(&self, key: &str, ttl_seconds: u64) -> Result<bool, RepoError> {
        Ok(self.mark_event_processed(key, ttl_seconds).await?)
    }
}
