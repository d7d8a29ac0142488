use redis::RedisResult;
use tracing::debug;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. True while `key` has been hit at most `limit`
    /// times in the current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(key, count, limit, "rate limit counter");
        Ok(count <= limit)
    }
}

/// Key for one client in the current minute.
pub fn rate_limit_key(client: &str, window_start: i64) -> String {
    format!("ratelimit:{}:{}", client, window_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key() {
        assert_eq!(rate_limit_key("10.0.0.1", 28_000_000), "ratelimit:10.0.0.1:28000000");
    }
}
