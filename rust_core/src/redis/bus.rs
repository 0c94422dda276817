use crate::error::DeliveryError;
use crate::sink::Sink;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::str::FromStr;

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    connection: ConnectionManager,
}

impl RedisBus {
    pub async fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(redis_url)?;
        // The manager reconnects on its own after a dropped connection
        let connection = ConnectionManager::new(client.clone()).await?;

        Ok(Self { client, connection })
    }

    pub async fn publish_bytes(&self, channel: &str, payload: &[u8]) -> Result<(), redis::RedisError> {
        let mut conn = self.connection.clone();
        conn.publish::<_, _, ()>(channel, payload).await
    }

    pub async fn push_bytes(&self, key: &str, payload: &[u8]) -> Result<(), redis::RedisError> {
        let mut conn = self.connection.clone();
        conn.rpush::<_, _, ()>(key, payload).await
    }

    pub fn get_client(&self) -> Client {
        self.client.clone()
    }
}

/// How records reach the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisSinkMode {
    /// PUBLISH to a channel; only live subscribers see it
    Publish,
    /// RPUSH onto a list; consumers drain it at their own pace
    List,
}

impl FromStr for RedisSinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "publish" | "pubsub" => Ok(RedisSinkMode::Publish),
            "list" | "rpush" => Ok(RedisSinkMode::List),
            other => Err(format!("unknown redis sink mode '{}'", other)),
        }
    }
}

pub struct RedisSink {
    bus: RedisBus,
    topic: String,
    mode: RedisSinkMode,
    name: String,
}

impl RedisSink {
    pub fn new(bus: RedisBus, topic: impl Into<String>, mode: RedisSinkMode) -> Self {
        let topic = topic.into();
        let name = match mode {
            RedisSinkMode::Publish => format!("redis:publish:{}", topic),
            RedisSinkMode::List => format!("redis:list:{}", topic),
        };
        Self {
            bus,
            topic,
            mode,
            name,
        }
    }
}

#[async_trait]
impl Sink for RedisSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn emit(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        match self.mode {
            RedisSinkMode::Publish => self.bus.publish_bytes(&self.topic, payload).await?,
            RedisSinkMode::List => self.bus.push_bytes(&self.topic, payload).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_mode_from_str() {
        assert_eq!("publish".parse::<RedisSinkMode>().unwrap(), RedisSinkMode::Publish);
        assert_eq!(" LIST ".parse::<RedisSinkMode>().unwrap(), RedisSinkMode::List);
        assert!("kafka".parse::<RedisSinkMode>().is_err());
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis
    async fn test_list_sink_round_trip() {
        let bus = RedisBus::new("redis://localhost:6379").await.unwrap();
        let key = format!("txflow-test-{}", uuid::Uuid::new_v4());
        let sink = RedisSink::new(bus.clone(), key.clone(), RedisSinkMode::List);

        sink.emit(b"{\"symbol\":\"BTC\"}").await.unwrap();

        let mut conn = bus.get_client().get_async_connection().await.unwrap();
        let stored: Vec<Vec<u8>> = conn.lrange(&key, 0, -1).await.unwrap();
        let _: () = conn.del(&key).await.unwrap();
        assert_eq!(stored, vec![b"{\"symbol\":\"BTC\"}".to_vec()]);
    }
}
