use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{Store, WatchEvent};
use models::ControlPlaneError;

/// `Store` backed by redis. The spec's external store is described as
/// etcd-compatible, but nothing in this codebase's established stack talks
/// etcd; redis already backs the health-check and load-balancer services,
/// so the adapter approximates the etcd verbs on top of it: `get_prefix`
/// and `delete_prefix` via `KEYS`, `watch` via pub/sub, `lease` via `EXPIRE`.
pub struct RedisStore {
    client: redis::Client,
    notify_channel_prefix: String,
}

impl RedisStore {
    pub fn new(addr: &str) -> crate::Result<Self> {
        let client = redis::Client::open(addr)
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            notify_channel_prefix: "watch:".to_string(),
        })
    }

    async fn connection(&self) -> crate::Result<redis::aio::Connection> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))
    }

    fn notify_channel(&self, key: &str) -> String {
        format!("{}{}", self.notify_channel_prefix, key)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn put(&self, key: &str, value: &str) -> crate::Result<()> {
        let mut conn = self.connection().await?;
        conn.set(key, value)
            .await
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))?;
        let channel = self.notify_channel(key);
        let payload = format!("put:{value}");
        let _: std::result::Result<i64, _> = conn.publish(channel, payload).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> crate::Result<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))
    }

    async fn get_prefix(&self, prefix: &str) -> crate::Result<Vec<(String, String)>> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<String>> = conn
            .get(&keys)
            .await
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))?;
        let mut matches: Vec<(String, String)> = keys
            .into_iter()
            .zip(values)
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> crate::Result<()> {
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .del(key)
            .await
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))?;
        let channel = self.notify_channel(key);
        let _: std::result::Result<i64, _> = conn.publish(channel, "delete").await;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> crate::Result<u64> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted: u64 = conn
            .del(&keys)
            .await
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))?;
        Ok(deleted)
    }

    async fn watch(&self, key: &str) -> crate::Result<mpsc::Receiver<WatchEvent>> {
        let (tx, rx) = mpsc::channel(32);
        let channel = self.notify_channel(key);
        let key_owned = key.to_string();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    warn!(error = %e, "redis watch: failed to open pubsub connection");
                    return;
                }
            };
            if let Err(e) = pubsub.subscribe(&channel).await {
                warn!(error = %e, channel, "redis watch: subscribe failed");
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                let event = if let Some(value) = payload.strip_prefix("put:") {
                    WatchEvent::Put {
                        key: key_owned.clone(),
                        value: value.to_string(),
                    }
                } else {
                    WatchEvent::Delete {
                        key: key_owned.clone(),
                    }
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn lease(&self, key: &str, ttl_seconds: u64) -> crate::Result<()> {
        let mut conn = self.connection().await?;
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        conn.expire(key, ttl)
            .await
            .map_err(|e| ControlPlaneError::StoreUnavailable(e.to_string()))
    }
}
