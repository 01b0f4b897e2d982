//! Adapter over the external, etcd-compatible key-value store. The control
//! plane never talks to the wire protocol directly -- every node/pod
//! persistence path goes through the `Store` trait so the backend can be
//! swapped for tests without touching registry code.

pub mod memory;
pub mod redis_store;
pub mod retry;

use async_trait::async_trait;
use models::ControlPlaneError;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;
pub use retry::with_retry;

pub type Result<T> = std::result::Result<T, ControlPlaneError>;

/// A single change observed by `watch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put { key: String, value: String },
    Delete { key: String },
}

/// The etcd-compatible contract the rest of the control plane depends on.
/// Implementations are expected to be cheap to clone (an `Arc` or a
/// connection-pool handle) and safe to share across tasks.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;
    async fn watch(&self, key: &str) -> Result<tokio::sync::mpsc::Receiver<WatchEvent>>;
    async fn lease(&self, key: &str, ttl_seconds: u64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_put_get() {
        let store = InMemoryStore::new();
        store.put("nodes/node-a", "{}").await.unwrap();
        assert_eq!(store.get("nodes/node-a").await.unwrap(), Some("{}".to_string()));
    }
}
