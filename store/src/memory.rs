use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Store, WatchEvent};
use models::ControlPlaneError;

/// An in-process `Store` backed by a plain map. Used by integration tests
/// and by `cargo run` in development so the control plane can boot without
/// a running redis instance.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, String>>,
    watchers: Mutex<HashMap<String, Vec<mpsc::Sender<WatchEvent>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, key: &str, event: WatchEvent) {
        let mut watchers = self.watchers.lock().unwrap();
        if let Some(senders) = watchers.get_mut(key) {
            senders.retain(|tx| tx.try_send(event.clone()).is_ok());
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, key: &str, value: &str) -> crate::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.notify(
            key,
            WatchEvent::Put {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> crate::Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn get_prefix(&self, prefix: &str) -> crate::Result<Vec<(String, String)>> {
        let entries = self.entries.lock().unwrap();
        let mut matches: Vec<(String, String)> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> crate::Result<()> {
        self.entries.lock().unwrap().remove(key);
        self.notify(key, WatchEvent::Delete { key: key.to_string() });
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> crate::Result<u64> {
        let keys: Vec<String> = {
            let entries = self.entries.lock().unwrap();
            entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect()
        };
        let mut entries = self.entries.lock().unwrap();
        for key in &keys {
            entries.remove(key);
        }
        drop(entries);
        for key in &keys {
            self.notify(key, WatchEvent::Delete { key: key.clone() });
        }
        Ok(keys.len() as u64)
    }

    async fn watch(&self, key: &str) -> crate::Result<mpsc::Receiver<WatchEvent>> {
        let (tx, rx) = mpsc::channel(32);
        self.watchers
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn lease(&self, key: &str, _ttl_seconds: u64) -> crate::Result<()> {
        if self.entries.lock().unwrap().get(key).is_none() {
            return Err(ControlPlaneError::NotFound(format!(
                "cannot lease absent key: {key}"
            )));
        }
        Ok(())
    }
}

/// Spawns a background task that expires a key after `ttl`, mirroring what
/// a real lease would do. Split out from `lease` so the trait method stays
/// synchronous-looking and callers can opt into the spawn explicitly.
pub fn spawn_expiry(store: std::sync::Arc<InMemoryStore>, key: String, ttl: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        let _ = store.delete(&key).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_prefix_returns_sorted_matches() {
        let store = InMemoryStore::new();
        store.put("pods/default/b", "2").await.unwrap();
        store.put("pods/default/a", "1").await.unwrap();
        store.put("nodes/node-a", "x").await.unwrap();
        let matches = store.get_prefix("pods/default/").await.unwrap();
        assert_eq!(
            matches,
            vec![
                ("pods/default/a".to_string(), "1".to_string()),
                ("pods/default/b".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn delete_prefix_removes_all_matches_and_counts_them() {
        let store = InMemoryStore::new();
        store.put("pods/default/a", "1").await.unwrap();
        store.put("pods/default/b", "2").await.unwrap();
        let deleted = store.delete_prefix("pods/default/").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get_prefix("pods/default/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watch_receives_subsequent_put() {
        let store = InMemoryStore::new();
        let mut rx = store.watch("nodes/node-a").await.unwrap();
        store.put("nodes/node-a", "{}").await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            WatchEvent::Put {
                key: "nodes/node-a".to_string(),
                value: "{}".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn lease_on_absent_key_is_not_found() {
        let store = InMemoryStore::new();
        assert!(store.lease("nodes/ghost", 30).await.is_err());
    }
}
