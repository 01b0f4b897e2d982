use std::collections::HashMap;
use std::sync::Arc;

use models::{ControlPlaneError, Node, NodeStatus, ResourceVector};
use store::{with_retry, Store};
use tokio::sync::Mutex;
use tracing::{info, warn};

const NODE_KEY_PREFIX: &str = "nodes/";

fn node_key(name: &str) -> String {
    format!("{NODE_KEY_PREFIX}{name}")
}

/// Owns every `Node`'s accounting state and is the single writer for it.
/// A coarse mutex guards the whole map: node mutation is infrequent and
/// short (a handful of integer additions), so finer-grained locking would
/// buy nothing but complexity. Readers that only need a point-in-time view
/// for scoring should call `snapshot`, which clones out from under the lock
/// rather than holding it across a scheduling decision.
pub struct NodeRegistry {
    nodes: Mutex<HashMap<String, Node>>,
    store: Arc<dyn Store>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            store,
        }
    }

    async fn persist(&self, node: &Node) -> Result<(), ControlPlaneError> {
        let value = serde_json::to_string(node)
            .map_err(|e| ControlPlaneError::internal(format!("serialize node: {e}")))?;
        with_retry("put_node", || self.store.put(&node_key(&node.name), &value)).await
    }

    pub async fn register(&self, node: Node) -> Result<(), ControlPlaneError> {
        let mut nodes = self.nodes.lock().await;
        if nodes.contains_key(&node.name) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "node {}",
                node.name
            )));
        }
        self.persist(&node).await?;
        info!(node = %node.name, "registered node");
        nodes.insert(node.name.clone(), node);
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Node, ControlPlaneError> {
        self.nodes
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ControlPlaneError::NotFound(format!("node {name}")))
    }

    /// External-facing listing: reads the current snapshot from the store
    /// rather than the in-memory map, so a watcher reading the store sees
    /// exactly what the control plane itself persists.
    pub async fn list(&self) -> Result<Vec<Node>, ControlPlaneError> {
        let entries = with_retry("list_nodes", || self.store.get_prefix(NODE_KEY_PREFIX)).await?;
        entries
            .into_iter()
            .map(|(_, value)| {
                serde_json::from_str(&value)
                    .map_err(|e| ControlPlaneError::internal(format!("deserialize node: {e}")))
            })
            .collect()
    }

    /// Point-in-time clone of every node from the in-memory map, used by
    /// schedulers. Taken and released immediately so scoring never runs
    /// while holding the lock that bind/unbind need, and never pays a
    /// store round trip on the scheduling hot path.
    pub async fn snapshot(&self) -> Vec<Node> {
        self.nodes.lock().await.values().cloned().collect()
    }

    /// Mutates a clone of the node, persists it, and only then commits the
    /// clone back into the map. If `persist` fails after exhausting
    /// retries, the map is left exactly as it was -- there is nothing to
    /// revert because nothing was written to it.
    async fn mutate<F>(&self, name: &str, mutate: F) -> Result<(), ControlPlaneError>
    where
        F: FnOnce(&mut Node) -> Result<(), ControlPlaneError>,
    {
        let mut nodes = self.nodes.lock().await;
        let mut updated = nodes
            .get(name)
            .cloned()
            .ok_or_else(|| ControlPlaneError::NotFound(format!("node {name}")))?;
        mutate(&mut updated)?;
        self.persist(&updated).await?;
        nodes.insert(name.to_string(), updated);
        Ok(())
    }

    pub async fn set_status(&self, name: &str, status: NodeStatus) -> Result<(), ControlPlaneError> {
        self.mutate(name, |node| {
            node.set_status(status);
            Ok(())
        })
        .await
    }

    pub async fn bind(
        &self,
        node_name: &str,
        pod_key: &str,
        requested: ResourceVector,
    ) -> Result<(), ControlPlaneError> {
        self.mutate(node_name, |node| node.add_pod(pod_key, requested))
            .await
    }

    pub async fn unbind(
        &self,
        node_name: &str,
        pod_key: &str,
        requested: ResourceVector,
    ) -> Result<(), ControlPlaneError> {
        self.mutate(node_name, |node| node.remove_pod(pod_key, requested))
            .await
    }

    /// Removes a node outright. A node still carrying pods is refused
    /// unless `force` is set, in which case every bound pod is unbound
    /// (not deleted) before the node itself is removed, and their keys are
    /// returned so the caller can decide what to do with them.
    pub async fn remove(&self, name: &str, force: bool) -> Result<Vec<String>, ControlPlaneError> {
        let mut nodes = self.nodes.lock().await;
        let node = nodes
            .get(name)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("node {name}")))?;

        if !node.pods.is_empty() && !force {
            return Err(ControlPlaneError::InvalidInput(format!(
                "node {name} still has {} bound pod(s); pass force to unbind and remove",
                node.pods.len()
            )));
        }

        let orphaned = node.pods.clone();
        nodes.remove(name);
        drop(nodes);

        if let Err(e) = with_retry("delete_node", || self.store.delete(&node_key(name))).await {
            warn!(node = name, error = %e, "failed to delete node from store after in-memory removal");
        }

        Ok(orphaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryStore;

    fn registry() -> NodeRegistry {
        NodeRegistry::new(Arc::new(InMemoryStore::new()))
    }

    fn node(name: &str) -> Node {
        Node::new(name, ResourceVector::new(2000, 4 << 30, 1, 0, 0))
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let reg = registry();
        reg.register(node("node-a")).await.unwrap();
        let fetched = reg.get("node-a").await.unwrap();
        assert_eq!(fetched.name, "node-a");
    }

    #[tokio::test]
    async fn register_twice_is_already_exists() {
        let reg = registry();
        reg.register(node("node-a")).await.unwrap();
        let err = reg.register(node("node-a")).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn bind_then_unbind_restores_capacity() {
        let reg = registry();
        reg.register(node("node-a")).await.unwrap();
        let req = ResourceVector::new(500, 1 << 20, 0, 0, 0);
        reg.bind("node-a", "default/web", req).await.unwrap();
        let bound = reg.get("node-a").await.unwrap();
        assert_eq!(bound.allocated, req);
        reg.unbind("node-a", "default/web", req).await.unwrap();
        let unbound = reg.get("node-a").await.unwrap();
        assert_eq!(unbound.allocated, ResourceVector::ZERO);
    }

    #[tokio::test]
    async fn remove_with_pods_requires_force() {
        let reg = registry();
        reg.register(node("node-a")).await.unwrap();
        reg.bind("node-a", "default/web", ResourceVector::new(100, 1, 0, 0, 0))
            .await
            .unwrap();
        assert!(reg.remove("node-a", false).await.is_err());
        let orphaned = reg.remove("node-a", true).await.unwrap();
        assert_eq!(orphaned, vec!["default/web".to_string()]);
        assert!(reg.get("node-a").await.is_err());
    }
}
