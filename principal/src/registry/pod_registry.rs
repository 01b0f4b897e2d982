use std::collections::HashMap;
use std::sync::Arc;

use models::{ContainerStatus, ControlPlaneError, Pod, PodStatus};
use store::{with_retry, Store};
use tokio::sync::Mutex;
use tracing::{info, warn};
use worker::ContainerRuntime;

const POD_KEY_PREFIX: &str = "pods/";

fn pod_key(key: &str) -> String {
    format!("{POD_KEY_PREFIX}{key}")
}

struct PodEntry {
    pod: Pod,
    /// container name -> runtime-assigned id, populated by `start` and
    /// consulted by `stop`. Empty while the pod has never been started.
    container_ids: HashMap<String, String>,
}

/// Owns every pod's lifecycle: creation, deletion, and start/stop against
/// the container runtime. Binding a pod to a node is the node registry's
/// job; this registry only tracks `node_name` as a label for lookups.
pub struct PodRegistry {
    pods: Mutex<HashMap<String, PodEntry>>,
    store: Arc<dyn Store>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl PodRegistry {
    pub fn new(store: Arc<dyn Store>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            pods: Mutex::new(HashMap::new()),
            store,
            runtime,
        }
    }

    async fn persist(&self, pod: &Pod) -> Result<(), ControlPlaneError> {
        let value = serde_json::to_string(pod)
            .map_err(|e| ControlPlaneError::internal(format!("serialize pod: {e}")))?;
        with_retry("put_pod", || self.store.put(&pod_key(&pod.key()), &value)).await
    }

    pub async fn create(&self, pod: Pod) -> Result<(), ControlPlaneError> {
        let key = pod.key();
        let mut pods = self.pods.lock().await;
        if pods.contains_key(&key) {
            return Err(ControlPlaneError::AlreadyExists(format!("pod {key}")));
        }
        self.persist(&pod).await?;
        info!(pod = %key, "created pod");
        pods.insert(
            key,
            PodEntry {
                pod,
                container_ids: HashMap::new(),
            },
        );
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Pod, ControlPlaneError> {
        self.pods
            .lock()
            .await
            .get(key)
            .map(|entry| entry.pod.clone())
            .ok_or_else(|| ControlPlaneError::NotFound(format!("pod {key}")))
    }

    pub async fn list(&self) -> Vec<Pod> {
        self.pods.lock().await.values().map(|e| e.pod.clone()).collect()
    }

    pub async fn list_namespace(&self, namespace: &str) -> Vec<Pod> {
        self.pods
            .lock()
            .await
            .values()
            .map(|e| e.pod.clone())
            .filter(|p| p.namespace == namespace)
            .collect()
    }

    /// Records that the scheduler has bound this pod to a node, without
    /// touching the container runtime. Binding and starting are
    /// intentionally decoupled: a caller may bind far ahead of start, or
    /// rebind after a restart, without containers flapping.
    pub async fn set_node(&self, key: &str, node_name: &str) -> Result<(), ControlPlaneError> {
        let mut pods = self.pods.lock().await;
        let entry = pods
            .get_mut(key)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("pod {key}")))?;
        entry.pod.bind(node_name);
        let snapshot = entry.pod.clone();
        drop(pods);
        self.persist(&snapshot).await
    }

    pub async fn start(&self, key: &str) -> Result<(), ControlPlaneError> {
        let mut pods = self.pods.lock().await;
        let entry = pods
            .get_mut(key)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("pod {key}")))?;

        if entry.pod.status == PodStatus::Running {
            return Err(ControlPlaneError::InvalidInput(format!(
                "pod {key} is already running"
            )));
        }
        if !entry.pod.is_bound() {
            return Err(ControlPlaneError::InvalidInput(format!(
                "pod {key} is not bound to a node"
            )));
        }

        for container in &mut entry.pod.containers {
            if entry.container_ids.contains_key(&container.name) {
                container.status = ContainerStatus::Running;
                continue;
            }
            match self.runtime.start(container).await {
                Ok(id) => {
                    entry.container_ids.insert(container.name.clone(), id);
                    container.status = ContainerStatus::Running;
                }
                Err(e) => {
                    entry.pod.status = PodStatus::Failed;
                    let snapshot = entry.pod.clone();
                    drop(pods);
                    let _ = self.persist(&snapshot).await;
                    return Err(e);
                }
            }
        }

        entry.pod.status = PodStatus::Running;
        let snapshot = entry.pod.clone();
        drop(pods);
        self.persist(&snapshot).await
    }

    /// Best-effort across containers: every container is given a chance to
    /// stop even if an earlier one failed. The pod transitions to `Stopped`
    /// only if every call succeeded; on any failure it is marked `Failed`
    /// instead, mirroring how `start` exposes a partial failure, and the
    /// error returned is a `RuntimeFailure` so the HTTP layer's lifecycle
    /// handler surfaces it as a 200 with that status rather than a hard error.
    pub async fn stop(&self, key: &str) -> Result<(), ControlPlaneError> {
        let mut pods = self.pods.lock().await;
        let entry = pods
            .get_mut(key)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("pod {key}")))?;

        let mut failures = Vec::new();
        for (_name, id) in entry.container_ids.drain() {
            if let Err(e) = self.runtime.stop(&id).await {
                warn!(pod = key, container_id = %id, error = %e, "failed to stop container");
                failures.push(id);
            }
        }

        if failures.is_empty() {
            for container in &mut entry.pod.containers {
                container.status = ContainerStatus::Stopped;
            }
            entry.pod.status = PodStatus::Stopped;
            let snapshot = entry.pod.clone();
            drop(pods);
            return self.persist(&snapshot).await;
        }

        entry.pod.status = PodStatus::Failed;
        let snapshot = entry.pod.clone();
        drop(pods);
        let _ = self.persist(&snapshot).await;
        Err(ControlPlaneError::RuntimeFailure(format!(
            "pod {key}: container(s) {} failed to stop",
            failures.join(", ")
        )))
    }

    /// Removes the pod from the registry and store, stopping any running
    /// containers first. Returns the removed pod so the caller can unbind
    /// it from its node's accounting.
    pub async fn delete(&self, key: &str) -> Result<Pod, ControlPlaneError> {
        self.stop(key).await.ok();
        let mut pods = self.pods.lock().await;
        let entry = pods
            .remove(key)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("pod {key}")))?;
        drop(pods);

        if let Err(e) = with_retry("delete_pod", || self.store.delete(&pod_key(key))).await {
            warn!(pod = key, error = %e, "failed to delete pod from store after in-memory removal");
        }

        Ok(entry.pod)
    }
}
