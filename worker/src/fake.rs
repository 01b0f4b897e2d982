use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use models::{Container, ControlPlaneError};

use crate::runtime::ContainerRuntime;

/// In-memory `ContainerRuntime` double. Never touches Docker; used by the
/// registry and scheduler test suites so they don't need a daemon running.
#[derive(Default)]
pub struct FakeContainerRuntime {
    next_id: AtomicU64,
    running: Mutex<HashMap<String, String>>,
}

impl FakeContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, container_id: &str) -> bool {
        self.running.lock().unwrap().contains_key(container_id)
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerRuntime for FakeContainerRuntime {
    async fn start(&self, container: &Container) -> Result<String, ControlPlaneError> {
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.running
            .lock()
            .unwrap()
            .insert(id.clone(), container.name.clone());
        Ok(id)
    }

    async fn stop(&self, container_id: &str) -> Result<(), ControlPlaneError> {
        self.running
            .lock()
            .unwrap()
            .remove(container_id)
            .ok_or_else(|| ControlPlaneError::NotFound(format!("container {container_id} not running")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{Container, ResourceRequirements};

    fn container() -> Container {
        Container::new("web", "nginx", None, None, ResourceRequirements::default()).unwrap()
    }

    #[tokio::test]
    async fn start_then_stop_round_trips() {
        let runtime = FakeContainerRuntime::new();
        let id = runtime.start(&container()).await.unwrap();
        assert!(runtime.is_running(&id));
        runtime.stop(&id).await.unwrap();
        assert!(!runtime.is_running(&id));
    }

    #[tokio::test]
    async fn stop_unknown_id_is_not_found() {
        let runtime = FakeContainerRuntime::new();
        assert!(runtime.stop("ghost").await.is_err());
    }
}
