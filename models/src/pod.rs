use serde::{Deserialize, Serialize};

use crate::container::{fold_resources, Container, ContainerManifest, ResourceRequirements};
use crate::error::ControlPlaneError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodStatus {
    Pending,
    Running,
    Stopped,
    Failed,
}

/// A pod: one or more containers scheduled and run as a unit. The pod's own
/// resource footprint is never stored redundantly -- `resources()` always
/// recomputes it from the current container list, so there is nothing to
/// drift out of sync after a container is added or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    pub containers: Vec<Container>,
    /// Opaque references to externally provisioned volumes. The control
    /// plane never interprets these beyond carrying them through to the
    /// container runtime; see the volume-provisioning non-goal.
    #[serde(default)]
    pub volumes: Vec<String>,
    pub status: PodStatus,
    #[serde(default)]
    pub node_name: Option<String>,
}

impl Pod {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        containers: Vec<Container>,
    ) -> Result<Self, ControlPlaneError> {
        Self::with_volumes(namespace, name, containers, Vec::new())
    }

    pub fn with_volumes(
        namespace: impl Into<String>,
        name: impl Into<String>,
        containers: Vec<Container>,
        volumes: Vec<String>,
    ) -> Result<Self, ControlPlaneError> {
        let namespace = namespace.into();
        let name = name.into();
        if namespace.trim().is_empty() {
            return Err(ControlPlaneError::InvalidInput(
                "pod namespace must not be empty".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(ControlPlaneError::InvalidInput(
                "pod name must not be empty".to_string(),
            ));
        }
        if containers.is_empty() {
            return Err(ControlPlaneError::InvalidInput(format!(
                "pod {namespace}/{name} must have at least one container"
            )));
        }
        Ok(Self {
            namespace,
            name,
            containers,
            volumes,
            status: PodStatus::Pending,
            node_name: None,
        })
    }

    /// Stable identity used as the key in the pod registry and the store.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Sums requests and limits across every container. Extracted from the
    /// original per-field accumulation so it stays correct as container
    /// fields grow without touching call sites.
    pub fn resources(&self) -> ResourceRequirements {
        self.containers
            .iter()
            .fold(ResourceRequirements::default(), |acc, c| {
                fold_resources(acc, c)
            })
    }

    pub fn is_bound(&self) -> bool {
        self.node_name.is_some()
    }

    pub fn bind(&mut self, node_name: impl Into<String>) {
        self.node_name = Some(node_name.into());
    }

    pub fn unbind(&mut self) {
        self.node_name = None;
        self.status = PodStatus::Pending;
    }
}

/// Manifest shape for a pod, as it arrives over the HTTP API or the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PodManifest {
    pub namespace: String,
    pub name: String,
    pub containers: Vec<ContainerManifest>,
    #[serde(default)]
    pub volumes: Vec<String>,
}

impl TryFrom<PodManifest> for Pod {
    type Error = ControlPlaneError;

    fn try_from(manifest: PodManifest) -> Result<Self, Self::Error> {
        let containers = manifest
            .containers
            .into_iter()
            .map(Container::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Pod::with_volumes(manifest.namespace, manifest.name, containers, manifest.volumes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceVector;

    fn container(cpu_millis: i64, memory_bytes: i64) -> Container {
        Container::new(
            "web",
            "nginx",
            None,
            None,
            ResourceRequirements {
                requests: ResourceVector::new(cpu_millis, memory_bytes, 0, 0, 0),
                limits: ResourceVector::new(cpu_millis, memory_bytes, 0, 0, 0),
            },
        )
        .unwrap()
    }

    #[test]
    fn resources_sum_across_containers() {
        let pod = Pod::new(
            "default",
            "web",
            vec![container(500, 1 << 20), container(250, 2 << 20)],
        )
        .unwrap();
        let resources = pod.resources();
        assert_eq!(resources.requests, ResourceVector::new(750, 3 << 20, 0, 0, 0));
    }

    #[test]
    fn rejects_empty_container_list() {
        assert!(Pod::new("default", "web", vec![]).is_err());
    }

    #[test]
    fn key_is_namespace_slash_name() {
        let pod = Pod::new("default", "web", vec![container(100, 100)]).unwrap();
        assert_eq!(pod.key(), "default/web");
    }

    #[test]
    fn unbind_resets_to_pending() {
        let mut pod = Pod::new("default", "web", vec![container(100, 100)]).unwrap();
        pod.bind("node-a");
        pod.status = PodStatus::Running;
        pod.unbind();
        assert!(!pod.is_bound());
        assert_eq!(pod.status, PodStatus::Pending);
    }
}
