
use serde::{Deserialize, Serialize};

use crate::error::ControlPlaneError;
use crate::quantity;
use crate::resource::ResourceVector;

/// A container's resource requests/limits exactly as the canonical model
/// understands them: already parsed into integer units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub requests: ResourceVector,
    pub limits: ResourceVector,
}

/// The wire/manifest shape: each resource is an optional Kubernetes-style
/// quantity string (`"500m"`, `"256Mi"`, `"1"`). Missing components default
/// to zero per the aggregation rules in the component design.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawResourceMap {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub gpu: Option<String>,
    #[serde(default)]
    pub io: Option<String>,
    #[serde(default)]
    pub net: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawResourceRequirements {
    #[serde(default)]
    pub requests: RawResourceMap,
    #[serde(default)]
    pub limits: RawResourceMap,
}

impl RawResourceMap {
    pub fn parse(&self) -> Result<ResourceVector, ControlPlaneError> {
        Ok(ResourceVector::new(
            self.cpu.as_deref().map(quantity::parse_cpu).transpose()?.unwrap_or(0),
            self.memory
                .as_deref()
                .map(quantity::parse_memory)
                .transpose()?
                .unwrap_or(0),
            self.gpu.as_deref().map(quantity::parse_gpu).transpose()?.unwrap_or(0),
            self.io.as_deref().map(quantity::parse_cpu).transpose()?.unwrap_or(0),
            self.net.as_deref().map(quantity::parse_cpu).transpose()?.unwrap_or(0),
        ))
    }
}

impl RawResourceRequirements {
    pub fn parse(&self) -> Result<ResourceRequirements, ControlPlaneError> {
        Ok(ResourceRequirements {
            requests: self.requests.parse()?,
            limits: self.limits.parse()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStatus {
    Pending,
    Running,
    Stopped,
    Failed,
}

/// One container inside a pod. Owned by exactly one pod; never shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub ports: Option<Vec<u32>>,
    pub resources: ResourceRequirements,
    #[serde(default = "default_container_status")]
    pub status: ContainerStatus,
}

fn default_container_status() -> ContainerStatus {
    ContainerStatus::Pending
}

impl Container {
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        command: Option<Vec<String>>,
        ports: Option<Vec<u32>>,
        resources: ResourceRequirements,
    ) -> Result<Self, ControlPlaneError> {
        let name = name.into();
        let image = image.into();
        if name.trim().is_empty() {
            return Err(ControlPlaneError::InvalidInput(
                "container name must not be empty".to_string(),
            ));
        }
        if image.trim().is_empty() {
            return Err(ControlPlaneError::InvalidInput(format!(
                "container {name}: image must not be empty"
            )));
        }
        Ok(Self {
            name,
            image,
            command,
            ports,
            resources,
            status: ContainerStatus::Pending,
        })
    }
}

/// Manifest shape for a single container, as it arrives over the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerManifest {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub ports: Option<Vec<u32>>,
    #[serde(default)]
    pub resources: RawResourceRequirements,
}

impl TryFrom<ContainerManifest> for Container {
    type Error = ControlPlaneError;

    fn try_from(manifest: ContainerManifest) -> Result<Self, Self::Error> {
        let resources = manifest.resources.parse()?;
        Container::new(
            manifest.name,
            manifest.image,
            manifest.command,
            manifest.ports,
            resources,
        )
    }
}

/// Sums a container's declared resources with an already-accumulated total,
/// used by the pod model's aggregation pass. Kept free of `Container` state
/// beyond `resources` so it composes cleanly with idempotent recomputation.
pub fn fold_resources(acc: ResourceRequirements, container: &Container) -> ResourceRequirements {
    ResourceRequirements {
        requests: acc.requests + container.resources.requests,
        limits: acc.limits + container.resources.limits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_resource_map_parses_present_fields() {
        let raw = RawResourceMap {
            cpu: Some("500m".to_string()),
            memory: Some("256Mi".to_string()),
            gpu: Some("1".to_string()),
            io: None,
            net: None,
        };
        let parsed = raw.parse().unwrap();
        assert_eq!(parsed, ResourceVector::new(500, 256 * (1 << 20), 1, 0, 0));
    }

    #[test]
    fn missing_components_default_to_zero() {
        let parsed = RawResourceMap::default().parse().unwrap();
        assert_eq!(parsed, ResourceVector::ZERO);
    }

    #[test]
    fn container_rejects_empty_name_or_image() {
        let resources = ResourceRequirements::default();
        assert!(Container::new("", "nginx", None, None, resources).is_err());
        assert!(Container::new("web", "", None, None, resources).is_err());
    }

    #[test]
    fn manifest_rejects_unknown_fields() {
        let json = r#"{"name":"web","image":"nginx","bogus":true}"#;
        let err = serde_json::from_str::<ContainerManifest>(json).unwrap_err();
        assert!(err.to_string().contains("bogus") || err.is_data());
    }
}
