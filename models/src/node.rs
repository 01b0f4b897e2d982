use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::container::RawResourceMap;
use crate::error::ControlPlaneError;
use crate::resource::ResourceVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Ready,
    NotReady,
    Maintenance,
}

/// A node's accounting state: total capacity, what's currently allocated to
/// bound pods, and the set of pod keys bound to it. Allocation is tracked as
/// a running integer total rather than recomputed from the pod set on every
/// read, since the node registry is the single writer for both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub ip_address: String,
    pub status: NodeStatus,
    pub capacity: ResourceVector,
    pub allocated: ResourceVector,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub pods: Vec<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, capacity: ResourceVector) -> Self {
        Self {
            name: name.into(),
            ip_address: String::new(),
            status: NodeStatus::Ready,
            capacity,
            allocated: ResourceVector::ZERO,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            pods: Vec::new(),
        }
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_annotations(mut self, annotations: HashMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn free(&self) -> ResourceVector {
        self.capacity - self.allocated
    }

    /// A node can take a pod if it's Ready and has enough free capacity in
    /// every dimension the pod requests.
    pub fn can_schedule(&self, requested: &ResourceVector) -> bool {
        matches!(self.status, NodeStatus::Ready) && self.free().dominates(requested)
    }

    /// Binds a pod's accounted resources to this node. Callers must already
    /// hold whatever lock serializes node mutation; this method itself does
    /// no locking.
    pub fn add_pod(&mut self, pod_key: impl Into<String>, requested: ResourceVector) -> Result<(), ControlPlaneError> {
        if !self.can_schedule(&requested) {
            return Err(ControlPlaneError::InsufficientResources {
                node: self.name.clone(),
                requested,
            });
        }
        self.allocated = self.allocated + requested;
        self.pods.push(pod_key.into());
        Ok(())
    }

    /// Reverses `add_pod`. A pod key that was never admitted is a no-op: it
    /// logs a warning and returns `Ok`, rather than erroring, since removing
    /// something that was never there leaves accounting exactly as correct
    /// as it was.
    pub fn remove_pod(&mut self, pod_key: &str, requested: ResourceVector) -> Result<(), ControlPlaneError> {
        let index = match self.pods.iter().position(|k| k == pod_key) {
            Some(i) => i,
            None => {
                tracing::warn!(node = %self.name, pod = pod_key, "removing pod not bound to this node, ignoring");
                return Ok(());
            }
        };
        self.pods.remove(index);
        self.allocated = self.allocated - requested;
        Ok(())
    }

    pub fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }

    /// Utilization ratios (cpu, memory, gpu) used by both schedulers.
    pub fn utilization(&self) -> (f64, f64, f64) {
        (
            ResourceVector::utilization(self.capacity.cpu, self.allocated.cpu),
            ResourceVector::utilization(self.capacity.memory, self.allocated.memory),
            ResourceVector::utilization(self.capacity.gpu, self.allocated.gpu),
        )
    }
}

/// Manifest shape for registering a node over the HTTP API: `totals` uses
/// the same Kubernetes-style quantity strings as a container's resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeManifest {
    pub name: String,
    pub ip_address: String,
    #[serde(default)]
    pub totals: RawResourceMap,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl TryFrom<NodeManifest> for Node {
    type Error = ControlPlaneError;

    fn try_from(manifest: NodeManifest) -> Result<Self, Self::Error> {
        if manifest.name.trim().is_empty() {
            return Err(ControlPlaneError::InvalidInput(
                "node name must not be empty".to_string(),
            ));
        }
        let capacity = manifest.totals.parse()?;
        Ok(Node::new(manifest.name, capacity)
            .with_ip(manifest.ip_address)
            .with_labels(manifest.labels)
            .with_annotations(manifest.annotations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new("node-a", ResourceVector::new(2000, 4 << 30, 1, 0, 0))
    }

    #[test]
    fn can_schedule_checks_status_and_capacity() {
        let mut n = node();
        assert!(n.can_schedule(&ResourceVector::new(1000, 1 << 30, 0, 0, 0)));
        n.set_status(NodeStatus::NotReady);
        assert!(!n.can_schedule(&ResourceVector::new(1, 0, 0, 0, 0)));
    }

    #[test]
    fn add_pod_rejects_when_infeasible() {
        let mut n = node();
        let huge = ResourceVector::new(5000, 0, 0, 0, 0);
        let err = n.add_pod("default/web", huge).unwrap_err();
        assert!(matches!(err, ControlPlaneError::InsufficientResources { .. }));
    }

    #[test]
    fn add_then_remove_pod_restores_free_capacity() {
        let mut n = node();
        let req = ResourceVector::new(500, 1 << 20, 0, 0, 0);
        n.add_pod("default/web", req).unwrap();
        assert_eq!(n.allocated, req);
        n.remove_pod("default/web", req).unwrap();
        assert_eq!(n.allocated, ResourceVector::ZERO);
        assert!(n.pods.is_empty());
    }

    #[test]
    fn remove_pod_not_bound_is_a_no_op() {
        let mut n = node();
        n.remove_pod("default/ghost", ResourceVector::new(500, 0, 0, 0, 0))
            .unwrap();
        assert_eq!(n.allocated, ResourceVector::ZERO);
        assert!(n.pods.is_empty());
    }

    #[test]
    fn utilization_reflects_allocated_over_capacity() {
        let mut n = node();
        n.add_pod("default/web", ResourceVector::new(1000, 2 << 30, 0, 0, 0)).unwrap();
        let (cpu, mem, gpu) = n.utilization();
        assert_eq!(cpu, 0.5);
        assert_eq!(mem, 0.5);
        assert_eq!(gpu, 0.0);
    }

    #[test]
    fn manifest_parses_quantities_and_carries_metadata() {
        let manifest = NodeManifest {
            name: "node-a".to_string(),
            ip_address: "10.0.0.5".to_string(),
            totals: RawResourceMap {
                cpu: Some("4".to_string()),
                memory: Some("8Gi".to_string()),
                gpu: Some("2".to_string()),
                io: None,
                net: None,
            },
            labels: HashMap::from([("zone".to_string(), "us-east".to_string())]),
            annotations: HashMap::new(),
        };
        let node = Node::try_from(manifest).unwrap();
        assert_eq!(node.capacity, ResourceVector::new(4000, 8 << 30, 2, 0, 0));
        assert_eq!(node.ip_address, "10.0.0.5");
        assert_eq!(node.labels.get("zone").unwrap(), "us-east");
    }

    #[test]
    fn manifest_rejects_empty_name() {
        let manifest = NodeManifest {
            name: String::new(),
            ip_address: "10.0.0.5".to_string(),
            totals: RawResourceMap::default(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
        };
        assert!(Node::try_from(manifest).is_err());
    }
}
