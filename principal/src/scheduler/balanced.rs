use models::{ControlPlaneError, Node, NodeStatus, Pod, ResourceVector};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::registry::NodeRegistry;
use crate::scheduler::ddqn::reward_for;

/// Per-resource weights applied when scoring a node. Equal weighting is the
/// spec's default; a deployment with GPU-heavy workloads might raise the
/// gpu weight to spread those out more aggressively.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory: 1.0,
            gpu: 1.0,
        }
    }
}

/// Two-phase filter-then-score scheduler: filter out nodes that can't take
/// the pod, score the rest by weighted utilization, bind to the lowest
/// score (i.e. the least-loaded feasible node), retrying once if another
/// scheduling decision raced it out of feasibility first.
pub struct BalancedScheduler {
    weights: ScoringWeights,
    last_reward: Mutex<f64>,
}

impl BalancedScheduler {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            weights,
            last_reward: Mutex::new(0.0),
        }
    }

    /// The reward from the most recently bound pod, computed with the same
    /// `reward_for` the DDQN scheduler learns from, so telemetry can log a
    /// comparable signal across both strategies even though this scheduler
    /// never consumes it itself. `0.0` before any pod has been scheduled.
    pub async fn last_reward(&self) -> f64 {
        *self.last_reward.lock().await
    }

    async fn record_reward(&self, node_name: &str, nodes: &NodeRegistry) {
        let snapshot = nodes.snapshot().await;
        let bound_index = snapshot.iter().position(|n| n.name == node_name).unwrap_or(0);
        let (reward, _done) = reward_for(&snapshot, bound_index);
        *self.last_reward.lock().await = reward;
    }

    fn score(&self, node: &Node) -> f64 {
        let (cpu, memory, gpu) = node.utilization();
        self.weights.cpu * cpu + self.weights.memory * memory + self.weights.gpu * gpu
    }

    fn candidates(&self, nodes: &[Node], requested: &ResourceVector) -> Vec<Node> {
        let mut feasible: Vec<Node> = nodes
            .iter()
            .filter(|n| matches!(n.status, NodeStatus::Ready) && n.can_schedule(requested))
            .cloned()
            .collect();
        feasible.sort_by(|a, b| {
            self.score(a)
                .partial_cmp(&self.score(b))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        feasible
    }

    /// `cancel` is consulted once, right before the bind that actually
    /// commits the decision: a token already cancelled at that point makes
    /// the call a no-op. Once bind has happened, cancellation is ignored --
    /// the pod is placed and nothing unwinds it.
    pub async fn schedule(
        &self,
        pod: &Pod,
        nodes: &NodeRegistry,
        cancel: &CancellationToken,
    ) -> Result<String, ControlPlaneError> {
        let requested = pod.resources().requests;
        let pod_key = pod.key();

        let snapshot = nodes.snapshot().await;
        let candidates = self.candidates(&snapshot, &requested);
        if candidates.is_empty() {
            return Err(ControlPlaneError::NoFeasibleNode(pod_key));
        }

        if cancel.is_cancelled() {
            return Err(ControlPlaneError::Cancelled(pod_key));
        }

        match nodes.bind(&candidates[0].name, &pod_key, requested).await {
            Ok(()) => {
                self.record_reward(&candidates[0].name, nodes).await;
                Ok(candidates[0].name.clone())
            }
            Err(ControlPlaneError::InsufficientResources { .. }) => {
                // Another decision raced us between snapshot and bind. Re-score
                // once against a fresh snapshot and try the new top candidate.
                let retry_snapshot = nodes.snapshot().await;
                let retry_candidates = self.candidates(&retry_snapshot, &requested);
                let next = retry_candidates
                    .first()
                    .ok_or_else(|| ControlPlaneError::NoFeasibleNode(pod_key.clone()))?;
                match nodes.bind(&next.name, &pod_key, requested).await {
                    Ok(()) => {
                        self.record_reward(&next.name, nodes).await;
                        Ok(next.name.clone())
                    }
                    Err(ControlPlaneError::InsufficientResources { .. }) => {
                        Err(ControlPlaneError::NoFeasibleNode(pod_key))
                    }
                    Err(other) => Err(other),
                }
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NodeRegistry;
    use models::Node;
    use std::sync::Arc;
    use store::InMemoryStore;
    use tokio_util::sync::CancellationToken;

    fn container_pod(namespace: &str, name: &str, cpu: i64, mem: i64) -> Pod {
        use models::{Container, ResourceRequirements};
        let container = Container::new(
            "web",
            "nginx",
            None,
            None,
            ResourceRequirements {
                requests: ResourceVector::new(cpu, mem, 0, 0, 0),
                limits: ResourceVector::new(cpu, mem, 0, 0, 0),
            },
        )
        .unwrap();
        Pod::new(namespace, name, vec![container]).unwrap()
    }

    async fn registry_with(nodes: Vec<Node>) -> NodeRegistry {
        let reg = NodeRegistry::new(Arc::new(InMemoryStore::new()));
        for node in nodes {
            reg.register(node).await.unwrap();
        }
        reg
    }

    #[tokio::test]
    async fn picks_least_utilized_feasible_node() {
        let mut busy = Node::new("node-a", ResourceVector::new(2000, 4 << 30, 0, 0, 0));
        busy.allocated = ResourceVector::new(1800, 0, 0, 0, 0);
        let idle = Node::new("node-b", ResourceVector::new(2000, 4 << 30, 0, 0, 0));
        let reg = registry_with(vec![busy, idle]).await;

        let scheduler = BalancedScheduler::new(ScoringWeights::default());
        let pod = container_pod("default", "web", 100, 1 << 20);
        let bound = scheduler.schedule(&pod, &reg, &CancellationToken::new()).await.unwrap();
        assert_eq!(bound, "node-b");
    }

    #[tokio::test]
    async fn ties_break_on_node_name() {
        let a = Node::new("node-a", ResourceVector::new(2000, 4 << 30, 0, 0, 0));
        let b = Node::new("node-b", ResourceVector::new(2000, 4 << 30, 0, 0, 0));
        let reg = registry_with(vec![b, a]).await;

        let scheduler = BalancedScheduler::new(ScoringWeights::default());
        let pod = container_pod("default", "web", 100, 1 << 20);
        let bound = scheduler.schedule(&pod, &reg, &CancellationToken::new()).await.unwrap();
        assert_eq!(bound, "node-a");
    }

    #[tokio::test]
    async fn no_feasible_node_is_reported() {
        let tiny = Node::new("node-a", ResourceVector::new(100, 1, 0, 0, 0));
        let reg = registry_with(vec![tiny]).await;

        let scheduler = BalancedScheduler::new(ScoringWeights::default());
        let pod = container_pod("default", "web", 5000, 1);
        let err = scheduler.schedule(&pod, &reg, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::NoFeasibleNode(_)));
    }

    #[tokio::test]
    async fn records_a_reward_after_a_successful_bind() {
        let idle = Node::new("node-a", ResourceVector::new(2000, 4 << 30, 0, 0, 0));
        let reg = registry_with(vec![idle]).await;

        let scheduler = BalancedScheduler::new(ScoringWeights::default());
        assert_eq!(scheduler.last_reward().await, 0.0);
        let pod = container_pod("default", "web", 100, 1 << 20);
        scheduler.schedule(&pod, &reg, &CancellationToken::new()).await.unwrap();
        assert!(scheduler.last_reward().await > 0.0);
    }

    #[tokio::test]
    async fn cancelled_before_bind_is_a_no_op() {
        let idle = Node::new("node-a", ResourceVector::new(2000, 4 << 30, 0, 0, 0));
        let reg = registry_with(vec![idle]).await;

        let scheduler = BalancedScheduler::new(ScoringWeights::default());
        let pod = container_pod("default", "web", 100, 1 << 20);
        let token = CancellationToken::new();
        token.cancel();
        let err = scheduler.schedule(&pod, &reg, &token).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Cancelled(_)));
        assert!(reg.snapshot().await[0].pods.is_empty());
    }
}
