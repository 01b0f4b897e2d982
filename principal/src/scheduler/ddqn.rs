use std::collections::VecDeque;

use models::{ControlPlaneError, Node, NodeStatus, Pod, ResourceVector};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::registry::NodeRegistry;

const HIDDEN1: usize = 4;
const HIDDEN2: usize = 8;
const FEATURES_PER_NODE: usize = 9; // allocated + free + pod_request, each (cpu, mem, gpu)
const REPLAY_CAPACITY: usize = 2000;
const BATCH_SIZE: usize = 8;
const TARGET_SYNC_EVERY: u64 = 10;
const EPSILON_MIN: f64 = 0.01;
const EPSILON_DECAY: f64 = 0.995;
const GAMMA: f64 = 0.95;
const LEARNING_RATE: f64 = 1e-3;

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn relu_grad(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let a2 = a.view().insert_axis(Axis(1));
    let b2 = b.view().insert_axis(Axis(0));
    a2.dot(&b2)
}

/// A forward pass, cached so the subsequent backward pass can reuse every
/// intermediate activation instead of recomputing it.
struct ForwardCache {
    x: Array1<f64>,
    z1: Array1<f64>,
    a1: Array1<f64>,
    z2: Array1<f64>,
    a2: Array1<f64>,
    output: Array1<f64>,
}

/// Two hidden dense layers over ReLU, a linear output layer producing one Q
/// value per node. Hand-rolled rather than built on an autodiff framework:
/// the network is tiny (a handful of hundred parameters for any realistic
/// fleet size) and a full backprop graph would be a lot of machinery for
/// three matrix multiplies.
#[derive(Clone)]
struct QNetwork {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
    w3: Array2<f64>,
    b3: Array1<f64>,
}

impl QNetwork {
    fn new(input_dim: usize, output_dim: usize, rng: &mut StdRng) -> Self {
        let init = |rows: usize, cols: usize, rng: &mut StdRng| {
            Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-0.1..0.1))
        };
        Self {
            w1: init(input_dim, HIDDEN1, rng),
            b1: Array1::zeros(HIDDEN1),
            w2: init(HIDDEN1, HIDDEN2, rng),
            b2: Array1::zeros(HIDDEN2),
            w3: init(HIDDEN2, output_dim, rng),
            b3: Array1::zeros(output_dim),
        }
    }

    fn forward(&self, x: &Array1<f64>) -> ForwardCache {
        let z1 = x.dot(&self.w1) + &self.b1;
        let a1 = z1.mapv(relu);
        let z2 = a1.dot(&self.w2) + &self.b2;
        let a2 = z2.mapv(relu);
        let output = a2.dot(&self.w3) + &self.b3;
        ForwardCache {
            x: x.clone(),
            z1,
            a1,
            z2,
            a2,
            output,
        }
    }

    /// Single SGD step against the squared-error gradient for one action's
    /// Q value. Every other output index contributes zero gradient, since
    /// the target only constrains the action that was actually taken.
    fn train_step(&mut self, cache: &ForwardCache, action: usize, target_value: f64, lr: f64) {
        let mut d_output = Array1::zeros(cache.output.len());
        d_output[action] = 2.0 * (cache.output[action] - target_value);

        let d_w3 = outer(&cache.a2, &d_output);
        let d_b3 = d_output.clone();
        let d_a2 = self.w3.dot(&d_output);
        let d_z2 = &d_a2 * &cache.z2.mapv(relu_grad);

        let d_w2 = outer(&cache.a1, &d_z2);
        let d_b2 = d_z2.clone();
        let d_a1 = self.w2.dot(&d_z2);
        let d_z1 = &d_a1 * &cache.z1.mapv(relu_grad);

        let d_w1 = outer(&cache.x, &d_z1);
        let d_b1 = d_z1;

        self.w3 = &self.w3 - &(d_w3 * lr);
        self.b3 = &self.b3 - &(d_b3 * lr);
        self.w2 = &self.w2 - &(d_w2 * lr);
        self.b2 = &self.b2 - &(d_b2 * lr);
        self.w1 = &self.w1 - &(d_w1 * lr);
        self.b1 = &self.b1 - &(d_b1 * lr);
    }
}

struct Transition {
    state: Array1<f64>,
    action: usize,
    reward: f64,
    next_state: Array1<f64>,
    done: bool,
}

struct DdqnState {
    node_count: usize,
    online: QNetwork,
    target: QNetwork,
    replay: VecDeque<Transition>,
    epsilon: f64,
    updates: u64,
    rng: StdRng,
    norm_max: Array1<f64>,
    norm_fitted: bool,
}

impl DdqnState {
    fn fresh(node_count: usize, mut rng: StdRng) -> Self {
        let input_dim = FEATURES_PER_NODE * node_count;
        let online = QNetwork::new(input_dim, node_count, &mut rng);
        let target = online.clone();
        Self {
            node_count,
            online,
            target,
            replay: VecDeque::with_capacity(REPLAY_CAPACITY),
            epsilon: 1.0,
            updates: 0,
            rng,
            norm_max: Array1::ones(input_dim),
            norm_fitted: false,
        }
    }

    /// Fits the per-column max divisor from the first fleet snapshot this
    /// state ever sees and never touches it again -- a network rebuilt for a
    /// fleet resize gets its own one-time fit against the resized fleet, but
    /// within one `DdqnState`'s lifetime the normalizer never moves, so the
    /// network's inputs stay on a consistent scale across the run.
    fn fit_norm(&mut self, nodes: &[Node]) {
        if self.norm_fitted || nodes.is_empty() {
            return;
        }
        let mut norm = vec![1.0f64; FEATURES_PER_NODE * self.node_count];
        for (i, node) in nodes.iter().enumerate() {
            let base = i * FEATURES_PER_NODE;
            let cpu_max = (node.capacity.cpu as f64).max(1.0);
            let mem_max = (node.capacity.memory as f64).max(1.0);
            let gpu_max = (node.capacity.gpu as f64).max(1.0);
            for group in 0..3 {
                let g = base + group * 3;
                norm[g] = cpu_max;
                norm[g + 1] = mem_max;
                norm[g + 2] = gpu_max;
            }
        }
        self.norm_max = Array1::from_vec(norm);
        self.norm_fitted = true;
    }
}

/// DDQN-driven scheduler. The action space is `K`, the live node count.
/// `schedule` rebuilds both networks and discards the replay buffer whenever
/// the live fleet size no longer matches `K`, since a network with a fixed
/// output width can't have its action space changed any other way.
pub struct DdqnScheduler {
    seed: u64,
    state: Mutex<DdqnState>,
}

impl DdqnScheduler {
    pub fn new(node_count: usize, seed: u64) -> Self {
        let node_count = node_count.max(1);
        let rng = StdRng::seed_from_u64(seed);
        Self {
            seed,
            state: Mutex::new(DdqnState::fresh(node_count, rng)),
        }
    }

    fn ordered_nodes(nodes: Vec<Node>) -> Vec<Node> {
        let mut nodes = nodes;
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Raw units (allocated/free/requested cpu, memory, gpu per node) scaled
    /// by `norm`, the per-column max fitted once from the fleet this
    /// scheduler first saw. Memory in particular spans a range of roughly
    /// nine orders of magnitude from millicores, so feeding it to the network
    /// unscaled would make the gradient dominated entirely by whichever
    /// column happens to have the largest raw units.
    fn encode_state(
        node_count: usize,
        nodes: &[Node],
        requested: &ResourceVector,
        norm: &Array1<f64>,
    ) -> Array1<f64> {
        let mut features = vec![0.0f64; FEATURES_PER_NODE * node_count];
        for (i, node) in nodes.iter().enumerate() {
            let base = i * FEATURES_PER_NODE;
            let free = node.free();
            features[base] = node.allocated.cpu as f64;
            features[base + 1] = node.allocated.memory as f64;
            features[base + 2] = node.allocated.gpu as f64;
            features[base + 3] = free.cpu as f64;
            features[base + 4] = free.memory as f64;
            features[base + 5] = free.gpu as f64;
            features[base + 6] = requested.cpu as f64;
            features[base + 7] = requested.memory as f64;
            features[base + 8] = requested.gpu as f64;
        }
        Array1::from_vec(features) / norm
    }

    /// Feasibility-aware exploration move: among nodes that can actually
    /// take the pod, pick the one minimizing utilization less slack, same
    /// shape as the balanced scheduler's score but used only when epsilon
    /// exploration fires, so the agent doesn't waste rollouts on moves that
    /// are guaranteed to fail.
    fn heuristic_action(&self, nodes: &[Node], requested: &ResourceVector) -> Option<usize> {
        nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.can_schedule(requested))
            .min_by(|(_, a), (_, b)| {
                heuristic_score(a, requested)
                    .partial_cmp(&heuristic_score(b, requested))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
    }

    fn greedy_action(&self, output: &Array1<f64>, nodes: &[Node], requested: &ResourceVector) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, node) in nodes.iter().enumerate() {
            if !node.can_schedule(requested) {
                continue;
            }
            let q = output[i];
            if best.map(|(_, best_q)| q > best_q).unwrap_or(true) {
                best = Some((i, q));
            }
        }
        best.map(|(i, _)| i)
    }

    /// `cancel` is consulted once, right before the bind that actually
    /// commits the decision: a token already cancelled at that point makes
    /// the call a no-op, with no transition recorded. Once bind has
    /// happened, cancellation is ignored -- the pod is placed and nothing
    /// unwinds it.
    pub async fn schedule(
        &self,
        pod: &Pod,
        nodes: &NodeRegistry,
        cancel: &CancellationToken,
    ) -> Result<String, ControlPlaneError> {
        let requested = pod.resources().requests;
        let pod_key = pod.key();
        let snapshot = Self::ordered_nodes(nodes.snapshot().await);

        let mut state = self.state.lock().await;

        // The action space is exactly the live fleet size. A fleet that grew
        // or shrank since the networks were built invalidates both the input
        // width and the output width, so there is nothing to salvage: rebuild
        // from scratch and drop whatever was in the replay buffer.
        if !snapshot.is_empty() && snapshot.len() != state.node_count {
            let rng = StdRng::seed_from_u64(self.seed);
            *state = DdqnState::fresh(snapshot.len(), rng);
        }
        let node_count = state.node_count;
        state.fit_norm(&snapshot);
        let norm = state.norm_max.clone();

        let encoded = Self::encode_state(node_count, &snapshot, &requested, &norm);
        let explore = state.rng.gen::<f64>() < state.epsilon;
        let action = if explore {
            self.heuristic_action(&snapshot, &requested)
        } else {
            let cache = state.online.forward(&encoded);
            self.greedy_action(&cache.output, &snapshot, &requested)
        };

        let action = match action {
            Some(a) => a,
            None => return Err(ControlPlaneError::NoFeasibleNode(pod_key)),
        };
        let target_node = snapshot[action].name.clone();

        if cancel.is_cancelled() {
            return Err(ControlPlaneError::Cancelled(pod_key));
        }

        let bind_result = nodes.bind(&target_node, &pod_key, requested).await;
        if let Err(ControlPlaneError::InsufficientResources { .. }) = &bind_result {
            state.replay.push_back(Transition {
                state: encoded.clone(),
                action,
                reward: -1.0,
                next_state: encoded.clone(),
                done: true,
            });
            if state.replay.len() > REPLAY_CAPACITY {
                state.replay.pop_front();
            }
        }
        bind_result?;

        let after = Self::ordered_nodes(nodes.snapshot().await);
        let (reward, done) = reward_for(&after, action);
        let next_state = Self::encode_state(node_count, &after, &ResourceVector::ZERO, &norm);

        state.replay.push_back(Transition {
            state: encoded,
            action,
            reward,
            next_state,
            done,
        });
        if state.replay.len() > REPLAY_CAPACITY {
            state.replay.pop_front();
        }

        if state.replay.len() >= BATCH_SIZE {
            self.replay_batch(&mut state);
            state.epsilon = (state.epsilon * EPSILON_DECAY).max(EPSILON_MIN);
            state.updates += 1;
            if state.updates % TARGET_SYNC_EVERY == 0 {
                state.target = state.online.clone();
            }
        }

        Ok(target_node)
    }

    /// The reward from the most recently recorded transition, for telemetry
    /// callers that want to log what the agent just got for a placement.
    /// `0.0` before any transition has been recorded.
    pub async fn last_reward(&self) -> f64 {
        self.state
            .lock()
            .await
            .replay
            .back()
            .map(|t| t.reward)
            .unwrap_or(0.0)
    }

    /// One Double-DQN gradient step per buffered transition in the most
    /// recent batch: the online network picks the next action, the target
    /// network evaluates it, avoiding the single-network overestimation
    /// bias a vanilla DQN target would have.
    fn replay_batch(&self, state: &mut DdqnState) {
        let len = state.replay.len();
        let start = len - BATCH_SIZE;
        for idx in start..len {
            let (online_next, target_next, reward, done, action, sample_state) = {
                let transition = &state.replay[idx];
                let online_next = state.online.forward(&transition.next_state).output;
                let target_next = state.target.forward(&transition.next_state).output;
                (
                    online_next,
                    target_next,
                    transition.reward,
                    transition.done,
                    transition.action,
                    transition.state.clone(),
                )
            };

            let best_next_action = online_next
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0);

            let target_value = if done {
                reward
            } else {
                reward + GAMMA * target_next[best_next_action]
            };

            let cache = state.online.forward(&sample_state);
            state.online.train_step(&cache, action, target_value, LEARNING_RATE);
        }
    }
}

fn heuristic_score(node: &Node, requested: &ResourceVector) -> f64 {
    let (cpu_u, mem_u, gpu_u) = node.utilization();
    let util = (cpu_u + mem_u + gpu_u) / 3.0;
    let after_free = node.free() - *requested;
    let slack = (ResourceVector::utilization(node.capacity.cpu, after_free.cpu.max(0))
        + ResourceVector::utilization(node.capacity.memory, after_free.memory.max(0))
        + ResourceVector::utilization(node.capacity.gpu, after_free.gpu.max(0)))
        / 3.0;
    util - slack
}

fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Base reward is `1 - mean utilization` of the node just bound to; a load
/// balance bonus rewards keeping the whole Ready fleet's utilization even,
/// each computed per resource and averaged. Binding to a NotReady or
/// otherwise infeasible node (shouldn't happen given the action mask, but
/// kept as a guard) ends the episode with a fixed penalty.
pub(crate) fn reward_for(nodes: &[Node], bound_index: usize) -> (f64, bool) {
    let Some(node) = nodes.get(bound_index) else {
        return (-1.0, true);
    };
    if !matches!(node.status, NodeStatus::Ready) {
        return (-1.0, true);
    }

    let (cpu_u, mem_u, gpu_u) = node.utilization();
    let base = 1.0 - (cpu_u + mem_u + gpu_u) / 3.0;

    let ready: Vec<&Node> = nodes.iter().filter(|n| matches!(n.status, NodeStatus::Ready)).collect();
    let cpu_values: Vec<f64> = ready.iter().map(|n| n.utilization().0).collect();
    let mem_values: Vec<f64> = ready.iter().map(|n| n.utilization().1).collect();
    let gpu_values: Vec<f64> = ready.iter().map(|n| n.utilization().2).collect();

    let total_gpu: i64 = ready.iter().map(|n| n.capacity.gpu).sum();
    let lb_cpu = 1.0 / (1.0 + stddev(&cpu_values));
    let lb_mem = 1.0 / (1.0 + stddev(&mem_values));
    let lb_gpu = if total_gpu == 0 { 1.0 } else { 1.0 / (1.0 + stddev(&gpu_values)) };

    let reward = base + 0.5 * ((lb_cpu + lb_mem + lb_gpu) / 3.0);
    (reward, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NodeRegistry;
    use models::{Container, Node, ResourceRequirements};
    use std::sync::Arc;
    use store::InMemoryStore;
    use tokio_util::sync::CancellationToken;

    fn container_pod(namespace: &str, name: &str, cpu: i64, mem: i64) -> Pod {
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
    async fn schedules_to_a_feasible_node() {
        let nodes = vec![
            Node::new("node-a", ResourceVector::new(2000, 4 << 30, 0, 0, 0)),
            Node::new("node-b", ResourceVector::new(2000, 4 << 30, 0, 0, 0)),
        ];
        let reg = registry_with(nodes).await;
        let scheduler = DdqnScheduler::new(2, 7);
        let pod = container_pod("default", "web", 500, 1 << 20);
        let bound = scheduler.schedule(&pod, &reg, &CancellationToken::new()).await.unwrap();
        assert!(bound == "node-a" || bound == "node-b");
    }

    #[tokio::test]
    async fn cancelled_before_bind_is_a_no_op() {
        let nodes = vec![Node::new("node-a", ResourceVector::new(2000, 4 << 30, 0, 0, 0))];
        let reg = registry_with(nodes).await;
        let scheduler = DdqnScheduler::new(1, 7);
        let pod = container_pod("default", "web", 500, 1 << 20);
        let token = CancellationToken::new();
        token.cancel();
        let err = scheduler.schedule(&pod, &reg, &token).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Cancelled(_)));
        assert!(reg.snapshot().await[0].pods.is_empty());
    }

    #[tokio::test]
    async fn no_feasible_node_is_reported() {
        let nodes = vec![Node::new("node-a", ResourceVector::new(100, 1, 0, 0, 0))];
        let reg = registry_with(nodes).await;
        let scheduler = DdqnScheduler::new(1, 7);
        let pod = container_pod("default", "web", 5000, 1);
        let err = scheduler.schedule(&pod, &reg, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::NoFeasibleNode(_)));
    }

    #[tokio::test]
    async fn replay_triggers_after_batch_size_transitions() {
        let nodes = vec![
            Node::new("node-a", ResourceVector::new(20000, 64 << 30, 0, 0, 0)),
            Node::new("node-b", ResourceVector::new(20000, 64 << 30, 0, 0, 0)),
        ];
        let reg = registry_with(nodes).await;
        let scheduler = DdqnScheduler::new(2, 11);
        for i in 0..BATCH_SIZE + 1 {
            let pod = container_pod("default", &format!("web-{i}"), 10, 1 << 10);
            scheduler.schedule(&pod, &reg, &CancellationToken::new()).await.unwrap();
        }
        let state = scheduler.state.lock().await;
        assert!(state.epsilon < 1.0);
    }

    #[tokio::test]
    async fn fleet_resize_rebuilds_networks_and_drops_replay() {
        let reg = registry_with(vec![Node::new(
            "node-a",
            ResourceVector::new(20000, 64 << 30, 0, 0, 0),
        )])
        .await;
        let scheduler = DdqnScheduler::new(1, 3);
        for i in 0..BATCH_SIZE {
            let pod = container_pod("default", &format!("seed-{i}"), 10, 1 << 10);
            scheduler.schedule(&pod, &reg, &CancellationToken::new()).await.unwrap();
        }
        assert!(!scheduler.state.lock().await.replay.is_empty());

        reg.register(Node::new("node-b", ResourceVector::new(20000, 64 << 30, 0, 0, 0)))
            .await
            .unwrap();

        let pod = container_pod("default", "after-resize", 10, 1 << 10);
        scheduler.schedule(&pod, &reg, &CancellationToken::new()).await.unwrap();

        let state = scheduler.state.lock().await;
        assert_eq!(state.node_count, 2);
        assert_eq!(state.replay.len(), 1);
        assert_eq!(state.epsilon, 1.0);
    }

    #[test]
    fn reward_prefers_balanced_fleet() {
        let mut a = Node::new("node-a", ResourceVector::new(2000, 4 << 30, 0, 0, 0));
        a.allocated = ResourceVector::new(1000, 2 << 30, 0, 0, 0);
        let b = Node::new("node-b", ResourceVector::new(2000, 4 << 30, 0, 0, 0));
        let (reward, done) = reward_for(&[a, b], 0);
        assert!(!done);
        assert!(reward > 0.0);
    }
}
