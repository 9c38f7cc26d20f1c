//! 选择引擎
//!
//! 每个入站请求调用一次 `select_node`：
//! 1. 只在 healthy 节点中选择，没有则返回 None（调用方处理"无容量"）
//! 2. 开启会话保持且映射节点仍 healthy 时直接返回，跳过算法
//! 3. 否则按策略选择
//! 4. 选中节点 active_connections +1、total_requests +1（同一把锁内完成）

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::time::Duration;

use super::affinity::SessionAffinityMap;
use super::request::RoutingRequest;
use super::strategy::{LoadBalancingStrategy, StrategyKind};
use crate::cluster::{LoadBalancerNode, NodeRegistry};

/// MD5 前 8 个十六进制字符（即前 4 字节大端）取模
pub fn hash_index(key: &str, n: usize) -> usize {
    let digest = md5::compute(key.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix as usize % n
}

/// 选择引擎
pub struct SelectionEngine {
    registry: Arc<NodeRegistry>,
    default_strategy: LoadBalancingStrategy,
    affinity: Arc<SessionAffinityMap>,
    rr_counter: AtomicUsize,
}

impl SelectionEngine {
    pub fn new(
        registry: Arc<NodeRegistry>,
        default_strategy: LoadBalancingStrategy,
        affinity: Arc<SessionAffinityMap>,
    ) -> Self {
        Self {
            registry,
            default_strategy,
            affinity,
            rr_counter: AtomicUsize::new(0),
        }
    }

    pub fn default_strategy(&self) -> &LoadBalancingStrategy {
        &self.default_strategy
    }

    pub fn affinity(&self) -> &Arc<SessionAffinityMap> {
        &self.affinity
    }

    /// 为请求选择节点
    pub fn select_node(
        &self,
        request: &RoutingRequest,
        strategy: Option<&LoadBalancingStrategy>,
    ) -> Option<LoadBalancerNode> {
        let strategy = strategy.unwrap_or(&self.default_strategy);
        let client_id = request.client_identity();
        let pinned = if strategy.session_affinity {
            self.affinity.lookup(&client_id)
        } else {
            None
        };

        let selected = self.registry.with_load_balancer_mut(|nodes| {
            let healthy: Vec<usize> = nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.is_healthy())
                .map(|(i, _)| i)
                .collect();

            if healthy.is_empty() {
                return None;
            }

            let pinned_idx = pinned
                .as_deref()
                .and_then(|id| healthy.iter().copied().find(|&i| nodes[i].id == id));

            let idx = match pinned_idx {
                Some(i) => i,
                None => self.dispatch(strategy.kind, nodes, &healthy, &client_id, request),
            };

            let node = &mut nodes[idx];
            node.active_connections += 1;
            node.total_requests += 1;
            Some(node.clone())
        });

        match selected {
            Some(node) => {
                if strategy.session_affinity {
                    self.affinity.bind(
                        client_id,
                        node.id.clone(),
                        Duration::from_secs(strategy.session_timeout_secs),
                    );
                }
                log::trace!("Selected {} via {}", node.id, strategy.kind.as_str());
                Some(node)
            }
            None => {
                log::warn!("No healthy node available for {}", request.path);
                None
            }
        }
    }

    /// 按算法在 healthy 下标中选择
    fn dispatch(
        &self,
        kind: StrategyKind,
        nodes: &[LoadBalancerNode],
        healthy: &[usize],
        client_id: &str,
        request: &RoutingRequest,
    ) -> usize {
        match kind {
            StrategyKind::RoundRobin => {
                let n = self.rr_counter.fetch_add(1, Ordering::Relaxed);
                healthy[n % healthy.len()]
            }
            StrategyKind::LeastConnections => healthy
                .iter()
                .copied()
                .min_by_key(|&i| nodes[i].active_connections)
                .unwrap_or(healthy[0]),
            StrategyKind::Weighted => weighted_pick(nodes, healthy, &mut rand::thread_rng()),
            StrategyKind::IpHash => healthy[hash_index(client_id, healthy.len())],
            StrategyKind::ConsistentHash => healthy[hash_index(&request.path, healthy.len())],
        }
    }
}

/// 在 [0, 总权重) 取随机数，依次减去权重直到余数 <= 0
fn weighted_pick(nodes: &[LoadBalancerNode], healthy: &[usize], rng: &mut impl Rng) -> usize {
    let total: u64 = healthy.iter().map(|&i| nodes[i].weight as u64).sum();
    if total == 0 {
        return healthy[0];
    }

    let mut remaining = rng.gen::<f64>() * total as f64;
    for &i in healthy {
        let weight = nodes[i].weight;
        if weight == 0 {
            continue;
        }
        remaining -= weight as f64;
        if remaining <= 0.0 {
            return i;
        }
    }
    healthy[healthy.len() - 1]
}
