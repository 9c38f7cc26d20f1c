//! 节点注册表
//!
//! 保存负载均衡节点与副本集节点的实时状态。两个列表都保持配置顺序，
//! least-connections 的平局按该顺序打破。

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::node::{ClusterNode, ClusterNodeStatus, LoadBalancerNode, NodeHealth};
use crate::{HaError, Result};

/// 节点清单快照 (getNodes)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInventory {
    pub load_balancer: Vec<LoadBalancerNode>,
    pub cluster: Vec<ClusterNode>,
}

/// 节点注册表
#[derive(Debug, Default)]
pub struct NodeRegistry {
    load_balancer: Arc<RwLock<Vec<LoadBalancerNode>>>,
    cluster: Arc<RwLock<Vec<ClusterNode>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(load_balancer: Vec<LoadBalancerNode>, cluster: Vec<ClusterNode>) -> Self {
        Self {
            load_balancer: Arc::new(RwLock::new(load_balancer)),
            cluster: Arc::new(RwLock::new(cluster)),
        }
    }

    /// 添加负载均衡节点（同 ID 覆盖）
    pub fn add_load_balancer_node(&self, node: LoadBalancerNode) {
        let mut nodes = self.load_balancer.write();
        match nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node,
            None => {
                log::info!("Load balancer node {} registered at {}", node.id, node.address);
                nodes.push(node);
            }
        }
    }

    /// 添加副本集节点（同 ID 覆盖）
    pub fn add_cluster_node(&self, node: ClusterNode) {
        let mut nodes = self.cluster.write();
        match nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node,
            None => {
                log::info!("Cluster node {} registered as {:?}", node.id, node.role);
                nodes.push(node);
            }
        }
    }

    pub fn load_balancer_nodes(&self) -> Vec<LoadBalancerNode> {
        self.load_balancer.read().clone()
    }

    pub fn cluster_nodes(&self) -> Vec<ClusterNode> {
        self.cluster.read().clone()
    }

    pub fn inventory(&self) -> NodeInventory {
        NodeInventory {
            load_balancer: self.load_balancer_nodes(),
            cluster: self.cluster_nodes(),
        }
    }

    pub fn load_balancer_node(&self, id: &str) -> Option<LoadBalancerNode> {
        self.load_balancer.read().iter().find(|n| n.id == id).cloned()
    }

    pub fn cluster_node(&self, id: &str) -> Option<ClusterNode> {
        self.cluster.read().iter().find(|n| n.id == id).cloned()
    }

    /// 当前 role == master 的节点（按注册顺序取第一个）
    pub fn master(&self) -> Option<ClusterNode> {
        self.cluster.read().iter().find(|n| n.is_master()).cloned()
    }

    pub fn healthy_nodes(&self) -> Vec<LoadBalancerNode> {
        self.load_balancer
            .read()
            .iter()
            .filter(|n| n.is_healthy())
            .cloned()
            .collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.load_balancer.read().iter().filter(|n| n.is_healthy()).count()
    }

    pub fn active_cluster_count(&self) -> usize {
        self.cluster.read().iter().filter(|n| n.is_active()).count()
    }

    /// 在写锁内对负载均衡节点列表执行操作
    ///
    /// 选择与计数更新必须在同一把锁内完成，下一次调用才能看到副作用。
    pub(crate) fn with_load_balancer_mut<R>(
        &self,
        f: impl FnOnce(&mut Vec<LoadBalancerNode>) -> R,
    ) -> R {
        let mut nodes = self.load_balancer.write();
        f(&mut nodes)
    }

    pub(crate) fn update_load_balancer_node<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut LoadBalancerNode) -> R,
    ) -> Result<R> {
        let mut nodes = self.load_balancer.write();
        let node = nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| HaError::NodeNotFound(id.to_string()))?;
        Ok(f(node))
    }

    pub(crate) fn update_cluster_node<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut ClusterNode) -> R,
    ) -> Result<R> {
        let mut nodes = self.cluster.write();
        let node = nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| HaError::NodeNotFound(id.to_string()))?;
        Ok(f(node))
    }

    /// 记录一次请求：活跃连接 +1，累计请求 +1
    pub fn record_request(&self, id: &str) -> Result<()> {
        self.update_load_balancer_node(id, |node| {
            node.active_connections += 1;
            node.total_requests += 1;
        })
    }

    /// 释放连接（不会减到负数）
    pub fn release_connection(&self, id: &str) -> Result<()> {
        self.update_load_balancer_node(id, |node| {
            node.active_connections = node.active_connections.saturating_sub(1);
        })
    }

    /// 写入外部测得的节点指标
    pub fn update_node_metrics(
        &self,
        id: &str,
        response_time_ms: Option<f64>,
        error_rate: Option<f64>,
    ) -> Result<()> {
        if let Some(rate) = error_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(HaError::InvalidParameter(format!(
                    "error rate {} out of range [0, 1]",
                    rate
                )));
            }
        }

        self.update_load_balancer_node(id, |node| {
            if let Some(rt) = response_time_ms {
                node.response_time_ms = rt;
            }
            if let Some(rate) = error_rate {
                node.error_rate = rate;
            }
        })
    }

    /// 将节点标记为 draining（之后不再参与选择）
    pub fn drain(&self, id: &str) -> Result<()> {
        self.update_load_balancer_node(id, |node| {
            node.status = NodeHealth::Draining;
        })?;
        log::info!("Load balancer node {} is draining", id);
        Ok(())
    }

    /// 将承载某个副本集成员的所有服务节点置为 draining，返回数量
    pub fn drain_cluster_member(&self, cluster_id: &str) -> usize {
        let mut drained = 0;
        for node in self.load_balancer.write().iter_mut() {
            if node.cluster_member() == cluster_id {
                node.status = NodeHealth::Draining;
                drained += 1;
                log::info!("Load balancer node {} is draining", node.id);
            }
        }
        drained
    }

    pub(crate) fn touch_health_check(&self, id: &str) {
        let _ = self.update_load_balancer_node(id, |node| {
            node.last_health_check = Some(Utc::now());
        });
    }

    /// 外部上报副本集节点故障（master 看门狗据此触发故障转移）
    pub fn mark_cluster_node_failed(&self, id: &str) -> Result<()> {
        self.update_cluster_node(id, |node| node.status = ClusterNodeStatus::Failed)?;
        log::warn!("Cluster node {} reported failed", id);
        Ok(())
    }
}
