//! 节点定义
//!
//! 两类节点：
//! - `LoadBalancerNode`: 承接业务流量的服务节点（负载均衡池成员）
//! - `ClusterNode`: 数据副本集成员（master / slave / arbiter）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 负载均衡节点状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeHealth {
    Healthy,
    Unhealthy,
    /// 下线前的终态，不再参与选择，也不再被健康检查翻转
    Draining,
}

/// 负载均衡节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerNode {
    /// 节点 ID
    pub id: String,
    /// 网络地址 (host:port 或 URL)
    pub address: String,
    /// 相对流量权重
    pub weight: u32,
    /// 当前状态
    pub status: NodeHealth,
    /// 活跃连接数
    pub active_connections: u64,
    /// 累计请求数
    pub total_requests: u64,
    /// 滚动错误率 (0.0 - 1.0)
    pub error_rate: f64,
    /// 最近一次响应时间（毫秒）
    pub response_time_ms: f64,
    /// 最近一次健康检查时间
    pub last_health_check: Option<DateTime<Utc>>,
    /// 同机部署的副本集成员 ID，未设置时与 `id` 相同
    #[serde(default)]
    pub cluster_id: Option<String>,
}

impl LoadBalancerNode {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            weight: 100,
            status: NodeHealth::Healthy,
            active_connections: 0,
            total_requests: 0,
            error_rate: 0.0,
            response_time_ms: 0.0,
            last_health_check: None,
            cluster_id: None,
        }
    }

    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }

    /// 该节点对应的副本集成员
    pub fn cluster_member(&self) -> &str {
        self.cluster_id.as_deref().unwrap_or(&self.id)
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_status(mut self, status: NodeHealth) -> Self {
        self.status = status;
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == NodeHealth::Healthy
    }
}

/// 副本集角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    /// 接受写入
    Master,
    /// 只读，复制数据
    Slave,
    /// 仅参与仲裁，不持有数据，永远不会被提升
    Arbiter,
}

/// 副本集成员状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterNodeStatus {
    Active,
    Standby,
    Syncing,
    Failed,
}

/// 提升后的优先级
pub const MAX_PRIORITY: u32 = 100;

/// 副本集成员
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: String,
    pub role: NodeRole,
    /// 提升优先级，越大越优先
    pub priority: u32,
    pub status: ClusterNodeStatus,
    pub last_sync: Option<DateTime<Utc>>,
    /// 复制延迟（毫秒）
    pub lag_ms: u64,
    /// 不透明的数据版本标记
    pub data_version: String,
    /// 存储端点
    pub endpoints: Vec<String>,
}

impl ClusterNode {
    pub fn new(id: impl Into<String>, role: NodeRole, priority: u32) -> Self {
        Self {
            id: id.into(),
            role,
            priority,
            status: ClusterNodeStatus::Active,
            last_sync: None,
            lag_ms: 0,
            data_version: String::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_lag(mut self, lag_ms: u64) -> Self {
        self.lag_ms = lag_ms;
        self
    }

    pub fn with_status(mut self, status: ClusterNodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    pub fn is_slave(&self) -> bool {
        self.role == NodeRole::Slave
    }

    pub fn is_active(&self) -> bool {
        self.status == ClusterNodeStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_balancer_node_defaults() {
        let node = LoadBalancerNode::new("lb1", "127.0.0.1:9001").with_weight(50);
        assert_eq!(node.weight, 50);
        assert!(node.is_healthy());
        assert_eq!(node.active_connections, 0);
        assert!(node.last_health_check.is_none());
    }

    #[test]
    fn test_role_serde_names() {
        let json = serde_json::to_string(&NodeRole::Master).unwrap();
        assert_eq!(json, "\"master\"");
        let status: NodeHealth = serde_json::from_str("\"draining\"").unwrap();
        assert_eq!(status, NodeHealth::Draining);
    }
}
