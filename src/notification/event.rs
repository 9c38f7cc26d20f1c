//! 高可用领域事件

use serde::{Deserialize, Serialize};

/// 领域事件（供仪表盘、告警等外部订阅者消费）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HaEvent {
    /// 节点连续探测失败达到阈值
    NodeUnhealthy {
        node_id: String,
        consecutive_failures: u32,
        timestamp: String,
    },

    /// 节点连续探测成功达到阈值
    NodeHealthy {
        node_id: String,
        consecutive_successes: u32,
        timestamp: String,
    },

    FailoverStarted {
        from_node: Option<String>,
        reason: String,
        timestamp: String,
    },

    FailoverCompleted {
        event_id: String,
        from_node: Option<String>,
        to_node: String,
        duration_ms: u64,
        timestamp: String,
    },

    FailoverFailed {
        reason: String,
        error: String,
        timestamp: String,
    },

    /// 副本延迟超过 max_lag
    ReplicationLag {
        node_id: String,
        lag_ms: u64,
        threshold_ms: u64,
        timestamp: String,
    },

    /// 活跃副本集节点少于 2 个
    Degraded {
        active_nodes: usize,
        timestamp: String,
    },

    Recovered {
        active_nodes: usize,
        timestamp: String,
    },
}

impl HaEvent {
    /// 事件名（对外订阅使用的名字）
    pub fn name(&self) -> &'static str {
        match self {
            HaEvent::NodeUnhealthy { .. } => "node:unhealthy",
            HaEvent::NodeHealthy { .. } => "node:healthy",
            HaEvent::FailoverStarted { .. } => "failover:started",
            HaEvent::FailoverCompleted { .. } => "failover:completed",
            HaEvent::FailoverFailed { .. } => "failover:failed",
            HaEvent::ReplicationLag { .. } => "replication:lag",
            HaEvent::Degraded { .. } => "ha:degraded",
            HaEvent::Recovered { .. } => "ha:recovered",
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"type\":\"{}\"}}", self.name()))
    }
}

/// 事件时间戳 (RFC 3339)
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
