//! 故障转移记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverTrigger {
    Manual,
    Automatic,
    Scheduled,
}

/// 故障转移事件（追加写入历史，创建后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub trigger: FailoverTrigger,
    pub from_node: Option<String>,
    pub to_node: String,
    pub reason: String,
    pub duration_ms: u64,
    pub data_loss: bool,
    pub rollback_available: bool,
}

/// 状态机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverState {
    Stable,
    FailoverInProgress,
    /// 已稳定，但活跃副本不足 2 个
    StableWithDegradedReplica,
}

/// 故障转移错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FailoverError {
    #[error("Failover already in progress")]
    AlreadyInProgress,

    #[error("No promotion candidate available")]
    NoCandidate,

    #[error("Pre-failover check failed on {node_id}: {reason}")]
    PreCheckFailed { node_id: String, reason: String },

    #[error("Replication sync timeout on {node_id}: lag {last_lag_ms}ms after {waited_ms}ms")]
    SyncTimeout {
        node_id: String,
        last_lag_ms: u64,
        waited_ms: u64,
    },

    #[error("Promotion failed: {0}")]
    PromotionFailed(String),

    #[error("Write path error: {0}")]
    WriteGate(String),

    #[error("Failover policy is manual, automatic trigger ignored")]
    PolicyForbidsAutomatic,
}

impl FailoverError {
    /// 是否在修改任何节点之前就已中止
    pub fn aborted_before_mutation(&self) -> bool {
        matches!(
            self,
            FailoverError::AlreadyInProgress
                | FailoverError::NoCandidate
                | FailoverError::PreCheckFailed { .. }
                | FailoverError::PolicyForbidsAutomatic
        )
    }
}
