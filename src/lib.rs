//! # QAHA-RS
//!
//! 高可用控制面：负载均衡、健康检查、主从复制监控与故障转移
//!
//! ## 核心能力
//!
//! - **节点注册表**: 负载均衡节点 + 副本集成员，进程内唯一数据源
//! - **健康检查**: HTTP/TCP 探针，连续阈值滞回判定
//! - **选择引擎**: round-robin / least-connections / weighted / ip-hash / consistent-hash + 会话保持
//! - **复制监控**: 延迟与一致性巡检，超限告警
//! - **故障转移**: 候选选择 → 预检查 → 暂停写入 → 同步等待 → 提升/降级 → 恢复写入
//! - **指标聚合**: 可用率、故障转移耗时、rps、错误率 (Prometheus 导出)
//! - **对外服务**: 进程内 API + HTTP 管理接口 (基于 Actix-web)
//!
//! ## 架构设计
//!
//! ```text
//! 应用层 (HTTP 中间件 / 管理面板)
//!     ↓
//! Service Layer (service/)
//!     ↓
//! Balancer (balancer/) ── Failover (failover/)
//!     ↓                        ↓
//! Node Registry (cluster/) ← Health (health/) / Replication (replication/)
//!     ↓
//! Events (notification/) → 订阅者
//! ```

// ============================================================================
// 外部依赖
// ============================================================================

// Web 框架
pub use actix_web;

// 异步运行时
pub use futures;
pub use tokio;

// 并发工具
pub use dashmap;
pub use parking_lot;

// 序列化
pub use serde;
pub use serde_json;

// 时间
pub use chrono;

// 日志
pub use log;

// 错误处理
pub use anyhow;
pub use thiserror;

// ============================================================================
// 内部模块
// ============================================================================

/// 节点注册表
pub mod cluster;

/// 健康检查
pub mod health;

/// 负载均衡选择引擎
pub mod balancer;

/// 复制监控
pub mod replication;

/// 故障转移协调
pub mod failover;

/// 高可用指标
pub mod metrics;

/// 事件通知
pub mod notification;

/// 对外服务层 (进程内 API + HTTP)
pub mod service;

/// 工具模块
pub mod utils;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use balancer::{LoadBalancingStrategy, RoutingRequest, StrategyKind};
pub use cluster::{ClusterNode, LoadBalancerNode, NodeRegistry};
pub use failover::{FailoverError, FailoverEvent, FailoverTrigger};
pub use metrics::HAMetrics;
pub use notification::HaEvent;
pub use service::HaService;
pub use utils::config::HaConfig;

// ============================================================================
// 全局错误类型
// ============================================================================

/// 高可用错误类型
#[derive(Debug, thiserror::Error)]
pub enum HaError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Probe error: {0}")]
    ProbeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<std::io::Error> for HaError {
    fn from(e: std::io::Error) -> Self {
        HaError::IOError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HaError>;

// ============================================================================
// 测试模块
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = HaError::NodeNotFound("db-9".to_string());
        assert_eq!(e.to_string(), "Node not found: db-9");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(matches!(HaError::from(io), HaError::IOError(_)));
    }
}
