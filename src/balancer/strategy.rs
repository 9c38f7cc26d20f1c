//! 负载均衡策略

use serde::{Deserialize, Serialize};

/// 选择算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    RoundRobin,
    LeastConnections,
    Weighted,
    /// 按客户端身份哈希
    IpHash,
    /// 按请求路径哈希（缓存局部性）
    ConsistentHash,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round-robin",
            StrategyKind::LeastConnections => "least-connections",
            StrategyKind::Weighted => "weighted",
            StrategyKind::IpHash => "ip-hash",
            StrategyKind::ConsistentHash => "consistent-hash",
        }
    }
}

/// master 失联后的处理方式（仅约束自动触发）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverPolicy {
    /// 立即故障转移
    Immediate,
    /// 先将 master 的服务节点置为 draining，等待宽限期
    Graceful,
    /// 只允许人工触发
    Manual,
}

/// 负载均衡策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancingStrategy {
    #[serde(default = "default_kind")]
    pub kind: StrategyKind,

    #[serde(default)]
    pub session_affinity: bool,

    /// 会话保持超时（秒）
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_failover_policy")]
    pub failover_policy: FailoverPolicy,

    /// graceful 策略的宽限期（毫秒）
    #[serde(default = "default_graceful_delay_ms")]
    pub graceful_delay_ms: u64,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            session_affinity: false,
            session_timeout_secs: default_session_timeout_secs(),
            failover_policy: default_failover_policy(),
            graceful_delay_ms: default_graceful_delay_ms(),
        }
    }
}

impl LoadBalancingStrategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_affinity(mut self, timeout_secs: u64) -> Self {
        self.session_affinity = true;
        self.session_timeout_secs = timeout_secs;
        self
    }
}

fn default_kind() -> StrategyKind {
    StrategyKind::RoundRobin
}
fn default_session_timeout_secs() -> u64 {
    3600
}
fn default_failover_policy() -> FailoverPolicy {
    FailoverPolicy::Immediate
}
fn default_graceful_delay_ms() -> u64 {
    5000
}
