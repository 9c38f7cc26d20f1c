//! 复制配置

use serde::{Deserialize, Serialize};

/// 复制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplicationMode {
    Synchronous,
    Asynchronous,
    SemiSynchronous,
}

/// 复制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default = "default_mode")]
    pub mode: ReplicationMode,

    /// 可容忍的最大延迟（毫秒），超过即发出 replication:lag
    #[serde(default = "default_max_lag_ms")]
    pub max_lag_ms: u64,

    /// 批量大小
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// 并行复制通道数
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// 传输压缩（仅运维标记）
    #[serde(default)]
    pub compression: bool,

    /// 传输加密（仅运维标记）
    #[serde(default)]
    pub encryption: bool,

    /// 监控间隔（毫秒）
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            max_lag_ms: default_max_lag_ms(),
            batch_size: default_batch_size(),
            parallelism: default_parallelism(),
            compression: false,
            encryption: false,
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

fn default_mode() -> ReplicationMode {
    ReplicationMode::SemiSynchronous
}
fn default_max_lag_ms() -> u64 {
    1000
}
fn default_batch_size() -> usize {
    100
}
fn default_parallelism() -> usize {
    4
}
fn default_check_interval_ms() -> u64 {
    5000
}
