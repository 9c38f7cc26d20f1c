//! 健康检查策略

use serde::{Deserialize, Serialize};

/// 探针类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    /// HTTP 请求，校验状态码
    Http,
    /// 仅建立 TCP 连接
    Tcp,
}

/// 健康检查策略（按节点类别配置）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    #[serde(default = "default_probe_kind")]
    pub probe: ProbeKind,

    /// 探测路径
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_method")]
    pub method: String,

    /// 视为成功的状态码
    #[serde(default = "default_expected_status")]
    pub expected_status: Vec<u16>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// 单次检查内失败后的重试次数
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// 从 unhealthy 恢复所需的连续成功次数
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,

    /// 判定 unhealthy 所需的连续失败次数
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            probe: default_probe_kind(),
            path: default_path(),
            method: default_method(),
            expected_status: default_expected_status(),
            timeout_ms: default_timeout_ms(),
            interval_ms: default_interval_ms(),
            retries: default_retries(),
            healthy_threshold: default_healthy_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

impl HealthCheckSpec {
    pub fn accepts(&self, status: u16) -> bool {
        self.expected_status.contains(&status)
    }
}

fn default_probe_kind() -> ProbeKind {
    ProbeKind::Http
}
fn default_path() -> String {
    "/health".to_string()
}
fn default_method() -> String {
    "GET".to_string()
}
fn default_expected_status() -> Vec<u16> {
    vec![200]
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_interval_ms() -> u64 {
    10_000
}
fn default_retries() -> u32 {
    3
}
fn default_healthy_threshold() -> u32 {
    2
}
fn default_unhealthy_threshold() -> u32 {
    3
}
