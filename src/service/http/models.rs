//! HTTP API 请求/响应模型

use serde::{Deserialize, Serialize};

use crate::failover::{FailoverState, FailoverStats};

/// 通用响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// API 错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u32,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: u32, message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError { code, message }),
        }
    }
}

/// 故障转移历史查询
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    10
}

/// 节点指标上报
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetricsRequest {
    #[serde(default)]
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub error_rate: Option<f64>,
}

/// 副本心跳
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaReportRequest {
    pub lag_ms: u64,
    #[serde(default)]
    pub consistency: Option<f64>,
    #[serde(default)]
    pub data_version: Option<String>,
}

/// 人工故障转移结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverTestResponse {
    pub success: bool,
    pub master: Option<String>,
}

/// 状态机快照
#[derive(Debug, Clone, Serialize)]
pub struct StateResponse {
    pub state: FailoverState,
    pub master: Option<String>,
    pub stats: FailoverStats,
}
