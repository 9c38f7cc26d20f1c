//! 副本探针
//!
//! 延迟与一致性的测量接口。故障转移状态机与复制监控只依赖这个 trait，
//! 不关心数据从哪里来。

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cluster::ClusterNode;
use crate::{HaError, Result};

/// 副本探针
#[async_trait]
pub trait ReplicaProbe: Send + Sync {
    /// 测量副本相对 master 的延迟（毫秒）
    async fn measure_lag(&self, node: &ClusterNode) -> Result<u64>;

    /// 一致性检查，返回百分比 (0.0 - 100.0)
    async fn check_consistency(&self, node: &ClusterNode) -> Result<f64>;

    /// 副本当前的数据版本标记
    async fn data_version(&self, _node: &ClusterNode) -> Option<String> {
        None
    }
}

/// 单次上报允许的最大延迟（7 天）
pub const MAX_REPORTED_LAG_MS: u64 = 7 * 24 * 3600 * 1000;

/// 副本心跳上报内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaReport {
    pub lag_ms: u64,
    /// 副本自检的一致性百分比
    pub consistency: f64,
    #[serde(default)]
    pub data_version: Option<String>,
}

impl ReplicaReport {
    pub fn new(lag_ms: u64) -> Self {
        Self {
            lag_ms,
            consistency: 100.0,
            data_version: None,
        }
    }

    pub fn with_consistency(mut self, consistency: f64) -> Self {
        self.consistency = consistency;
        self
    }

    /// 校验上报值：延迟不超过 `MAX_REPORTED_LAG_MS`，一致性在 [0, 100]
    pub fn validate(&self) -> Result<()> {
        if self.lag_ms > MAX_REPORTED_LAG_MS {
            return Err(HaError::InvalidParameter(format!(
                "lag_ms {} exceeds {}",
                self.lag_ms, MAX_REPORTED_LAG_MS
            )));
        }
        if !(0.0..=100.0).contains(&self.consistency) {
            return Err(HaError::InvalidParameter(format!(
                "consistency {} out of range [0, 100]",
                self.consistency
            )));
        }
        Ok(())
    }
}

/// 基于副本心跳上报的探针
///
/// 副本定期上报自身延迟；上报过期后，延迟按"上报值 + 已沉默时长"估算，
/// 一致性检查直接失败。
pub struct ReportedReplicaProbe {
    reports: DashMap<String, (ReplicaReport, Instant)>,
    stale_after: Duration,
}

impl ReportedReplicaProbe {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            reports: DashMap::new(),
            stale_after,
        }
    }

    /// 记录副本心跳
    pub fn report(&self, node_id: impl Into<String>, report: ReplicaReport) {
        let node_id = node_id.into();
        log::trace!("Replica {} reported lag {}ms", node_id, report.lag_ms);
        self.reports.insert(node_id, (report, Instant::now()));
    }

    pub fn forget(&self, node_id: &str) {
        self.reports.remove(node_id);
    }

    fn latest(&self, node_id: &str) -> Result<(ReplicaReport, Duration)> {
        let entry = self
            .reports
            .get(node_id)
            .ok_or_else(|| HaError::ProbeError(format!("no replica report from {}", node_id)))?;
        let (report, at) = entry.value();
        Ok((report.clone(), at.elapsed()))
    }
}

impl Default for ReportedReplicaProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ReplicaProbe for ReportedReplicaProbe {
    async fn measure_lag(&self, node: &ClusterNode) -> Result<u64> {
        let (report, age) = self.latest(&node.id)?;
        if age > self.stale_after {
            Ok(report.lag_ms.saturating_add(age.as_millis() as u64))
        } else {
            Ok(report.lag_ms)
        }
    }

    async fn check_consistency(&self, node: &ClusterNode) -> Result<f64> {
        let (report, age) = self.latest(&node.id)?;
        if age > self.stale_after {
            return Err(HaError::ProbeError(format!(
                "replica report from {} is stale ({}ms old)",
                node.id,
                age.as_millis()
            )));
        }
        Ok(report.consistency)
    }

    async fn data_version(&self, node: &ClusterNode) -> Option<String> {
        self.latest(&node.id).ok().and_then(|(r, _)| r.data_version)
    }
}
