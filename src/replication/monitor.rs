//! 复制监控器
//!
//! 定期测量每个 slave 的延迟与一致性，原地更新注册表中的 `lag_ms`，
//! 超过 `max_lag_ms` 时发出 replication:lag。只观察，不改变角色和状态。

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::config::ReplicationConfig;
use super::probe::ReplicaProbe;
use crate::cluster::NodeRegistry;
use crate::notification::event::now_rfc3339;
use crate::notification::{EventBus, HaEvent};

/// 单次巡检结果
#[derive(Debug, Clone, Default)]
pub struct ReplicationTick {
    /// 成功测量的 slave 数
    pub checked: usize,
    /// 超过阈值的节点
    pub lagging: Vec<String>,
    pub mean_lag_ms: f64,
}

/// 复制监控器
pub struct ReplicationMonitor {
    registry: Arc<NodeRegistry>,
    probe: Arc<dyn ReplicaProbe>,
    config: ReplicationConfig,
    bus: Arc<EventBus>,

    /// 最近一次巡检的平均延迟
    mean_lag_ms: RwLock<f64>,

    /// 各副本最近一次一致性检查结果
    consistency: DashMap<String, f64>,
}

impl ReplicationMonitor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        probe: Arc<dyn ReplicaProbe>,
        config: ReplicationConfig,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            probe,
            config,
            bus,
            mean_lag_ms: RwLock::new(0.0),
            consistency: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// 执行一次巡检
    pub async fn tick(&self) -> ReplicationTick {
        let slaves: Vec<_> = self
            .registry
            .cluster_nodes()
            .into_iter()
            .filter(|n| n.is_slave())
            .collect();

        // 已提升为 master 或被移除的节点不再参与一致性均值
        self.consistency
            .retain(|id, _| slaves.iter().any(|n| &n.id == id));

        let mut result = ReplicationTick::default();
        let mut total_lag: u64 = 0;

        for node in slaves {
            let lag = match self.probe.measure_lag(&node).await {
                Ok(lag) => lag,
                Err(e) => {
                    log::warn!("Failed to measure replication lag of {}: {}", node.id, e);
                    continue;
                }
            };
            let version = self.probe.data_version(&node).await;

            let _ = self.registry.update_cluster_node(&node.id, |n| {
                n.lag_ms = lag;
                n.last_sync = last_sync_for(lag);
                if let Some(v) = version {
                    n.data_version = v;
                }
            });

            result.checked += 1;
            total_lag = total_lag.saturating_add(lag);

            if lag > self.config.max_lag_ms {
                log::warn!(
                    "Replication lag of {} is {}ms (max {}ms)",
                    node.id,
                    lag,
                    self.config.max_lag_ms
                );
                self.bus.publish(HaEvent::ReplicationLag {
                    node_id: node.id.clone(),
                    lag_ms: lag,
                    threshold_ms: self.config.max_lag_ms,
                    timestamp: now_rfc3339(),
                });
                result.lagging.push(node.id.clone());
            }

            match self.probe.check_consistency(&node).await {
                Ok(pct) => {
                    self.consistency.insert(node.id.clone(), pct);
                }
                Err(e) => {
                    log::debug!("Consistency check of {} failed: {}", node.id, e);
                    self.consistency.insert(node.id.clone(), 0.0);
                }
            }
        }

        result.mean_lag_ms = if result.checked == 0 {
            0.0
        } else {
            total_lag as f64 / result.checked as f64
        };
        *self.mean_lag_ms.write() = result.mean_lag_ms;

        result
    }

    /// 启动巡检循环
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = self.clone();
        let period = Duration::from_millis(self.config.check_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let tick = monitor.tick().await;
                log::trace!(
                    "Replication tick: {} slaves checked, mean lag {:.1}ms",
                    tick.checked,
                    tick.mean_lag_ms
                );
            }
        })
    }

    pub fn mean_lag_ms(&self) -> f64 {
        *self.mean_lag_ms.read()
    }

    /// 副本平均一致性；尚未检查过任何副本时为 100
    pub fn mean_consistency(&self) -> f64 {
        if self.consistency.is_empty() {
            return 100.0;
        }
        let sum: f64 = self.consistency.iter().map(|e| *e.value()).sum();
        sum / self.consistency.len() as f64
    }
}

/// 由延迟反推最近一次同步时间，超出时间范围时为 None
fn last_sync_for(lag_ms: u64) -> Option<chrono::DateTime<Utc>> {
    let lag = chrono::Duration::try_milliseconds(i64::try_from(lag_ms).ok()?)?;
    Utc::now().checked_sub_signed(lag)
}
