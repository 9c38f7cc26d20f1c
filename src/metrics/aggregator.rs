//! 高可用指标聚合器
//!
//! 从注册表、故障转移历史、复制监控、请求窗口推导 `HAMetrics`。
//! 只读投影，不回写任何节点状态。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

use super::exporter::HaPrometheus;
use super::window::RequestWindow;
use crate::cluster::NodeRegistry;
use crate::failover::{FailoverOrchestrator, FailoverState};
use crate::notification::event::now_rfc3339;
use crate::notification::{EventBus, HaEvent};
use crate::replication::ReplicationMonitor;

/// 高可用指标快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HAMetrics {
    pub uptime_secs: u64,
    /// 可用率 (%)：运行时长扣除故障转移耗时
    pub availability: f64,
    pub total_failovers: u64,
    pub avg_failover_duration_ms: f64,
    /// 副本平均一致性 (%)
    pub data_consistency: f64,
    pub replication_lag_ms: f64,
    /// healthy 负载均衡节点数
    pub active_nodes: usize,
    pub total_nodes: usize,
    pub cluster_active_nodes: usize,
    pub cluster_total_nodes: usize,
    pub requests_per_sec: f64,
    /// 各节点滚动错误率的平均值
    pub error_rate: f64,
    pub state: FailoverState,
    pub timestamp: String,
}

impl Default for HAMetrics {
    fn default() -> Self {
        Self {
            uptime_secs: 0,
            availability: 100.0,
            total_failovers: 0,
            avg_failover_duration_ms: 0.0,
            data_consistency: 100.0,
            replication_lag_ms: 0.0,
            active_nodes: 0,
            total_nodes: 0,
            cluster_active_nodes: 0,
            cluster_total_nodes: 0,
            requests_per_sec: 0.0,
            error_rate: 0.0,
            state: FailoverState::Stable,
            timestamp: now_rfc3339(),
        }
    }
}

/// 指标聚合器
pub struct MetricsAggregator {
    registry: Arc<NodeRegistry>,
    failover: Arc<FailoverOrchestrator>,
    replication: Arc<ReplicationMonitor>,
    bus: Arc<EventBus>,
    window: RequestWindow,
    prometheus: Option<Arc<HaPrometheus>>,
    started: Instant,
    latest: RwLock<HAMetrics>,
    degraded: AtomicBool,
}

impl MetricsAggregator {
    pub fn new(
        registry: Arc<NodeRegistry>,
        failover: Arc<FailoverOrchestrator>,
        replication: Arc<ReplicationMonitor>,
        bus: Arc<EventBus>,
        window: RequestWindow,
    ) -> Self {
        Self {
            registry,
            failover,
            replication,
            bus,
            window,
            prometheus: None,
            started: Instant::now(),
            latest: RwLock::new(HAMetrics::default()),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn with_prometheus(mut self, prometheus: Arc<HaPrometheus>) -> Self {
        self.prometheus = Some(prometheus);
        self
    }

    /// 记录一次请求（按秒计数）
    pub fn record_request(&self) {
        self.window.record();
    }

    /// 最近一次计算的结果
    pub fn latest(&self) -> HAMetrics {
        self.latest.read().clone()
    }

    /// 重新计算指标
    pub fn calculate_metrics(&self) -> HAMetrics {
        let inventory = self.registry.inventory();
        let stats = self.failover.stats();
        let events = self.failover.all_events();

        let uptime_ms = self.started.elapsed().as_millis() as u64;
        let availability = if uptime_ms == 0 {
            100.0
        } else {
            let up = uptime_ms.saturating_sub(stats.total_downtime_ms);
            up as f64 / uptime_ms as f64 * 100.0
        };

        let avg_failover_duration_ms = if events.is_empty() {
            0.0
        } else {
            events.iter().map(|e| e.duration_ms as f64).sum::<f64>() / events.len() as f64
        };

        let error_rate = if inventory.load_balancer.is_empty() {
            0.0
        } else {
            inventory.load_balancer.iter().map(|n| n.error_rate).sum::<f64>()
                / inventory.load_balancer.len() as f64
        };

        let cluster_active_nodes = inventory.cluster.iter().filter(|n| n.is_active()).count();

        let metrics = HAMetrics {
            uptime_secs: uptime_ms / 1000,
            availability,
            total_failovers: stats.successes,
            avg_failover_duration_ms,
            data_consistency: self.replication.mean_consistency(),
            replication_lag_ms: self.replication.mean_lag_ms(),
            active_nodes: inventory.load_balancer.iter().filter(|n| n.is_healthy()).count(),
            total_nodes: inventory.load_balancer.len(),
            cluster_active_nodes,
            cluster_total_nodes: inventory.cluster.len(),
            requests_per_sec: self.window.requests_per_sec(),
            error_rate,
            state: self.failover.state(),
            timestamp: now_rfc3339(),
        };

        self.check_degraded(cluster_active_nodes, inventory.cluster.is_empty());

        if let Some(prom) = &self.prometheus {
            prom.observe(&metrics, &inventory);
        }

        *self.latest.write() = metrics.clone();
        metrics
    }

    /// 活跃副本集节点跌破 2 时发出 ha:degraded，恢复时发出 ha:recovered
    fn check_degraded(&self, active: usize, no_cluster: bool) {
        if no_cluster {
            return;
        }

        if active < 2 {
            if !self.degraded.swap(true, Ordering::AcqRel) {
                log::warn!("HA degraded: only {} active cluster node(s)", active);
                self.bus.publish(HaEvent::Degraded {
                    active_nodes: active,
                    timestamp: now_rfc3339(),
                });
            }
        } else if self.degraded.swap(false, Ordering::AcqRel) {
            log::info!("HA recovered: {} active cluster nodes", active);
            self.bus.publish(HaEvent::Recovered {
                active_nodes: active,
                timestamp: now_rfc3339(),
            });
        }
    }

    pub fn start(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let aggregator = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let m = aggregator.calculate_metrics();
                log::trace!(
                    "HA metrics: availability {:.3}%, {} rps, {}/{} nodes",
                    m.availability,
                    m.requests_per_sec,
                    m.active_nodes,
                    m.total_nodes
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::FailoverPolicy;
    use crate::cluster::{ClusterNode, LoadBalancerNode, NodeHealth, NodeRole};
    use crate::failover::{FailoverConfig, FailoverTrigger, FlagWriteGate};
    use crate::replication::{ReplicaReport, ReplicationConfig, ReplicationMode, ReportedReplicaProbe};

    struct Fixture {
        registry: Arc<NodeRegistry>,
        failover: Arc<FailoverOrchestrator>,
        bus: Arc<EventBus>,
        aggregator: MetricsAggregator,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(NodeRegistry::with_nodes(
            vec![
                LoadBalancerNode::new("a", "127.0.0.1:9001"),
                LoadBalancerNode::new("b", "127.0.0.1:9002").with_status(NodeHealth::Unhealthy),
            ],
            vec![
                ClusterNode::new("m", NodeRole::Master, 100),
                ClusterNode::new("s1", NodeRole::Slave, 90).with_lag(10),
            ],
        ));
        let probe = Arc::new(ReportedReplicaProbe::default());
        probe.report("s1", ReplicaReport::new(10));
        let bus = Arc::new(EventBus::new());
        let failover = Arc::new(FailoverOrchestrator::new(
            registry.clone(),
            probe.clone(),
            Arc::new(FlagWriteGate::new()),
            bus.clone(),
            FailoverConfig::default(),
            FailoverPolicy::Immediate,
            Duration::from_millis(0),
            ReplicationMode::SemiSynchronous,
        ));
        let replication = Arc::new(ReplicationMonitor::new(
            registry.clone(),
            probe,
            ReplicationConfig::default(),
            bus.clone(),
        ));
        let aggregator = MetricsAggregator::new(
            registry.clone(),
            failover.clone(),
            replication,
            bus.clone(),
            RequestWindow::default(),
        );
        Fixture {
            registry,
            failover,
            bus,
            aggregator,
        }
    }

    #[test]
    fn test_node_counts_and_error_rate() {
        let f = fixture();
        f.registry.update_node_metrics("a", None, Some(0.2)).unwrap();
        f.registry.update_node_metrics("b", None, Some(0.4)).unwrap();

        let m = f.aggregator.calculate_metrics();
        assert_eq!(m.active_nodes, 1);
        assert_eq!(m.total_nodes, 2);
        assert_eq!(m.cluster_active_nodes, 2);
        assert!((m.error_rate - 0.3).abs() < 1e-9);
        assert_eq!(m.total_failovers, 0);
        assert_eq!(m.state, FailoverState::Stable);
        assert!(m.availability <= 100.0);
    }

    #[test]
    fn test_requests_counted() {
        let f = fixture();
        for _ in 0..120 {
            f.aggregator.record_request();
        }
        let m = f.aggregator.calculate_metrics();
        assert!(m.requests_per_sec >= 2.0);
    }

    #[tokio::test]
    async fn test_failover_stats_and_degraded_edge() {
        let f = fixture();
        let mut rx = f.bus.subscribe("t");

        f.failover
            .initiate_failover("test", FailoverTrigger::Manual)
            .await
            .unwrap();

        let m = f.aggregator.calculate_metrics();
        assert_eq!(m.total_failovers, 1);
        // 旧 master 进入 standby，只剩 1 个 active
        assert_eq!(m.cluster_active_nodes, 1);
        assert_eq!(m.state, FailoverState::StableWithDegradedReplica);

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert!(names.contains(&"failover:completed"));
        assert_eq!(names.iter().filter(|n| **n == "ha:degraded").count(), 1);

        // 重复计算不会重复告警
        f.aggregator.calculate_metrics();
        assert!(rx.try_recv().is_err());
    }
}
