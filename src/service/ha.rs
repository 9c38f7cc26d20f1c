//! 高可用服务
//!
//! @yutiansut @quantaxis
//!
//! 应用层（HTTP 中间件、管理面板）唯一的入口。每个实例独立持有自己的注册表、
//! 监控器与协调器，不使用全局单例，同进程内可并存多个实例。
//!
//! ```text
//!                  ┌──────────────────── HaService ────────────────────┐
//! select_node ───> │ SelectionEngine ──> NodeRegistry <── HealthMonitor │
//!                  │                         ▲   ▲                      │
//! test_failover ─> │ FailoverOrchestrator ───┘   └── ReplicationMonitor │
//!                  │         │                                          │
//! get_metrics ───> │ MetricsAggregator ──> HaPrometheus                 │
//!                  └─────────┴──────────> EventBus ──> 订阅者            │
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::balancer::{LoadBalancingStrategy, RoutingRequest, SelectionEngine, SessionAffinityMap};
use crate::cluster::{LoadBalancerNode, NodeInventory, NodeRegistry};
use crate::failover::{
    FailoverError, FailoverEvent, FailoverOrchestrator, FailoverState, FailoverStats,
    FailoverTrigger, FlagWriteGate, WriteGate,
};
use crate::health::{probe_for, HealthMonitor, HealthProbe};
use crate::metrics::{HAMetrics, HaPrometheus, MetricsAggregator, RequestWindow};
use crate::notification::{EventBus, HaEvent};
use crate::replication::{ReplicaProbe, ReplicaReport, ReplicationMonitor, ReportedReplicaProbe};
use crate::utils::config::HaConfig;
use crate::{HaError, Result};

/// 高可用服务
pub struct HaService {
    config: HaConfig,
    registry: Arc<NodeRegistry>,
    bus: Arc<EventBus>,
    affinity: Arc<SessionAffinityMap>,
    selector: SelectionEngine,
    health: Arc<HealthMonitor>,
    replication: Arc<ReplicationMonitor>,
    failover: Arc<FailoverOrchestrator>,
    metrics: Arc<MetricsAggregator>,
    prometheus: Option<Arc<HaPrometheus>>,

    /// 副本心跳入口（使用上报式探针时存在）
    replica_reports: Option<Arc<ReportedReplicaProbe>>,

    /// 后台任务
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HaService {
    /// 按配置构建：健康探针取自 `health_check.probe`，副本延迟由心跳上报
    pub fn from_config(config: HaConfig) -> Result<Self> {
        let health_probe = probe_for(&config.health_check)?;
        let reports = Arc::new(ReportedReplicaProbe::default());
        let mut service = Self::with_probes(
            config,
            health_probe,
            reports.clone(),
            Arc::new(FlagWriteGate::new()),
        )?;
        service.replica_reports = Some(reports);
        Ok(service)
    }

    /// 注入自定义探针与写入闸门
    pub fn with_probes(
        config: HaConfig,
        health_probe: Arc<dyn HealthProbe>,
        replica_probe: Arc<dyn ReplicaProbe>,
        write_gate: Arc<dyn WriteGate>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(NodeRegistry::with_nodes(
            config.load_balancer_nodes(),
            config.cluster_nodes(),
        ));
        let bus = Arc::new(EventBus::new());
        let affinity = Arc::new(SessionAffinityMap::new(config.affinity.max_entries));

        let selector = SelectionEngine::new(registry.clone(), config.strategy.clone(), affinity.clone());

        let failover = Arc::new(FailoverOrchestrator::new(
            registry.clone(),
            replica_probe.clone(),
            write_gate,
            bus.clone(),
            config.failover.clone(),
            config.strategy.failover_policy,
            Duration::from_millis(config.strategy.graceful_delay_ms),
            config.replication.mode,
        ));

        let health = Arc::new(
            HealthMonitor::new(
                registry.clone(),
                config.health_check.clone(),
                health_probe,
                bus.clone(),
            )
            .with_failover(failover.clone()),
        );

        let replication = Arc::new(ReplicationMonitor::new(
            registry.clone(),
            replica_probe,
            config.replication.clone(),
            bus.clone(),
        ));

        let prometheus = if config.metrics.prometheus {
            Some(Arc::new(HaPrometheus::new()?))
        } else {
            None
        };

        let window = RequestWindow::new(
            config.metrics.request_window_secs,
            config.metrics.retention_secs,
        );
        let mut aggregator = MetricsAggregator::new(
            registry.clone(),
            failover.clone(),
            replication.clone(),
            bus.clone(),
            window,
        );
        if let Some(ref prom) = prometheus {
            aggregator = aggregator.with_prometheus(prom.clone());
        }

        log::info!(
            "HA service '{}' created: {} load balancer nodes, {} cluster nodes, strategy {}",
            config.service.name,
            config.load_balancer.len(),
            config.cluster.len(),
            config.strategy.kind.as_str()
        );

        Ok(Self {
            config,
            registry,
            bus,
            affinity,
            selector,
            health,
            replication,
            failover,
            metrics: Arc::new(aggregator),
            prometheus,
            replica_reports: None,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// 启动后台循环：逐节点健康检查、复制监控、指标计算、会话清理、master 看门狗
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            log::warn!("HA service already started");
            return;
        }

        tasks.extend(self.health.start());
        tasks.push(self.replication.start());
        tasks.push(
            self.metrics
                .start(Duration::from_millis(self.config.metrics.interval_ms.max(1))),
        );
        tasks.push(
            self.affinity
                .start_cleanup(Duration::from_millis(self.config.affinity.cleanup_interval_ms.max(1))),
        );
        tasks.push(self.failover.start_master_watchdog());

        log::info!("HA service started with {} background tasks", tasks.len());
    }

    /// 立即探测全部负载均衡节点一次
    pub async fn check_health_now(&self) {
        let flipped = self
            .health
            .check_all()
            .await
            .into_iter()
            .filter(|(_, t)| t.is_some())
            .count();
        log::info!("Health sweep finished, {} node(s) changed status", flipped);
    }

    /// 停止全部后台循环
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        for task in tasks.drain(..) {
            task.abort();
        }
        log::info!("HA service stopped");
    }

    // ═══════════════════════════════════════════════════════════════════
    // 请求路径
    // ═══════════════════════════════════════════════════════════════════

    /// 为请求选择节点；没有 healthy 节点时返回 None
    pub fn select_node(
        &self,
        request: &RoutingRequest,
        strategy: Option<&LoadBalancingStrategy>,
    ) -> Option<LoadBalancerNode> {
        let node = self.selector.select_node(request, strategy)?;
        self.metrics.record_request();
        if let Some(ref prom) = self.prometheus {
            let kind = strategy.unwrap_or(self.selector.default_strategy()).kind;
            prom.record_selection(&node.id, kind.as_str());
        }
        Some(node)
    }

    /// 在选择引擎之外建立的连接计数
    pub fn record_request(&self, node_id: &str) -> Result<()> {
        self.registry.record_request(node_id)
    }

    pub fn release_connection(&self, node_id: &str) -> Result<()> {
        self.registry.release_connection(node_id)
    }

    /// 写入外部测量的响应时间 / 错误率
    pub fn update_node_metrics(
        &self,
        node_id: &str,
        response_time_ms: Option<f64>,
        error_rate: Option<f64>,
    ) -> Result<()> {
        self.registry
            .update_node_metrics(node_id, response_time_ms, error_rate)
    }

    // ═══════════════════════════════════════════════════════════════════
    // 查询
    // ═══════════════════════════════════════════════════════════════════

    /// 即时重算的指标
    pub fn get_metrics(&self) -> HAMetrics {
        self.metrics.calculate_metrics()
    }

    pub fn get_nodes(&self) -> NodeInventory {
        self.registry.inventory()
    }

    /// 最近的故障转移记录（新 → 旧）
    pub fn get_failover_history(&self, limit: usize) -> Vec<FailoverEvent> {
        self.failover.history(limit)
    }

    pub fn state(&self) -> FailoverState {
        self.failover.state()
    }

    pub fn current_master(&self) -> Option<String> {
        self.failover.current_master()
    }

    pub fn failover_stats(&self) -> FailoverStats {
        self.failover.stats()
    }

    pub fn prometheus(&self) -> Option<&Arc<HaPrometheus>> {
        self.prometheus.as_ref()
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &HaConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════
    // 故障转移
    // ═══════════════════════════════════════════════════════════════════

    /// 人工触发故障转移，只返回是否成功
    pub async fn test_failover(&self) -> bool {
        self.initiate_failover("Manual test failover", FailoverTrigger::Manual)
            .await
            .is_ok()
    }

    pub async fn initiate_failover(
        &self,
        reason: &str,
        trigger: FailoverTrigger,
    ) -> std::result::Result<FailoverEvent, FailoverError> {
        self.failover.initiate_failover(reason, trigger).await
    }

    pub fn schedule_failover(
        &self,
        delay: Duration,
        reason: impl Into<String>,
    ) -> JoinHandle<std::result::Result<FailoverEvent, FailoverError>> {
        self.failover.schedule_failover(delay, reason)
    }

    // ═══════════════════════════════════════════════════════════════════
    // 副本状态上报
    // ═══════════════════════════════════════════════════════════════════

    /// 副本心跳（仅上报式探针）
    pub fn report_replica(&self, node_id: &str, report: ReplicaReport) -> Result<()> {
        if self.registry.cluster_node(node_id).is_none() {
            return Err(HaError::NodeNotFound(node_id.to_string()));
        }
        report.validate()?;
        match self.replica_reports {
            Some(ref reports) => {
                reports.report(node_id, report);
                Ok(())
            }
            None => Err(HaError::InvalidParameter(
                "Replica reports are not accepted with a custom replica probe".to_string(),
            )),
        }
    }

    /// 外部判定副本集成员失效（master 失效由看门狗接管）
    pub fn mark_cluster_node_failed(&self, node_id: &str) -> Result<()> {
        self.registry.mark_cluster_node_failed(node_id)
    }

    // ═══════════════════════════════════════════════════════════════════
    // 事件订阅
    // ═══════════════════════════════════════════════════════════════════

    pub fn subscribe(&self, subscriber_id: impl Into<Arc<str>>) -> mpsc::UnboundedReceiver<HaEvent> {
        self.bus.subscribe(subscriber_id)
    }

    pub fn unsubscribe(&self, subscriber_id: &str) {
        self.bus.unsubscribe(subscriber_id)
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

impl Drop for HaService {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
