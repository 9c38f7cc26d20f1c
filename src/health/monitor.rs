//! 健康监控器
//!
//! 每个负载均衡节点一个独立的探测循环。探测结果写入有界历史（最多 100 条），
//! 按阈值做滞回判定：
//! - healthy 节点最近 `unhealthy_threshold` 次全部失败 → unhealthy
//! - unhealthy 节点最近 `healthy_threshold` 次全部成功 → healthy
//!
//! 当前 master 变为 unhealthy 时，同步调用故障转移协调器。

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use super::probe::HealthProbe;
use super::spec::HealthCheckSpec;
use crate::cluster::{NodeHealth, NodeRegistry};
use crate::failover::FailoverOrchestrator;
use crate::notification::event::now_rfc3339;
use crate::notification::{EventBus, HaEvent};

/// 每个节点保留的探测结果数
pub const HISTORY_CAPACITY: usize = 100;

/// 状态翻转
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    BecameUnhealthy,
    BecameHealthy,
}

/// 健康监控器
pub struct HealthMonitor {
    registry: Arc<NodeRegistry>,
    spec: HealthCheckSpec,
    probe: Arc<dyn HealthProbe>,
    bus: Arc<EventBus>,
    failover: Option<Arc<FailoverOrchestrator>>,

    /// node_id -> 探测历史（旧 → 新）
    histories: DashMap<String, VecDeque<bool>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        spec: HealthCheckSpec,
        probe: Arc<dyn HealthProbe>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            spec,
            probe,
            bus,
            failover: None,
            histories: DashMap::new(),
        }
    }

    /// 关联故障转移协调器（master 失联时触发）
    pub fn with_failover(mut self, failover: Arc<FailoverOrchestrator>) -> Self {
        self.failover = Some(failover);
        self
    }

    pub fn spec(&self) -> &HealthCheckSpec {
        &self.spec
    }

    /// 节点的探测历史（旧 → 新）
    pub fn history(&self, node_id: &str) -> Vec<bool> {
        self.histories
            .get(node_id)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 执行一次探测（含重试）并应用结果
    pub async fn check_node(&self, node_id: &str) -> Option<HealthTransition> {
        let node = match self.registry.load_balancer_node(node_id) {
            Some(node) => node,
            None => {
                log::warn!("Health check skipped, node {} not registered", node_id);
                return None;
            }
        };

        let mut passed = false;
        for attempt in 0..=self.spec.retries {
            match self.probe.probe(&node, &self.spec).await {
                Ok(true) => {
                    passed = true;
                    break;
                }
                Ok(false) => {
                    log::debug!("Health probe of {} rejected (attempt {})", node_id, attempt + 1);
                }
                Err(e) => {
                    log::debug!("Health probe of {} failed (attempt {}): {}", node_id, attempt + 1, e);
                }
            }
        }

        self.registry.touch_health_check(node_id);

        let transition = self.record_result(node_id, passed);
        if transition == Some(HealthTransition::BecameUnhealthy) {
            self.notify_failover(node_id).await;
        }
        transition
    }

    /// 并发探测所有节点一次
    pub async fn check_all(&self) -> Vec<(String, Option<HealthTransition>)> {
        let ids: Vec<String> = self
            .registry
            .load_balancer_nodes()
            .into_iter()
            .map(|n| n.id)
            .collect();

        let results = futures::future::join_all(ids.iter().map(|id| self.check_node(id))).await;
        ids.into_iter().zip(results).collect()
    }

    /// 记录一次探测结果并按阈值判定状态翻转
    pub fn record_result(&self, node_id: &str, passed: bool) -> Option<HealthTransition> {
        let (recent_failures, recent_successes) = {
            let mut history = self.histories.entry(node_id.to_string()).or_default();
            history.push_back(passed);
            while history.len() > HISTORY_CAPACITY {
                history.pop_front();
            }
            (
                trailing(&history, false, self.spec.unhealthy_threshold),
                trailing(&history, true, self.spec.healthy_threshold),
            )
        };

        let status = self.registry.load_balancer_node(node_id)?.status;

        if status == NodeHealth::Healthy && recent_failures {
            self.set_status(node_id, NodeHealth::Unhealthy);
            log::warn!(
                "Node {} marked unhealthy after {} consecutive failed checks",
                node_id,
                self.spec.unhealthy_threshold
            );
            self.bus.publish(HaEvent::NodeUnhealthy {
                node_id: node_id.to_string(),
                consecutive_failures: self.spec.unhealthy_threshold,
                timestamp: now_rfc3339(),
            });
            return Some(HealthTransition::BecameUnhealthy);
        }

        if status == NodeHealth::Unhealthy && recent_successes {
            self.set_status(node_id, NodeHealth::Healthy);
            log::info!(
                "Node {} recovered after {} consecutive successful checks",
                node_id,
                self.spec.healthy_threshold
            );
            self.bus.publish(HaEvent::NodeHealthy {
                node_id: node_id.to_string(),
                consecutive_successes: self.spec.healthy_threshold,
                timestamp: now_rfc3339(),
            });
            return Some(HealthTransition::BecameHealthy);
        }

        None
    }

    fn set_status(&self, node_id: &str, status: NodeHealth) {
        if let Err(e) = self.registry.update_load_balancer_node(node_id, |n| n.status = status) {
            log::error!("Failed to update status of {}: {}", node_id, e);
        }
    }

    async fn notify_failover(&self, node_id: &str) {
        let failover = match &self.failover {
            Some(f) => f,
            None => return,
        };

        let member = match self.registry.load_balancer_node(node_id) {
            Some(node) => node.cluster_member().to_string(),
            None => return,
        };

        let reason = format!("master {} failed health checks on {}", member, node_id);
        match failover.handle_master_lost(&member, &reason).await {
            None => {}
            Some(Ok(event)) => {
                log::info!("Automatic failover {} promoted {}", event.id, event.to_node)
            }
            Some(Err(e)) => log::error!("Automatic failover after {} went down failed: {}", node_id, e),
        }
    }

    /// 启动单个节点的探测循环
    pub fn schedule_health_check(self: &Arc<Self>, node_id: impl Into<String>) -> JoinHandle<()> {
        let monitor = self.clone();
        let node_id = node_id.into();
        let period = Duration::from_millis(self.spec.interval_ms.max(1));

        tokio::spawn(async move {
            log::info!("Health check loop started for {}", node_id);
            loop {
                monitor.check_node(&node_id).await;
                sleep(period).await;
            }
        })
    }

    /// 为所有已注册节点启动探测循环
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.registry
            .load_balancer_nodes()
            .into_iter()
            .map(|node| self.schedule_health_check(node.id))
            .collect()
    }
}

/// 最近 `n` 条记录是否全部等于 `value`（记录不足 `n` 条时为 false）
fn trailing(history: &VecDeque<bool>, value: bool, n: u32) -> bool {
    let n = n as usize;
    n > 0 && history.len() >= n && history.iter().rev().take(n).all(|&r| r == value)
}
