//! 故障转移协调器
//!
//! 状态机：`Stable → FailoverInProgress → (Stable | StableWithDegradedReplica)`
//!
//! 流程：
//! 1. 抢占 in-progress 标志（失败立即返回，不排队）
//! 2. 选择候选：role=slave、status=active、lag < 1000ms 中优先级最高者
//! 3. 预检查：状态、延迟 < 5000ms、一致性 >= 99%（任一失败即中止，未做任何修改）
//! 4. 暂停写入
//! 5. 等待同步：每 100ms 轮询，lag < 100ms 或 10s 超时
//! 6. 提升候选为 master
//! 7. 旧 master 降级为 slave/standby
//! 8. 恢复写入
//! 9. 记录事件
//!
//! 第 3 步之后的任何错误都会回滚（恢复写入，角色保持现状）。
//! 这是基于优先级和延迟的启发式切换，不是共识协议，没有 fencing。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};

use super::event::{FailoverError, FailoverEvent, FailoverState, FailoverTrigger};
use super::write_gate::WriteGate;
use crate::balancer::FailoverPolicy;
use crate::cluster::{ClusterNode, ClusterNodeStatus, NodeRegistry, NodeRole, MAX_PRIORITY};
use crate::notification::event::now_rfc3339;
use crate::notification::{EventBus, HaEvent};
use crate::replication::{ReplicaProbe, ReplicationMode};

/// 故障转移配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// 候选节点的最大延迟（毫秒）
    #[serde(default = "default_candidate_max_lag_ms")]
    pub candidate_max_lag_ms: u64,

    /// 预检查允许的最大延迟（毫秒）
    #[serde(default = "default_precheck_max_lag_ms")]
    pub precheck_max_lag_ms: u64,

    /// 预检查要求的最低一致性（百分比）
    #[serde(default = "default_min_consistency")]
    pub min_consistency: f64,

    /// 同步等待的目标延迟（毫秒）
    #[serde(default = "default_sync_target_lag_ms")]
    pub sync_target_lag_ms: u64,

    #[serde(default = "default_sync_poll_interval_ms")]
    pub sync_poll_interval_ms: u64,

    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// 历史记录上限
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// master 看门狗检测间隔（毫秒）
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            candidate_max_lag_ms: default_candidate_max_lag_ms(),
            precheck_max_lag_ms: default_precheck_max_lag_ms(),
            min_consistency: default_min_consistency(),
            sync_target_lag_ms: default_sync_target_lag_ms(),
            sync_poll_interval_ms: default_sync_poll_interval_ms(),
            sync_timeout_ms: default_sync_timeout_ms(),
            history_limit: default_history_limit(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
        }
    }
}

fn default_candidate_max_lag_ms() -> u64 {
    1000
}
fn default_precheck_max_lag_ms() -> u64 {
    5000
}
fn default_min_consistency() -> f64 {
    99.0
}
fn default_sync_target_lag_ms() -> u64 {
    100
}
fn default_sync_poll_interval_ms() -> u64 {
    100
}
fn default_sync_timeout_ms() -> u64 {
    10_000
}
fn default_history_limit() -> usize {
    1000
}
fn default_watchdog_interval_ms() -> u64 {
    1000
}

/// 统计快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailoverStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub rollbacks: u64,
    /// 成功切换累计耗时（视为不可用时间）
    pub total_downtime_ms: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rollbacks: AtomicU64,
    downtime_ms: AtomicU64,
}

/// in-progress 标志守卫，drop 时释放（相当于 finally）
struct InProgressGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InProgressGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 故障转移协调器
pub struct FailoverOrchestrator {
    registry: Arc<NodeRegistry>,
    probe: Arc<dyn ReplicaProbe>,
    write_gate: Arc<dyn WriteGate>,
    bus: Arc<EventBus>,
    config: FailoverConfig,
    policy: FailoverPolicy,
    graceful_delay: Duration,
    replication_mode: ReplicationMode,

    in_progress: AtomicBool,

    /// 当前 master ID
    current_master: RwLock<Option<String>>,

    /// 历史记录（旧 → 新）
    history: RwLock<VecDeque<FailoverEvent>>,

    counters: Counters,
}

impl FailoverOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<NodeRegistry>,
        probe: Arc<dyn ReplicaProbe>,
        write_gate: Arc<dyn WriteGate>,
        bus: Arc<EventBus>,
        config: FailoverConfig,
        policy: FailoverPolicy,
        graceful_delay: Duration,
        replication_mode: ReplicationMode,
    ) -> Self {
        let current_master = registry.master().map(|m| m.id);
        if let Some(ref id) = current_master {
            log::info!("Failover orchestrator tracking master {}", id);
        }

        Self {
            registry,
            probe,
            write_gate,
            bus,
            config,
            policy,
            graceful_delay,
            replication_mode,
            in_progress: AtomicBool::new(false),
            current_master: RwLock::new(current_master),
            history: RwLock::new(VecDeque::new()),
            counters: Counters::default(),
        }
    }

    pub fn current_master(&self) -> Option<String> {
        self.current_master.read().clone()
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn policy(&self) -> FailoverPolicy {
        self.policy
    }

    pub fn state(&self) -> FailoverState {
        if self.is_in_progress() {
            FailoverState::FailoverInProgress
        } else if self.registry.active_cluster_count() < 2 {
            FailoverState::StableWithDegradedReplica
        } else {
            FailoverState::Stable
        }
    }

    /// 执行故障转移
    pub async fn initiate_failover(
        &self,
        reason: &str,
        trigger: FailoverTrigger,
    ) -> Result<FailoverEvent, FailoverError> {
        let _guard = match InProgressGuard::claim(&self.in_progress) {
            Some(guard) => guard,
            None => {
                log::warn!("Failover requested ({}) while another is in progress, rejected", reason);
                return Err(FailoverError::AlreadyInProgress);
            }
        };

        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let previous_master = self.current_master();

        log::warn!(
            "Initiating {:?} failover from {:?}: {}",
            trigger,
            previous_master,
            reason
        );
        self.bus.publish(HaEvent::FailoverStarted {
            from_node: previous_master.clone(),
            reason: reason.to_string(),
            timestamp: now_rfc3339(),
        });

        // 2-3: 只读阶段，失败时无需回滚
        let candidate = match self.select_candidate() {
            Ok(c) => c,
            Err(e) => return Err(self.fail(reason, e)),
        };
        if let Err(e) = self.pre_failover_checks(&candidate).await {
            return Err(self.fail(reason, e));
        }

        // 4-8
        let outcome = self.switch_over(&candidate, previous_master.clone()).await;

        let final_lag_ms = match outcome {
            Ok(lag) => lag,
            Err(e) => {
                self.rollback(&candidate, &e).await;
                return Err(self.fail(reason, e));
            }
        };

        // 9
        let duration_ms = started.elapsed().as_millis() as u64;
        let event = FailoverEvent {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            trigger,
            from_node: previous_master.clone(),
            to_node: candidate.id.clone(),
            reason: reason.to_string(),
            duration_ms,
            data_loss: self.replication_mode == ReplicationMode::Asynchronous && final_lag_ms > 0,
            rollback_available: previous_master.is_some(),
        };

        {
            let mut history = self.history.write();
            history.push_back(event.clone());
            while history.len() > self.config.history_limit {
                history.pop_front();
            }
        }
        self.counters.successes.fetch_add(1, Ordering::Relaxed);
        self.counters.downtime_ms.fetch_add(duration_ms, Ordering::Relaxed);

        log::info!(
            "Failover completed: {:?} -> {} in {}ms",
            previous_master,
            candidate.id,
            duration_ms
        );
        self.bus.publish(HaEvent::FailoverCompleted {
            event_id: event.id.clone(),
            from_node: previous_master,
            to_node: candidate.id.clone(),
            duration_ms,
            timestamp: now_rfc3339(),
        });

        if self.registry.active_cluster_count() < 2 {
            log::warn!("Failover finished with fewer than 2 active cluster nodes");
        }

        Ok(event)
    }

    /// 选择提升候选
    fn select_candidate(&self) -> Result<ClusterNode, FailoverError> {
        let mut best: Option<ClusterNode> = None;
        for node in self.registry.cluster_nodes() {
            if node.role != NodeRole::Slave
                || node.status != ClusterNodeStatus::Active
                || node.lag_ms >= self.config.candidate_max_lag_ms
            {
                continue;
            }
            // 同优先级保留注册顺序靠前者
            if best.as_ref().map_or(true, |b| node.priority > b.priority) {
                best = Some(node);
            }
        }

        match best {
            Some(node) => {
                log::info!(
                    "Selected {} (priority {}, lag {}ms) as promotion candidate",
                    node.id,
                    node.priority,
                    node.lag_ms
                );
                Ok(node)
            }
            None => {
                log::error!("No eligible slave for promotion");
                Err(FailoverError::NoCandidate)
            }
        }
    }

    async fn pre_failover_checks(&self, candidate: &ClusterNode) -> Result<(), FailoverError> {
        let precheck = |reason: String| FailoverError::PreCheckFailed {
            node_id: candidate.id.clone(),
            reason,
        };

        let current = self
            .registry
            .cluster_node(&candidate.id)
            .ok_or_else(|| precheck("node disappeared from registry".to_string()))?;
        if current.status != ClusterNodeStatus::Active {
            return Err(precheck(format!("status is {:?}", current.status)));
        }

        let lag = self
            .probe
            .measure_lag(&current)
            .await
            .map_err(|e| precheck(format!("lag probe failed: {}", e)))?;
        if lag >= self.config.precheck_max_lag_ms {
            return Err(precheck(format!(
                "lag {}ms exceeds {}ms",
                lag, self.config.precheck_max_lag_ms
            )));
        }

        let consistency = self
            .probe
            .check_consistency(&current)
            .await
            .map_err(|e| precheck(format!("consistency check failed: {}", e)))?;
        if consistency < self.config.min_consistency {
            return Err(precheck(format!(
                "consistency {:.2}% below {:.2}%",
                consistency, self.config.min_consistency
            )));
        }

        log::info!(
            "Pre-failover checks passed for {} (lag {}ms, consistency {:.2}%)",
            candidate.id,
            lag,
            consistency
        );
        Ok(())
    }

    /// 第 4-8 步，返回提升时的最终延迟
    async fn switch_over(
        &self,
        candidate: &ClusterNode,
        previous_master: Option<String>,
    ) -> Result<u64, FailoverError> {
        self.write_gate
            .suspend_writes()
            .await
            .map_err(|e| FailoverError::WriteGate(e.to_string()))?;

        let final_lag = self.wait_for_sync(candidate).await?;

        self.registry
            .update_cluster_node(&candidate.id, |n| {
                n.role = NodeRole::Master;
                n.priority = MAX_PRIORITY;
                n.status = ClusterNodeStatus::Active;
            })
            .map_err(|e| FailoverError::PromotionFailed(e.to_string()))?;
        log::info!("Promoted {} to master", candidate.id);

        *self.current_master.write() = Some(candidate.id.clone());

        if let Some(old) = previous_master.filter(|id| id != &candidate.id) {
            match self.registry.update_cluster_node(&old, |n| {
                n.role = NodeRole::Slave;
                n.status = ClusterNodeStatus::Standby;
            }) {
                Ok(()) => log::info!("Demoted previous master {} to standby slave", old),
                Err(e) => log::warn!("Previous master {} not demoted: {}", old, e),
            }
        }

        self.write_gate
            .resume_writes()
            .await
            .map_err(|e| FailoverError::WriteGate(e.to_string()))?;

        Ok(final_lag)
    }

    /// 等待候选节点追平
    async fn wait_for_sync(&self, candidate: &ClusterNode) -> Result<u64, FailoverError> {
        let started = Instant::now();
        let timeout = Duration::from_millis(self.config.sync_timeout_ms);
        let poll = Duration::from_millis(self.config.sync_poll_interval_ms.max(1));
        let mut last_lag = candidate.lag_ms;

        loop {
            match self.probe.measure_lag(candidate).await {
                Ok(lag) => {
                    last_lag = lag;
                    let _ = self.registry.update_cluster_node(&candidate.id, |n| n.lag_ms = lag);
                    if lag < self.config.sync_target_lag_ms {
                        log::info!(
                            "{} in sync (lag {}ms) after {}ms",
                            candidate.id,
                            lag,
                            started.elapsed().as_millis()
                        );
                        return Ok(lag);
                    }
                }
                Err(e) => log::warn!("Lag probe of {} failed during sync wait: {}", candidate.id, e),
            }

            if started.elapsed() >= timeout {
                return Err(FailoverError::SyncTimeout {
                    node_id: candidate.id.clone(),
                    last_lag_ms: last_lag,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }

            sleep(poll).await;
        }
    }

    /// 尽力回滚：恢复写入，角色不做还原
    async fn rollback(&self, candidate: &ClusterNode, cause: &FailoverError) {
        self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
        log::error!("Rolling back failover to {}: {}", candidate.id, cause);

        if let Err(e) = self.write_gate.resume_writes().await {
            log::error!("Failed to resume writes during rollback: {}", e);
        }
    }

    fn fail(&self, reason: &str, error: FailoverError) -> FailoverError {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        log::error!("Failover ({}) failed: {}", reason, error);
        self.bus.publish(HaEvent::FailoverFailed {
            reason: reason.to_string(),
            error: error.to_string(),
            timestamp: now_rfc3339(),
        });
        error
    }

    /// master 失联（健康检查或看门狗）时按策略处理
    ///
    /// 节点不是当前 master 时返回 `None`。
    pub async fn handle_master_lost(
        &self,
        node_id: &str,
        reason: &str,
    ) -> Option<Result<FailoverEvent, FailoverError>> {
        if self.current_master().as_deref() != Some(node_id) {
            return None;
        }

        match self.policy {
            FailoverPolicy::Immediate => {}
            FailoverPolicy::Graceful => {
                if self.registry.drain_cluster_member(node_id) == 0 {
                    log::debug!("Master {} has no load balancer node to drain", node_id);
                }
                sleep(self.graceful_delay).await;
            }
            FailoverPolicy::Manual => {
                log::warn!(
                    "Master {} lost ({}), failover policy is manual, waiting for operator",
                    node_id,
                    reason
                );
                return Some(Err(FailoverError::PolicyForbidsAutomatic));
            }
        }

        Some(self.initiate_failover(reason, FailoverTrigger::Automatic).await)
    }

    /// 计划在 `delay` 后执行故障转移
    pub fn schedule_failover(
        self: &Arc<Self>,
        delay: Duration,
        reason: impl Into<String>,
    ) -> JoinHandle<Result<FailoverEvent, FailoverError>> {
        let orchestrator = self.clone();
        let reason = reason.into();
        log::info!("Failover scheduled in {}ms: {}", delay.as_millis(), reason);

        tokio::spawn(async move {
            sleep(delay).await;
            orchestrator
                .initiate_failover(&reason, FailoverTrigger::Scheduled)
                .await
        })
    }

    /// master 看门狗：master 的副本集状态变为 failed 时自动切换
    pub fn start_master_watchdog(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let period = Duration::from_millis(self.config.watchdog_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if orchestrator.is_in_progress() {
                    continue;
                }

                let master_failed = orchestrator
                    .current_master()
                    .and_then(|id| orchestrator.registry.cluster_node(&id))
                    .filter(|n| n.status == ClusterNodeStatus::Failed);

                if let Some(master) = master_failed {
                    log::warn!("Master {} reported failed, initiating failover", master.id);
                    let _ = orchestrator
                        .handle_master_lost(&master.id, "master node failed")
                        .await;
                }
            }
        })
    }

    /// 最近的故障转移记录（新 → 旧）
    pub fn history(&self, limit: usize) -> Vec<FailoverEvent> {
        self.history.read().iter().rev().take(limit).cloned().collect()
    }

    /// 全部记录（旧 → 新）
    pub fn all_events(&self) -> Vec<FailoverEvent> {
        self.history.read().iter().cloned().collect()
    }

    pub fn stats(&self) -> FailoverStats {
        FailoverStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            rollbacks: self.counters.rollbacks.load(Ordering::Relaxed),
            total_downtime_ms: self.counters.downtime_ms.load(Ordering::Relaxed),
        }
    }
}
