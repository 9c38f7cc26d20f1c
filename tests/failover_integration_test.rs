//! 故障转移集成测试
//!
//! 健康检查 → 协调器 → 注册表的端到端流程

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use qaha::balancer::FailoverPolicy;
use qaha::cluster::{ClusterNode, ClusterNodeStatus, LoadBalancerNode, NodeRegistry, NodeRole};
use qaha::failover::{
    FailoverConfig, FailoverError, FailoverOrchestrator, FailoverTrigger, FlagWriteGate, WriteGate,
};
use qaha::health::{HealthCheckSpec, HealthMonitor, HealthProbe, HealthTransition};
use qaha::notification::{EventBus, HaEvent};
use qaha::replication::{
    ReplicaReport, ReplicationConfig, ReplicationMode, ReplicationMonitor, ReportedReplicaProbe,
};
use tokio::time::Duration;

struct Cluster {
    registry: Arc<NodeRegistry>,
    probe: Arc<ReportedReplicaProbe>,
    gate: Arc<FlagWriteGate>,
    bus: Arc<EventBus>,
    orchestrator: Arc<FailoverOrchestrator>,
}

/// M (lag 0), S1 (priority 90, lag 50ms), S2 (priority 80, lag 2000ms)
fn three_node_cluster(load_balancer: Vec<LoadBalancerNode>) -> Cluster {
    let registry = Arc::new(NodeRegistry::with_nodes(
        load_balancer,
        vec![
            ClusterNode::new("M", NodeRole::Master, 100),
            ClusterNode::new("S1", NodeRole::Slave, 90).with_lag(50),
            ClusterNode::new("S2", NodeRole::Slave, 80).with_lag(2000),
        ],
    ));
    let probe = Arc::new(ReportedReplicaProbe::default());
    probe.report("S1", ReplicaReport::new(50));
    probe.report("S2", ReplicaReport::new(2000));

    let gate = Arc::new(FlagWriteGate::new());
    let bus = Arc::new(EventBus::new());
    let orchestrator = Arc::new(FailoverOrchestrator::new(
        registry.clone(),
        probe.clone(),
        gate.clone(),
        bus.clone(),
        FailoverConfig::default(),
        FailoverPolicy::Immediate,
        Duration::from_millis(0),
        ReplicationMode::SemiSynchronous,
    ));

    Cluster {
        registry,
        probe,
        gate,
        bus,
        orchestrator,
    }
}

fn drain_names(rx: &mut tokio::sync::mpsc::UnboundedReceiver<HaEvent>) -> Vec<&'static str> {
    std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.name()).collect()
}

/// 测试三节点场景：选择 S1，M 降级，记录一条事件
#[tokio::test]
async fn test_three_node_failover_scenario() {
    let c = three_node_cluster(vec![]);

    // S1 在同步等待中追平
    c.probe.report("S1", ReplicaReport::new(20));

    let event = c
        .orchestrator
        .initiate_failover("test", FailoverTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(event.to_node, "S1");
    assert_eq!(event.from_node.as_deref(), Some("M"));
    assert!(event.rollback_available);
    assert!(!event.data_loss);

    let s1 = c.registry.cluster_node("S1").unwrap();
    assert_eq!(s1.role, NodeRole::Master);
    assert_eq!(s1.priority, 100);

    let m = c.registry.cluster_node("M").unwrap();
    assert_eq!(m.role, NodeRole::Slave);

    // S2 不动
    assert_eq!(c.registry.cluster_node("S2").unwrap().role, NodeRole::Slave);

    let history = c.orchestrator.history(10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to_node, "S1");

    assert!(c.gate.writes_enabled());
    assert_eq!(c.orchestrator.current_master().as_deref(), Some("S1"));
}

/// 测试互斥：进行中的故障转移会拒绝第二次调用，且不修改任何节点
#[tokio::test(start_paused = true)]
async fn test_concurrent_failover_rejected() {
    let c = three_node_cluster(vec![]);
    // S1 追不平，第一次调用停在同步等待中
    c.probe.report("S1", ReplicaReport::new(500));

    let first = {
        let orchestrator = c.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .initiate_failover("first", FailoverTrigger::Manual)
                .await
        })
    };

    while !c.orchestrator.is_in_progress() {
        tokio::task::yield_now().await;
    }

    let before = c.registry.cluster_nodes();
    let second = c
        .orchestrator
        .initiate_failover("second", FailoverTrigger::Manual)
        .await;
    assert_eq!(second.unwrap_err(), FailoverError::AlreadyInProgress);

    let after = c.registry.cluster_nodes();
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.role, a.role);
        assert_eq!(b.status, a.status);
    }

    // 第一次调用最终同步超时并回滚
    let result = first.await.unwrap();
    assert!(matches!(result, Err(FailoverError::SyncTimeout { .. })));
    assert_eq!(c.registry.cluster_node("M").unwrap().role, NodeRole::Master);
    assert!(c.gate.writes_enabled());
    assert!(!c.orchestrator.is_in_progress());
    assert!(c.orchestrator.history(10).is_empty());
}

/// 测试预检查：延迟 >= 5000ms 的候选永远不会被提升
#[tokio::test]
async fn test_precheck_blocks_lagging_candidate() {
    let c = three_node_cluster(vec![]);
    let mut rx = c.bus.subscribe("test");

    // 注册表里 S1 仍是 50ms，但实际测得 6000ms
    c.probe.report("S1", ReplicaReport::new(6000));

    let result = c
        .orchestrator
        .initiate_failover("test", FailoverTrigger::Manual)
        .await;

    match result {
        Err(FailoverError::PreCheckFailed { node_id, .. }) => assert_eq!(node_id, "S1"),
        other => panic!("unexpected result: {:?}", other),
    }

    assert_eq!(c.registry.cluster_node("M").unwrap().role, NodeRole::Master);
    assert_eq!(c.registry.cluster_node("S1").unwrap().role, NodeRole::Slave);
    assert_eq!(c.orchestrator.current_master().as_deref(), Some("M"));
    assert!(c.orchestrator.history(10).is_empty());
    assert_eq!(c.gate.suspension_count(), 0);

    let names = drain_names(&mut rx);
    assert_eq!(names, vec!["failover:started", "failover:failed"]);

    let stats = c.orchestrator.stats();
    assert_eq!(stats.attempts, 1);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.rollbacks, 0);
}

/// 测试复制监控：超过 maxLag 的副本在下一次巡检时告警
#[tokio::test]
async fn test_replication_lag_event() {
    let c = three_node_cluster(vec![]);
    let mut rx = c.bus.subscribe("test");

    let monitor = ReplicationMonitor::new(
        c.registry.clone(),
        c.probe.clone(),
        ReplicationConfig {
            max_lag_ms: 1000,
            ..Default::default()
        },
        c.bus.clone(),
    );

    c.probe.report("S1", ReplicaReport::new(1500));
    c.probe.report("S2", ReplicaReport::new(10));
    let tick = monitor.tick().await;
    assert_eq!(tick.lagging, vec!["S1".to_string()]);

    match rx.try_recv().unwrap() {
        HaEvent::ReplicationLag {
            node_id,
            lag_ms,
            threshold_ms,
            ..
        } => {
            assert_eq!(node_id, "S1");
            assert_eq!(lag_ms, 1500);
            assert_eq!(threshold_ms, 1000);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(rx.try_recv().is_err());

    // 延迟写回注册表，角色不变
    let s1 = c.registry.cluster_node("S1").unwrap();
    assert_eq!(s1.lag_ms, 1500);
    assert_eq!(s1.role, NodeRole::Slave);
    assert_eq!(c.registry.cluster_node("S2").unwrap().lag_ms, 10);
}

/// 一直失败的健康探针
struct DownProbe {
    calls: AtomicUsize,
}

#[async_trait]
impl HealthProbe for DownProbe {
    async fn probe(&self, _node: &LoadBalancerNode, _spec: &HealthCheckSpec) -> qaha::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }
}

/// 测试 master 健康检查失败后自动切换
#[tokio::test]
async fn test_unhealthy_master_triggers_failover() {
    let c = three_node_cluster(vec![
        LoadBalancerNode::new("M", "127.0.0.1:7001"),
        LoadBalancerNode::new("S1", "127.0.0.1:7002"),
    ]);
    let mut rx = c.bus.subscribe("test");

    let probe = Arc::new(DownProbe {
        calls: AtomicUsize::new(0),
    });
    let spec = HealthCheckSpec {
        retries: 1,
        unhealthy_threshold: 3,
        ..Default::default()
    };
    let monitor = HealthMonitor::new(c.registry.clone(), spec, probe.clone(), c.bus.clone())
        .with_failover(c.orchestrator.clone());

    assert_eq!(monitor.check_node("M").await, None);
    assert_eq!(monitor.check_node("M").await, None);
    assert_eq!(c.orchestrator.current_master().as_deref(), Some("M"));

    assert_eq!(
        monitor.check_node("M").await,
        Some(HealthTransition::BecameUnhealthy)
    );
    // 每次检查 1 + retries 次探测
    assert_eq!(probe.calls.load(Ordering::SeqCst), 6);

    assert_eq!(c.orchestrator.current_master().as_deref(), Some("S1"));
    let history = c.orchestrator.history(1);
    assert_eq!(history[0].trigger, FailoverTrigger::Automatic);

    let names = drain_names(&mut rx);
    assert!(names.contains(&"node:unhealthy"));
    assert!(names.contains(&"failover:completed"));

    // 新 master 再失效时没有可提升的 slave（M 为 standby，S2 延迟过大），不重试
    for _ in 0..3 {
        monitor.check_node("S1").await;
    }
    assert_eq!(c.orchestrator.history(10).len(), 1);
    assert_eq!(c.orchestrator.stats().failures, 1);
    assert_eq!(c.orchestrator.current_master().as_deref(), Some("S1"));
}

/// 测试 graceful 策略：先把 master 的服务节点置为 draining
#[tokio::test(start_paused = true)]
async fn test_graceful_policy_drains_first() {
    let registry = Arc::new(NodeRegistry::with_nodes(
        vec![LoadBalancerNode::new("M", "127.0.0.1:7001")],
        vec![
            ClusterNode::new("M", NodeRole::Master, 100),
            ClusterNode::new("S1", NodeRole::Slave, 90).with_lag(10),
        ],
    ));
    let probe = Arc::new(ReportedReplicaProbe::new(Duration::from_secs(60)));
    probe.report("S1", ReplicaReport::new(10));

    let orchestrator = FailoverOrchestrator::new(
        registry.clone(),
        probe,
        Arc::new(FlagWriteGate::new()),
        Arc::new(EventBus::new()),
        FailoverConfig::default(),
        FailoverPolicy::Graceful,
        Duration::from_secs(5),
        ReplicationMode::Asynchronous,
    );

    let started = tokio::time::Instant::now();
    let event = orchestrator
        .handle_master_lost("M", "master down")
        .await
        .unwrap()
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(event.to_node, "S1");
    // 异步复制且提升时仍有延迟
    assert!(event.data_loss);
    assert_eq!(
        registry.load_balancer_node("M").unwrap().status,
        qaha::cluster::NodeHealth::Draining
    );
    assert_eq!(
        registry.cluster_node("M").unwrap().status,
        ClusterNodeStatus::Standby
    );
}
