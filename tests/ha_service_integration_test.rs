//! 高可用服务集成测试
//!
//! 通过 `HaService` 的公开接口验证选择、计数与指标

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use qaha::balancer::{LoadBalancingStrategy, RoutingRequest, StrategyKind};
use qaha::cluster::{ClusterNode, LoadBalancerNode, NodeHealth};
use qaha::failover::FlagWriteGate;
use qaha::health::{HealthCheckSpec, HealthProbe};
use qaha::replication::{ReplicaReport, ReportedReplicaProbe};
use qaha::{HaConfig, HaService};
use rand::Rng;

const CONFIG: &str = r#"
[service]
name = "integration"

[strategy]
kind = "round-robin"

[health_check]
retries = 0
healthy_threshold = 1
unhealthy_threshold = 1

[[load_balancer]]
id = "a"
address = "127.0.0.1:7101"

[[load_balancer]]
id = "b"
address = "127.0.0.1:7102"

[[load_balancer]]
id = "c"
address = "127.0.0.1:7103"

[[cluster]]
id = "db-1"
role = "master"
priority = 100
endpoints = ["127.0.0.1:5432"]

[[cluster]]
id = "db-2"
role = "slave"
priority = 90
endpoints = ["127.0.0.1:5433"]
"#;

fn load_config() -> HaConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    HaConfig::load_from_file(file.path()).unwrap()
}

/// 总是成功的健康探针
struct UpProbe;

#[async_trait]
impl HealthProbe for UpProbe {
    async fn probe(&self, _node: &LoadBalancerNode, _spec: &HealthCheckSpec) -> qaha::Result<bool> {
        Ok(true)
    }
}

fn service() -> (HaService, Arc<ReportedReplicaProbe>) {
    let reports = Arc::new(ReportedReplicaProbe::default());
    let service = HaService::with_probes(
        load_config(),
        Arc::new(UpProbe),
        reports.clone(),
        Arc::new(FlagWriteGate::new()),
    )
    .unwrap();
    (service, reports)
}

fn min_active(nodes: &[LoadBalancerNode]) -> u64 {
    nodes
        .iter()
        .filter(|n| n.status == NodeHealth::Healthy)
        .map(|n| n.active_connections)
        .min()
        .unwrap()
}

/// 测试轮询公平性：300 次选择均分到 3 个节点
#[test]
fn test_round_robin_fairness_through_service() {
    let (service, _) = service();
    let req = RoutingRequest::new("/");
    let mut counts: HashMap<String, usize> = HashMap::new();

    for _ in 0..300 {
        let id = service.select_node(&req, None).unwrap().id;
        service.release_connection(&id).unwrap();
        *counts.entry(id).or_default() += 1;
    }

    for id in ["a", "b", "c"] {
        assert_eq!(counts[id], 100, "{} selected {} times", id, counts[id]);
    }
}

/// 测试最少连接：任意 record/release 序列后选中的节点连接数最小
#[test]
fn test_least_connections_after_random_bookkeeping() {
    let (service, _) = service();
    let least = LoadBalancingStrategy::new(StrategyKind::LeastConnections);
    let req = RoutingRequest::new("/");
    let ids = ["a", "b", "c"];
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let id = ids[rng.gen_range(0..ids.len())];
        if rng.gen_bool(0.6) {
            service.record_request(id).unwrap();
        } else {
            service.release_connection(id).unwrap();
        }

        let before = service.get_nodes().load_balancer;
        let expected = min_active(&before);
        let chosen = service.select_node(&req, Some(&least)).unwrap();
        // 返回值已包含本次 +1
        assert_eq!(chosen.active_connections - 1, expected);
        service.release_connection(&chosen.id).unwrap();
    }
}

/// 测试加权场景：权重相同的两个节点 10000 次选择各在 [4500, 5500]
#[test]
fn test_weighted_two_nodes() {
    let mut config = HaConfig::default();
    config.strategy.kind = StrategyKind::Weighted;
    config.load_balancer = load_config().load_balancer.into_iter().take(2).collect();
    let service = HaService::from_config(config).unwrap();

    let req = RoutingRequest::new("/");
    let mut a = 0;
    for _ in 0..10_000 {
        if service.select_node(&req, None).unwrap().id == "a" {
            a += 1;
        }
    }
    assert!((4500..=5500).contains(&a), "a selected {} times", a);
}

/// 测试 ip-hash 与会话保持
#[test]
fn test_ip_hash_and_affinity() {
    let (service, _) = service();
    let ip_hash = LoadBalancingStrategy::new(StrategyKind::IpHash);

    let req = RoutingRequest::new("/x").with_forwarded_for("203.0.113.9, 10.0.0.1");
    let first = service.select_node(&req, Some(&ip_hash)).unwrap().id;
    for i in 0..10 {
        let req = RoutingRequest::new(format!("/y/{}", i)).with_forwarded_for("203.0.113.9");
        assert_eq!(service.select_node(&req, Some(&ip_hash)).unwrap().id, first);
    }

    let sticky = LoadBalancingStrategy::new(StrategyKind::RoundRobin).with_affinity(300);
    let req = RoutingRequest::new("/").with_forwarded_for("198.51.100.1");
    let pinned = service.select_node(&req, Some(&sticky)).unwrap().id;
    for _ in 0..6 {
        assert_eq!(service.select_node(&req, Some(&sticky)).unwrap().id, pinned);
    }
}

/// 测试没有 healthy 节点时返回 None
#[test]
fn test_no_capacity() {
    let (service, _) = service();
    for id in ["a", "b", "c"] {
        service.registry().drain(id).unwrap();
    }
    assert!(service.select_node(&RoutingRequest::new("/"), None).is_none());
}

/// 测试指标与降级告警
#[tokio::test]
async fn test_metrics_and_degraded_event() {
    let (service, reports) = service();
    let mut rx = service.subscribe("dashboard");

    service.update_node_metrics("a", Some(20.0), Some(0.3)).unwrap();
    assert!(service.update_node_metrics("a", None, Some(-0.1)).is_err());
    for _ in 0..30 {
        service.select_node(&RoutingRequest::new("/"), None).unwrap();
    }

    let metrics = service.get_metrics();
    assert_eq!(metrics.total_nodes, 3);
    assert_eq!(metrics.active_nodes, 3);
    assert_eq!(metrics.cluster_total_nodes, 2);
    assert!((metrics.error_rate - 0.1).abs() < 1e-9);
    assert!(metrics.requests_per_sec > 0.0);

    reports.report("db-2", ReplicaReport::new(0));
    assert!(service.test_failover().await);

    let metrics = service.get_metrics();
    assert_eq!(metrics.total_failovers, 1);
    assert_eq!(metrics.cluster_active_nodes, 1);

    let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.name())
        .collect();
    assert_eq!(
        names,
        vec!["failover:started", "failover:completed", "ha:degraded"]
    );

    let history = service.get_failover_history(5);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to_node, "db-2");

    // 新 slave 加入后恢复
    service
        .registry()
        .add_cluster_node(ClusterNode::new("db-3", qaha::cluster::NodeRole::Slave, 50));
    service.get_metrics();
    assert_eq!(rx.try_recv().unwrap().name(), "ha:recovered");
}
