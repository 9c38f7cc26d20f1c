//! 配置管理模块
//!
//! 全部配置来自一个 TOML 文件（默认 `config/ha.toml`），每个分段都可省略。

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::balancer::LoadBalancingStrategy;
use crate::cluster::{ClusterNode, ClusterNodeStatus, LoadBalancerNode, NodeRole};
use crate::failover::FailoverConfig;
use crate::health::HealthCheckSpec;
use crate::replication::ReplicationConfig;
use crate::{HaError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HaConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub strategy: LoadBalancingStrategy,
    #[serde(default)]
    pub health_check: HealthCheckSpec,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub affinity: AffinityConfig,
    #[serde(default)]
    pub load_balancer: Vec<LoadBalancerNodeConfig>,
    #[serde(default)]
    pub cluster: Vec<ClusterNodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            environment: default_environment(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl HttpConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// 指标重算间隔（毫秒）
    #[serde(default = "default_metrics_interval_ms")]
    pub interval_ms: u64,
    /// rps 统计窗口（秒）
    #[serde(default = "default_request_window_secs")]
    pub request_window_secs: u64,
    /// 请求计数保留时长（秒）
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// 是否导出 Prometheus 指标
    #[serde(default = "default_true")]
    pub prometheus: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_metrics_interval_ms(),
            request_window_secs: default_request_window_secs(),
            retention_secs: default_retention_secs(),
            prometheus: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityConfig {
    #[serde(default = "default_affinity_cleanup_ms")]
    pub cleanup_interval_ms: u64,
    #[serde(default = "default_affinity_max_entries")]
    pub max_entries: usize,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: default_affinity_cleanup_ms(),
            max_entries: default_affinity_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerNodeConfig {
    pub id: String,
    pub address: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// 同机部署的副本集成员；该节点健康检查失败即视为该成员失联
    #[serde(default)]
    pub cluster_id: Option<String>,
}

impl LoadBalancerNodeConfig {
    pub fn to_node(&self) -> LoadBalancerNode {
        let node =
            LoadBalancerNode::new(self.id.clone(), self.address.clone()).with_weight(self.weight);
        match self.cluster_id {
            Some(ref cluster_id) => node.with_cluster_id(cluster_id.clone()),
            None => node,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNodeConfig {
    pub id: String,
    pub role: NodeRole,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_cluster_status")]
    pub status: ClusterNodeStatus,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub data_version: String,
}

impl ClusterNodeConfig {
    pub fn to_node(&self) -> ClusterNode {
        let mut node = ClusterNode::new(self.id.clone(), self.role, self.priority)
            .with_status(self.status);
        node.endpoints = self.endpoints.clone();
        node.data_version = self.data_version.clone();
        node
    }
}

// 默认值函数
fn default_service_name() -> String {
    "qaha".to_string()
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8095
}
fn default_metrics_interval_ms() -> u64 {
    5000
}
fn default_request_window_secs() -> u64 {
    60
}
fn default_retention_secs() -> u64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_affinity_cleanup_ms() -> u64 {
    60_000
}
fn default_affinity_max_entries() -> usize {
    1000
}
fn default_weight() -> u32 {
    100
}
fn default_cluster_status() -> ClusterNodeStatus {
    ClusterNodeStatus::Active
}

impl HaConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| HaError::ConfigError(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    pub fn load_default() -> Result<Self> {
        Self::load_from_file("config/ha.toml")
    }

    /// 解析并校验
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: HaConfig = toml::from_str(content)
            .map_err(|e| HaError::ConfigError(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let hc = &self.health_check;
        if hc.healthy_threshold == 0 || hc.unhealthy_threshold == 0 {
            return Err(HaError::ConfigError(
                "health_check thresholds must be at least 1".to_string(),
            ));
        }
        if hc.interval_ms == 0 || hc.timeout_ms == 0 {
            return Err(HaError::ConfigError(
                "health_check interval_ms and timeout_ms must be positive".to_string(),
            ));
        }
        if self.replication.check_interval_ms == 0 || self.metrics.interval_ms == 0 {
            return Err(HaError::ConfigError(
                "monitor intervals must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.load_balancer {
            if !seen.insert(node.id.as_str()) {
                return Err(HaError::ConfigError(format!(
                    "Duplicate load balancer node id: {}",
                    node.id
                )));
            }
            if node.address.is_empty() {
                return Err(HaError::ConfigError(format!(
                    "Load balancer node {} has an empty address",
                    node.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for node in &self.cluster {
            if !seen.insert(node.id.as_str()) {
                return Err(HaError::ConfigError(format!(
                    "Duplicate cluster node id: {}",
                    node.id
                )));
            }
            if node.endpoints.is_empty() {
                return Err(HaError::ConfigError(format!(
                    "Cluster node {} has no endpoints",
                    node.id
                )));
            }
            if node.endpoints.iter().any(|e| e.is_empty()) {
                return Err(HaError::ConfigError(format!(
                    "Cluster node {} has an empty endpoint",
                    node.id
                )));
            }
        }

        for node in &self.load_balancer {
            if let Some(ref cluster_id) = node.cluster_id {
                if !seen.contains(cluster_id.as_str()) {
                    return Err(HaError::ConfigError(format!(
                        "Load balancer node {} refers to unknown cluster node {}",
                        node.id, cluster_id
                    )));
                }
            }
        }

        let masters = self.cluster.iter().filter(|n| n.role == NodeRole::Master).count();
        if masters > 1 {
            return Err(HaError::ConfigError(format!(
                "At most one master may be configured, found {}",
                masters
            )));
        }

        Ok(())
    }

    pub fn load_balancer_nodes(&self) -> Vec<LoadBalancerNode> {
        self.load_balancer.iter().map(|n| n.to_node()).collect()
    }

    pub fn cluster_nodes(&self) -> Vec<ClusterNode> {
        self.cluster.iter().map(|n| n.to_node()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{FailoverPolicy, StrategyKind};
    use crate::replication::ReplicationMode;
    use std::io::Write;

    const SAMPLE: &str = r#"
[service]
name = "qaha-test"

[http]
port = 9000

[strategy]
kind = "least-connections"
session_affinity = true
failover_policy = "graceful"

[health_check]
probe = "tcp"
unhealthy_threshold = 2

[replication]
mode = "asynchronous"
max_lag_ms = 500

[[load_balancer]]
id = "web-1"
address = "10.0.0.1:8080"
weight = 3
cluster_id = "db-1"

[[load_balancer]]
id = "web-2"
address = "10.0.0.2:8080"

[[cluster]]
id = "db-1"
role = "master"
priority = 100
endpoints = ["10.0.1.1:5432"]

[[cluster]]
id = "db-2"
role = "slave"
priority = 90
endpoints = ["10.0.1.2:5432"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = HaConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.service.name, "qaha-test");
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.http.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.strategy.kind, StrategyKind::LeastConnections);
        assert_eq!(config.strategy.failover_policy, FailoverPolicy::Graceful);
        assert_eq!(config.health_check.unhealthy_threshold, 2);
        assert_eq!(config.health_check.healthy_threshold, 2);
        assert_eq!(config.replication.mode, ReplicationMode::Asynchronous);
        assert_eq!(config.failover.precheck_max_lag_ms, 5000);

        let lb = config.load_balancer_nodes();
        assert_eq!(lb[0].weight, 3);
        assert_eq!(lb[1].weight, 100);
        assert_eq!(lb[0].cluster_member(), "db-1");
        assert_eq!(lb[1].cluster_member(), "web-2");

        let cluster = config.cluster_nodes();
        assert!(cluster[0].is_master());
        assert_eq!(cluster[0].endpoints, vec!["10.0.1.1:5432".to_string()]);
        assert!(cluster[1].is_active());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HaConfig::from_toml("").unwrap();
        assert_eq!(config.strategy.kind, StrategyKind::RoundRobin);
        assert_eq!(config.metrics.request_window_secs, 60);
        assert_eq!(config.affinity.max_entries, 1000);
        assert!(config.load_balancer.is_empty());
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let err = HaConfig::from_toml("[health_check]\nhealthy_threshold = 0\n").unwrap_err();
        assert!(matches!(err, HaError::ConfigError(_)));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let toml = r#"
[[load_balancer]]
id = "a"
address = "h:1"
[[load_balancer]]
id = "a"
address = "h:2"
"#;
        assert!(HaConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_rejects_two_masters() {
        let toml = r#"
[[cluster]]
id = "a"
role = "master"
endpoints = ["h:1"]
[[cluster]]
id = "b"
role = "master"
endpoints = ["h:2"]
"#;
        assert!(HaConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_rejects_cluster_node_without_endpoints() {
        let err = HaConfig::from_toml("[[cluster]]\nid = \"m\"\nrole = \"master\"\npriority = 100\n")
            .unwrap_err();
        assert!(matches!(err, HaError::ConfigError(ref m) if m.contains("no endpoints")));

        let err = HaConfig::from_toml("[[cluster]]\nid = \"m\"\nrole = \"master\"\nendpoints = [\"\"]\n")
            .unwrap_err();
        assert!(matches!(err, HaError::ConfigError(_)));
    }

    #[test]
    fn test_rejects_unknown_cluster_link() {
        let toml = r#"
[[load_balancer]]
id = "web-1"
address = "h:1"
cluster_id = "db-9"

[[cluster]]
id = "db-1"
role = "master"
endpoints = ["h:5432"]
"#;
        assert!(HaConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = HaConfig::from_toml(include_str!("../../config/ha.toml")).unwrap();
        assert!(config.cluster.iter().all(|n| !n.endpoints.is_empty()));

        let master = config
            .cluster
            .iter()
            .find(|n| n.role == NodeRole::Master)
            .unwrap();
        assert!(config
            .load_balancer_nodes()
            .iter()
            .any(|n| n.cluster_member() == master.id));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = HaConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.load_balancer.len(), 2);

        assert!(HaConfig::load_from_file("/nonexistent/ha.toml").is_err());
    }
}
