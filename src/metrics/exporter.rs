//! Prometheus 指标导出
//!
//! @yutiansut @quantaxis
//!
//! 每个服务实例持有独立的 Registry，同进程内多实例互不干扰。

use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use super::aggregator::HAMetrics;
use crate::cluster::NodeInventory;
use crate::{HaError, Result};

pub struct HaPrometheus {
    registry: Registry,

    pub availability: Gauge,
    pub failovers_total: IntGauge,
    pub failover_avg_duration_ms: Gauge,
    pub replication_lag_ms: GaugeVec,
    pub data_consistency: Gauge,
    pub healthy_nodes: IntGauge,
    pub active_connections: GaugeVec,
    pub selections: IntCounterVec,
    pub requests_per_sec: Gauge,
    pub error_rate: Gauge,
}

fn metric_err(e: prometheus::Error) -> HaError {
    HaError::InternalError(format!("prometheus: {}", e))
}

impl HaPrometheus {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("qaha".to_string()), None).map_err(metric_err)?;

        let availability = Gauge::new("availability_percent", "Service availability in percent")
            .map_err(metric_err)?;
        let failovers_total = IntGauge::new("failovers_total", "Completed failovers")
            .map_err(metric_err)?;
        let failover_avg_duration_ms = Gauge::new(
            "failover_avg_duration_ms",
            "Mean failover duration in milliseconds",
        )
        .map_err(metric_err)?;
        let replication_lag_ms = GaugeVec::new(
            Opts::new("replication_lag_ms", "Replication lag per cluster node"),
            &["node_id"],
        )
        .map_err(metric_err)?;
        let data_consistency = Gauge::new("data_consistency_percent", "Mean replica consistency")
            .map_err(metric_err)?;
        let healthy_nodes = IntGauge::new("healthy_nodes", "Healthy load balancer nodes")
            .map_err(metric_err)?;
        let active_connections = GaugeVec::new(
            Opts::new("active_connections", "Active connections per load balancer node"),
            &["node_id"],
        )
        .map_err(metric_err)?;
        let selections = IntCounterVec::new(
            Opts::new("selections_total", "Node selections"),
            &["node_id", "strategy"],
        )
        .map_err(metric_err)?;
        let requests_per_sec = Gauge::new("requests_per_sec", "Request rate over the sliding window")
            .map_err(metric_err)?;
        let error_rate = Gauge::new("error_rate", "Mean node error rate").map_err(metric_err)?;

        registry.register(Box::new(availability.clone())).map_err(metric_err)?;
        registry.register(Box::new(failovers_total.clone())).map_err(metric_err)?;
        registry.register(Box::new(failover_avg_duration_ms.clone())).map_err(metric_err)?;
        registry.register(Box::new(replication_lag_ms.clone())).map_err(metric_err)?;
        registry.register(Box::new(data_consistency.clone())).map_err(metric_err)?;
        registry.register(Box::new(healthy_nodes.clone())).map_err(metric_err)?;
        registry.register(Box::new(active_connections.clone())).map_err(metric_err)?;
        registry.register(Box::new(selections.clone())).map_err(metric_err)?;
        registry.register(Box::new(requests_per_sec.clone())).map_err(metric_err)?;
        registry.register(Box::new(error_rate.clone())).map_err(metric_err)?;

        Ok(Self {
            registry,
            availability,
            failovers_total,
            failover_avg_duration_ms,
            replication_lag_ms,
            data_consistency,
            healthy_nodes,
            active_connections,
            selections,
            requests_per_sec,
            error_rate,
        })
    }

    /// 用最新快照刷新 gauge
    pub fn observe(&self, metrics: &HAMetrics, inventory: &NodeInventory) {
        self.availability.set(metrics.availability);
        self.failovers_total.set(metrics.total_failovers as i64);
        self.failover_avg_duration_ms.set(metrics.avg_failover_duration_ms);
        self.data_consistency.set(metrics.data_consistency);
        self.healthy_nodes.set(metrics.active_nodes as i64);
        self.requests_per_sec.set(metrics.requests_per_sec);
        self.error_rate.set(metrics.error_rate);

        for node in &inventory.cluster {
            self.replication_lag_ms
                .with_label_values(&[node.id.as_str()])
                .set(node.lag_ms as f64);
        }
        for node in &inventory.load_balancer {
            self.active_connections
                .with_label_values(&[node.id.as_str()])
                .set(node.active_connections as f64);
        }
    }

    pub fn record_selection(&self, node_id: &str, strategy: &str) {
        self.selections.with_label_values(&[node_id, strategy]).inc();
    }

    /// 文本格式导出
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_err)?;
        String::from_utf8(buffer).map_err(|e| HaError::SerializationError(e.to_string()))
    }
}
