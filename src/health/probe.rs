//! 健康探针
//!
//! 探针只回答"这次探测是否通过"，状态翻转由 `HealthMonitor` 的阈值决定。

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::spec::{HealthCheckSpec, ProbeKind};
use crate::cluster::LoadBalancerNode;
use crate::{HaError, Result};

/// 健康探针
///
/// `Ok(true)` 通过，`Ok(false)` 节点有响应但不符合预期，
/// `Err` 网络错误或超时。
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, node: &LoadBalancerNode, spec: &HealthCheckSpec) -> Result<bool>;
}

/// HTTP 探针
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HaError::ProbeError(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client })
    }

    fn url_for(node: &LoadBalancerNode, spec: &HealthCheckSpec) -> String {
        let base = node.address.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{}{}", base, spec.path)
        } else {
            format!("http://{}{}", base, spec.path)
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, node: &LoadBalancerNode, spec: &HealthCheckSpec) -> Result<bool> {
        let method = reqwest::Method::from_bytes(spec.method.to_uppercase().as_bytes())
            .map_err(|e| HaError::ConfigError(format!("Invalid probe method {}: {}", spec.method, e)))?;

        let response = self
            .client
            .request(method, Self::url_for(node, spec))
            .timeout(Duration::from_millis(spec.timeout_ms))
            .send()
            .await
            .map_err(|e| HaError::ProbeError(format!("{}: {}", node.id, e)))?;

        Ok(spec.accepts(response.status().as_u16()))
    }
}

/// TCP 连接探针
#[derive(Debug, Default)]
pub struct TcpHealthProbe;

#[async_trait]
impl HealthProbe for TcpHealthProbe {
    async fn probe(&self, node: &LoadBalancerNode, spec: &HealthCheckSpec) -> Result<bool> {
        let timeout = Duration::from_millis(spec.timeout_ms);
        match tokio::time::timeout(timeout, TcpStream::connect(node.address.as_str())).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => Err(HaError::ProbeError(format!("{}: {}", node.id, e))),
            Err(_) => Err(HaError::ProbeError(format!(
                "{}: connect timed out after {}ms",
                node.id, spec.timeout_ms
            ))),
        }
    }
}

/// 按策略构造探针
pub fn probe_for(spec: &HealthCheckSpec) -> Result<std::sync::Arc<dyn HealthProbe>> {
    Ok(match spec.probe {
        ProbeKind::Http => std::sync::Arc::new(HttpHealthProbe::new()?),
        ProbeKind::Tcp => std::sync::Arc::new(TcpHealthProbe),
    })
}
