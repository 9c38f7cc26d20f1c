//! 健康检查模块
//!
//! - 探测策略 (`HealthCheckSpec`)
//! - 探针 (HTTP / TCP)
//! - 带滞回阈值的健康监控

pub mod monitor;
pub mod probe;
pub mod spec;

pub use monitor::{HealthMonitor, HealthTransition, HISTORY_CAPACITY};
pub use probe::{probe_for, HealthProbe, HttpHealthProbe, TcpHealthProbe};
pub use spec::{HealthCheckSpec, ProbeKind};
