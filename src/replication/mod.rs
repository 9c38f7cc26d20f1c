//! 副本复制监控模块
//!
//! ```text
//! Master                  Slave 1              Slave 2
//!   |                        |                    |
//!   |<---- lag report -------|                    |
//!   |<---- lag report ----------------------------|
//!   |
//! ReplicationMonitor ──> NodeRegistry (lag_ms)
//!         └──────────> EventBus (replication:lag)
//! ```

pub mod config;
pub mod monitor;
pub mod probe;

pub use config::{ReplicationConfig, ReplicationMode};
pub use monitor::{ReplicationMonitor, ReplicationTick};
pub use probe::{ReplicaProbe, ReplicaReport, ReportedReplicaProbe, MAX_REPORTED_LAG_MS};
