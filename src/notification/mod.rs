//! 领域事件通知
//!
//! ```text
//! HealthMonitor / ReplicationMonitor / FailoverOrchestrator / MetricsAggregator
//!         ↓
//!      HaEvent
//!         ↓
//!  EventBus (订阅者表)
//!         ↓
//! Dashboard / Alerting (外部)
//! ```

pub mod bus;
pub mod event;

pub use bus::{BusStats, EventBus};
pub use event::HaEvent;
