//! 负载均衡模块
//!
//! ```text
//! RoutingRequest ──> SelectionEngine ──> NodeRegistry (healthy 节点)
//!                        │
//!                        └──> SessionAffinityMap
//! ```

pub mod affinity;
pub mod request;
pub mod selector;
pub mod strategy;

pub use affinity::SessionAffinityMap;
pub use request::RoutingRequest;
pub use selector::{hash_index, SelectionEngine};
pub use strategy::{FailoverPolicy, LoadBalancingStrategy, StrategyKind};
