//! 集群节点管理模块
//!
//! @yutiansut @quantaxis
//!
//! - 负载均衡节点池（服务节点，带权重和实时计数）
//! - 副本集（master / slave / arbiter）
//! - 节点注册表（健康检查、选择引擎、故障转移共享）

pub mod node;
pub mod registry;

pub use node::{
    ClusterNode, ClusterNodeStatus, LoadBalancerNode, NodeHealth, NodeRole, MAX_PRIORITY,
};
pub use registry::{NodeInventory, NodeRegistry};
