//! 工具模块

pub mod config;

pub use config::{
    AffinityConfig, ClusterNodeConfig, HaConfig, HttpConfig, LoadBalancerNodeConfig,
    MetricsConfig, ServiceConfig,
};
