//! 故障转移模块
//!
//! 实现主从切换：
//! - 候选选择（优先级 + 复制延迟）
//! - 预检查与写入暂停
//! - 提升 / 降级 / 回滚
//! - 手动、计划、自动三种触发方式

pub mod event;
pub mod orchestrator;
pub mod write_gate;

pub use event::{FailoverError, FailoverEvent, FailoverState, FailoverTrigger};
pub use orchestrator::{FailoverConfig, FailoverOrchestrator, FailoverStats};
pub use write_gate::{FlagWriteGate, WriteGate};
