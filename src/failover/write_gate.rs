//! 写入闸门
//!
//! 故障转移期间暂停写入路径。HTTP 层在处理写请求前检查 `writes_enabled()`。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait WriteGate: Send + Sync {
    async fn suspend_writes(&self) -> Result<()>;

    async fn resume_writes(&self) -> Result<()>;

    fn writes_enabled(&self) -> bool;
}

/// 基于原子标志的写入闸门
#[derive(Debug)]
pub struct FlagWriteGate {
    enabled: AtomicBool,
    suspensions: AtomicU64,
}

impl FlagWriteGate {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            suspensions: AtomicU64::new(0),
        }
    }

    /// 累计暂停次数
    pub fn suspension_count(&self) -> u64 {
        self.suspensions.load(Ordering::Relaxed)
    }
}

impl Default for FlagWriteGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WriteGate for FlagWriteGate {
    async fn suspend_writes(&self) -> Result<()> {
        self.enabled.store(false, Ordering::SeqCst);
        self.suspensions.fetch_add(1, Ordering::Relaxed);
        log::info!("Writes suspended");
        Ok(())
    }

    async fn resume_writes(&self) -> Result<()> {
        self.enabled.store(true, Ordering::SeqCst);
        log::info!("Writes resumed");
        Ok(())
    }

    fn writes_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}
