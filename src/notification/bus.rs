//! 事件总线
//!
//! 职责：
//! 1. 接收健康检查、复制监控、故障转移发出的领域事件
//! 2. 投递给所有已注册的订阅者（仪表盘、告警、存储）
//! 3. 清理已关闭的订阅通道
//!
//! 各后台任务独立调度，跨任务的事件之间不保证先后顺序。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::event::HaEvent;

/// 总线统计
#[derive(Debug, Default)]
pub struct BusStats {
    /// 已发布事件数
    pub events_published: AtomicU64,

    /// 已投递次数（事件 × 订阅者）
    pub deliveries: AtomicU64,

    /// 因订阅者关闭而投递失败的次数
    pub dropped: AtomicU64,
}

/// 事件总线
#[derive(Debug, Default)]
pub struct EventBus {
    /// 订阅者：subscriber_id -> Sender
    subscribers: DashMap<Arc<str>, mpsc::UnboundedSender<HaEvent>>,

    stats: Arc<BusStats>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者，返回接收端（同名订阅者会被替换）
    pub fn subscribe(&self, subscriber_id: impl Into<Arc<str>>) -> mpsc::UnboundedReceiver<HaEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber_id = subscriber_id.into();
        self.subscribers.insert(subscriber_id.clone(), tx);
        log::info!("Event subscriber registered: {}", subscriber_id);
        rx
    }

    pub fn unsubscribe(&self, subscriber_id: &str) {
        self.subscribers.remove(subscriber_id);
        log::info!("Event subscriber unregistered: {}", subscriber_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// 发布事件
    pub fn publish(&self, event: HaEvent) {
        self.stats.events_published.fetch_add(1, Ordering::Relaxed);
        log::debug!("Publishing {}", event.name());

        let mut closed = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().send(event.clone()) {
                Ok(()) => {
                    self.stats.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    closed.push(entry.key().clone());
                }
            }
        }

        // 迭代结束后再删除，避免持有分片锁时写入
        for id in closed {
            self.subscribers.remove(&id);
            log::warn!("Event subscriber {} closed, removed", id);
        }
    }

    pub fn stats(&self) -> Arc<BusStats> {
        self.stats.clone()
    }
}
