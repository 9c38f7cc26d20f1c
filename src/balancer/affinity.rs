//! 会话保持
//!
//! client_id -> node_id，带超时。不持久化。
//! 清理任务按条目超时淘汰；写入新客户端时若已达上限，先淘汰过期条目，
//! 仍满则整表清空。

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
struct AffinityEntry {
    node_id: String,
    expires_at: Instant,
}

/// 会话保持表
#[derive(Debug)]
pub struct SessionAffinityMap {
    entries: DashMap<String, AffinityEntry>,
    max_entries: usize,
}

impl SessionAffinityMap {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// 查询未过期的映射
    pub fn lookup(&self, client_id: &str) -> Option<String> {
        let entry = self.entries.get(client_id)?;
        if entry.expires_at > Instant::now() {
            Some(entry.node_id.clone())
        } else {
            None
        }
    }

    /// 写入或刷新映射
    pub fn bind(&self, client_id: impl Into<String>, node_id: impl Into<String>, ttl: Duration) {
        let client_id = client_id.into();
        if !self.entries.contains_key(&client_id) && self.entries.len() >= self.max_entries {
            let now = Instant::now();
            self.entries.retain(|_, e| e.expires_at > now);
            if self.entries.len() >= self.max_entries {
                log::info!(
                    "Session affinity map reached {} entries, clearing",
                    self.max_entries
                );
                self.entries.clear();
            }
        }

        self.entries.insert(
            client_id,
            AffinityEntry {
                node_id: node_id.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&self, client_id: &str) {
        self.entries.remove(client_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 淘汰过期条目，返回移除条数
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }

    pub fn start_cleanup(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let map = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = map.cleanup();
                if removed > 0 {
                    log::debug!("Session affinity cleanup removed {} entries", removed);
                }
            }
        })
    }
}

impl Default for SessionAffinityMap {
    fn default() -> Self {
        Self::new(1000)
    }
}
