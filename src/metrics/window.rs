//! 请求速率滑动窗口
//!
//! 按秒计数，rps 取最近 `window_secs` 秒的平均值，超过 `retention_secs` 的桶被清理。

use std::collections::BTreeMap;

use parking_lot::Mutex;

#[derive(Debug)]
pub struct RequestWindow {
    /// unix 秒 -> 请求数
    buckets: Mutex<BTreeMap<i64, u64>>,
    window_secs: u64,
    retention_secs: u64,
}

impl RequestWindow {
    pub fn new(window_secs: u64, retention_secs: u64) -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            window_secs: window_secs.max(1),
            retention_secs: retention_secs.max(window_secs),
        }
    }

    pub fn record(&self) {
        self.record_at(chrono::Utc::now().timestamp());
    }

    pub fn record_at(&self, second: i64) {
        let mut buckets = self.buckets.lock();
        *buckets.entry(second).or_insert(0) += 1;
    }

    pub fn requests_per_sec(&self) -> f64 {
        self.rate_at(chrono::Utc::now().timestamp())
    }

    /// 以 `now` 为窗口右端计算速率，同时清理过期桶
    pub fn rate_at(&self, now: i64) -> f64 {
        let mut buckets = self.buckets.lock();

        let keep_from = now - self.retention_secs as i64;
        *buckets = buckets.split_off(&keep_from);

        let window_start = now - self.window_secs as i64;
        let total: u64 = buckets
            .range((window_start + 1)..=now)
            .map(|(_, count)| *count)
            .sum();

        total as f64 / self.window_secs as f64
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

impl Default for RequestWindow {
    fn default() -> Self {
        Self::new(60, 300)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_over_window() {
        let window = RequestWindow::default();
        let now = 1_700_000_000;

        for _ in 0..120 {
            window.record_at(now - 10);
        }
        for _ in 0..60 {
            window.record_at(now);
        }
        // 窗口外的请求不计入
        for _ in 0..600 {
            window.record_at(now - 90);
        }

        assert_eq!(window.rate_at(now), 3.0);
    }

    #[test]
    fn test_prune_after_retention() {
        let window = RequestWindow::default();
        let now = 1_700_000_000;
        window.record_at(now - 301);
        window.record_at(now - 200);
        window.record_at(now);

        window.rate_at(now);
        assert_eq!(window.bucket_count(), 2);
    }
}
