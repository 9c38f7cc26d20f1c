//! 高可用指标
//!
//! - `window`: 按秒计数的请求速率窗口
//! - `aggregator`: `HAMetrics` 计算与 ha:degraded 告警
//! - `exporter`: Prometheus 文本导出

pub mod aggregator;
pub mod exporter;
pub mod window;

pub use aggregator::{HAMetrics, MetricsAggregator};
pub use exporter::HaPrometheus;
pub use window::RequestWindow;
