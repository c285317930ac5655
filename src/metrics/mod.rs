//! 指标层：由事件派生的有界时间序列

pub mod collector;

pub use collector::{
    Labels, MetricPoint, MetricSeries, MetricSummary, MetricsCollector, BRAIN_CALLS,
    BRAIN_DURATION_MS, BRAIN_ERRORS, BRAIN_TOKENS, DEFAULT_MAX_SERIES_LEN, MEMORY_OPERATIONS,
    TOOL_CALLS, TOOL_DURATION_MS, TOOL_ERRORS,
};
