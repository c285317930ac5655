//! 指标收集器
//!
//! 每个命名序列是一个有界环形缓冲（默认 1000 点，溢出淘汰最旧点），持续高负载下内存有上限。
//! attach 把事件总线上的 `brain.thinking.*` / `tool.*` / `memory.*` 事件翻译为指标更新，
//! 这是事件与指标唯一的耦合点。

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::types::{
    BRAIN_THINKING_COMPLETED, BRAIN_THINKING_FAILED, BRAIN_THINKING_STARTED, TOOL_COMPLETED,
    TOOL_FAILED,
};
use crate::events::{Event, EventBus, ListenerId};

pub const DEFAULT_MAX_SERIES_LEN: usize = 1000;

pub const BRAIN_CALLS: &str = "brain_thinking_calls";
pub const BRAIN_ERRORS: &str = "brain_thinking_errors";
pub const BRAIN_DURATION_MS: &str = "brain_thinking_duration_ms";
pub const BRAIN_TOKENS: &str = "brain_tokens";
pub const TOOL_CALLS: &str = "tool_calls";
pub const TOOL_ERRORS: &str = "tool_errors";
pub const TOOL_DURATION_MS: &str = "tool_duration_ms";
pub const MEMORY_OPERATIONS: &str = "memory_operations";

pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub labels: Labels,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSeries {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub points: VecDeque<MetricPoint>,
    #[serde(skip)]
    max_len: usize,
}

impl MetricSeries {
    fn new(name: &str, description: &str, unit: &str, max_len: usize) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            unit: unit.to_string(),
            points: VecDeque::new(),
            max_len: max_len.max(1),
        }
    }

    fn push(&mut self, point: MetricPoint) {
        while self.points.len() >= self.max_len {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// get_summary 中单个序列的概要
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricSummary {
    pub description: String,
    pub unit: String,
    pub total_points: usize,
    pub latest_value: Option<f64>,
}

#[derive(Debug)]
pub struct MetricsCollector {
    series: RwLock<HashMap<String, MetricSeries>>,
    max_series_len: usize,
}

fn to_labels(labels: &[(&str, &str)]) -> Labels {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl MetricsCollector {
    pub fn new(max_series_len: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_series_len: max_series_len.max(1),
        }
    }

    /// 预先创建事件翻译会用到的标准序列
    pub fn with_defaults(max_series_len: usize) -> Self {
        let collector = Self::new(max_series_len);
        collector.create_metric(BRAIN_CALLS, "Brain think calls started", "count");
        collector.create_metric(BRAIN_ERRORS, "Brain think calls that failed", "count");
        collector.create_metric(BRAIN_DURATION_MS, "Brain think latency", "ms");
        collector.create_metric(BRAIN_TOKENS, "Tokens consumed per think call", "tokens");
        collector.create_metric(TOOL_CALLS, "Tool dispatch attempts", "count");
        collector.create_metric(TOOL_ERRORS, "Tool dispatches that did not succeed", "count");
        collector.create_metric(TOOL_DURATION_MS, "Tool dispatch latency", "ms");
        collector.create_metric(MEMORY_OPERATIONS, "Memory layer operations", "count");
        collector
    }

    /// 创建序列；已存在时只更新描述与单位，保留已有数据点
    pub fn create_metric(&self, name: &str, description: &str, unit: &str) {
        let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
        match map.get_mut(name) {
            Some(series) => {
                series.description = description.to_string();
                series.unit = unit.to_string();
            }
            None => {
                map.insert(
                    name.to_string(),
                    MetricSeries::new(name, description, unit, self.max_series_len),
                );
            }
        }
    }

    /// 记录一个数据点；序列不存在时自动创建（描述为空）
    pub fn record_value(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        let point = MetricPoint {
            timestamp: Utc::now(),
            value,
            labels: to_labels(labels),
        };
        let mut map = self.series.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(metric = name, "auto-creating metric series");
                MetricSeries::new(name, "", "", self.max_series_len)
            })
            .push(point);
    }

    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.record_value(name, 1.0, labels);
    }

    pub fn record_duration(&self, name: &str, ms: f64, labels: &[(&str, &str)]) {
        self.record_value(name, ms, labels);
    }

    /// 最近 window 内数据点的平均值；窗口内无数据返回 None
    pub fn get_average(&self, name: &str, window: Duration) -> Option<f64> {
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(36500));
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let series = map.get(name)?;
        let (sum, count) = series
            .points
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .fold((0.0, 0usize), |(s, c), p| (s + p.value, c + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    pub fn latest(&self, name: &str) -> Option<f64> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name).and_then(|s| s.points.back()).map(|p| p.value)
    }

    pub fn get_series(&self, name: &str) -> Option<MetricSeries> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name).cloned()
    }

    pub fn get_summary(&self) -> BTreeMap<String, MetricSummary> {
        let map = self.series.read().unwrap_or_else(PoisonError::into_inner);
        map.iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    MetricSummary {
                        description: s.description.clone(),
                        unit: s.unit.clone(),
                        total_points: s.points.len(),
                        latest_value: s.points.back().map(|p| p.value),
                    },
                )
            })
            .collect()
    }

    /// 订阅事件总线；返回注册的监听器句柄
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> Vec<(&'static str, ListenerId)> {
        ["brain.thinking.*", "tool.*", "memory.*"]
            .into_iter()
            .map(|pattern| {
                let collector = Arc::clone(self);
                let id = bus.on(pattern, move |event| {
                    collector.handle_event(event);
                    Ok(())
                });
                (pattern, id)
            })
            .collect()
    }

    /// 事件 -> 指标的翻译表
    pub fn handle_event(&self, event: &Event) {
        let agent = event.str_field("agent").unwrap_or("unknown");
        let tool = event.str_field("tool").unwrap_or("unknown");
        let duration = event.f64_field("duration_ms");

        match event.event_type.as_str() {
            BRAIN_THINKING_STARTED => {
                self.increment_counter(BRAIN_CALLS, &[("agent", agent)]);
            }
            BRAIN_THINKING_COMPLETED => {
                if let Some(ms) = duration {
                    self.record_duration(BRAIN_DURATION_MS, ms, &[("agent", agent)]);
                }
                if let Some(tokens) = event.f64_field("total_tokens") {
                    self.record_value(BRAIN_TOKENS, tokens, &[("agent", agent)]);
                }
            }
            BRAIN_THINKING_FAILED => {
                self.increment_counter(BRAIN_ERRORS, &[("agent", agent)]);
                if let Some(ms) = duration {
                    self.record_duration(BRAIN_DURATION_MS, ms, &[("agent", agent)]);
                }
            }
            TOOL_COMPLETED | TOOL_FAILED => {
                let outcome = event.str_field("outcome").unwrap_or("unknown");
                let labels = [("tool", tool), ("agent", agent), ("outcome", outcome)];
                self.increment_counter(TOOL_CALLS, &labels);
                if event.event_type == TOOL_FAILED {
                    self.increment_counter(TOOL_ERRORS, &labels);
                }
                if let Some(ms) = duration {
                    self.record_duration(TOOL_DURATION_MS, ms, &[("tool", tool)]);
                }
            }
            other => {
                if let Some(operation) = other.strip_prefix("memory.") {
                    self.increment_counter(MEMORY_OPERATIONS, &[("operation", operation)]);
                }
            }
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::with_defaults(DEFAULT_MAX_SERIES_LEN)
    }
}
