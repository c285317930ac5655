//! 事件类型定义
//!
//! Event 一经发出即不可变；event_type 采用点分命名（如 `tool.completed`），监听时可用 `tool.*` 前缀匹配。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const BRAIN_THINKING_STARTED: &str = "brain.thinking.started";
pub const BRAIN_THINKING_COMPLETED: &str = "brain.thinking.completed";
pub const BRAIN_THINKING_FAILED: &str = "brain.thinking.failed";

pub const TOOL_COMPLETED: &str = "tool.completed";
pub const TOOL_FAILED: &str = "tool.failed";

pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_RESUMED: &str = "session.resumed";
pub const SESSION_TURN_RECORDED: &str = "session.turn_recorded";
pub const SESSION_HANDOFF: &str = "session.handoff";
pub const SESSION_PAUSED: &str = "session.paused";
pub const SESSION_COMPLETED: &str = "session.completed";
pub const SESSION_FAILED: &str = "session.failed";

pub const ORCHESTRATOR_DECISION: &str = "orchestrator.decision";
pub const ORCHESTRATOR_ROUTING_FALLBACK: &str = "orchestrator.routing_fallback";

/// 总线上流转的单条事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    pub data: Map<String, Value>,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// 构造事件；data 若不是 JSON 对象则包装为 `{"value": data}`
    pub fn new(event_type: impl Into<String>, data: Value, source: impl Into<String>) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            data,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(|v| v.as_f64())
    }
}

/// 监听模式匹配：`*` 匹配全部；`tool.*` 匹配 `tool` 及其子类型；其余按全名匹配
pub fn pattern_matches(pattern: &str, event_type: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return event_type == prefix
            || (event_type.starts_with(prefix)
                && event_type[prefix.len()..].starts_with('.'));
    }
    pattern == event_type
}
