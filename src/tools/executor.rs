//! 工具执行器
//!
//! 持有 ToolRegistry、权限策略与全局超时。dispatch 先做权限检查（拒绝时不调用处理函数），
//! 再在超时内执行并计时，结果统一落成 ToolCallRecord；每次调用输出结构化审计日志（JSON），
//! 并在事件总线上发出 `tool.completed` / `tool.failed`。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::brain::{ToolCall, ToolSpec};
use crate::core::AgentError;
use crate::events::types::{TOOL_COMPLETED, TOOL_FAILED};
use crate::events::EventBus;
use crate::tools::{ToolPermissions, ToolRegistry};

/// 单次工具调用的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { result: String },
    Error { message: String },
    PermissionDenied,
    Timeout,
    UnknownTool,
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ToolOutcome::Success { .. } => "success",
            ToolOutcome::Error { .. } => "error",
            ToolOutcome::PermissionDenied => "permission_denied",
            ToolOutcome::Timeout => "timeout",
            ToolOutcome::UnknownTool => "unknown_tool",
        }
    }
}

/// 工具调用记录（写入会话历史）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub agent_name: String,
    pub args: Value,
    pub outcome: ToolOutcome,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallRecord {
    /// 回灌给 Brain 的观察文本
    pub fn observation(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { result } => format!("[{}] {}", self.tool_name, result),
            ToolOutcome::Error { message } => format!("[{}] error: {}", self.tool_name, message),
            ToolOutcome::PermissionDenied => {
                format!("[{}] permission denied for {}", self.tool_name, self.agent_name)
            }
            ToolOutcome::Timeout => format!("[{}] timed out", self.tool_name),
            ToolOutcome::UnknownTool => format!("[{}] unknown tool", self.tool_name),
        }
    }

    /// 记录 -> AgentError（execute_single_tool 使用）
    pub fn into_result(self) -> Result<String, AgentError> {
        match self.outcome {
            ToolOutcome::Success { result } => Ok(result),
            ToolOutcome::Error { message } => Err(AgentError::ToolExecutionFailed(message)),
            ToolOutcome::PermissionDenied => Err(AgentError::PermissionDenied {
                tool: self.tool_name,
                agent: self.agent_name,
            }),
            ToolOutcome::Timeout => Err(AgentError::ToolTimeout(self.tool_name)),
            ToolOutcome::UnknownTool => Err(AgentError::UnknownTool(self.tool_name)),
        }
    }
}

/// 工具执行器：权限检查 + 超时 + 审计
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    permissions: ToolPermissions,
    timeout: Duration,
    bus: Option<EventBus>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, permissions: ToolPermissions, timeout_secs: u64) -> Self {
        Self {
            registry,
            permissions,
            timeout: Duration::from_secs(timeout_secs),
            bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn permissions(&self) -> &ToolPermissions {
        &self.permissions
    }

    /// 该 Agent 可用的工具名（已注册 ∩ 已授权，按名称排序）
    pub fn get_available_tools(&self, agent: &str) -> Vec<String> {
        self.registry
            .iter()
            .filter(|tool| self.permissions.is_permitted(agent, tool.as_ref()))
            .map(|tool| tool.name().to_string())
            .collect()
    }

    /// 注入 prompt 的工具说明
    pub fn tool_specs(&self, agent: &str) -> Vec<ToolSpec> {
        self.registry.specs_for(&self.get_available_tools(agent))
    }

    /// 执行一次工具调用，任何结果都落成记录，不返回错误
    pub async fn dispatch(&self, call: &ToolCall, agent: &str) -> ToolCallRecord {
        let start = Instant::now();
        let timestamp = Utc::now();

        let outcome = match self.registry.get(&call.tool) {
            None => ToolOutcome::UnknownTool,
            Some(tool) if !self.permissions.is_permitted(agent, tool.as_ref()) => {
                ToolOutcome::PermissionDenied
            }
            Some(tool) => match timeout(self.timeout, tool.execute(call.args.clone())).await {
                Ok(Ok(result)) => ToolOutcome::Success { result },
                Ok(Err(message)) => ToolOutcome::Error { message },
                Err(_) => ToolOutcome::Timeout,
            },
        };

        let record = ToolCallRecord {
            tool_name: call.tool.clone(),
            agent_name: agent.to_string(),
            args: call.args.clone(),
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp,
        };
        self.audit(&record);
        record
    }

    fn audit(&self, record: &ToolCallRecord) {
        let ok = record.outcome.is_success();
        let audit = json!({
            "event": "tool_audit",
            "tool": record.tool_name,
            "agent": record.agent_name,
            "ok": ok,
            "outcome": record.outcome.label(),
            "duration_ms": record.duration_ms,
            "args_preview": args_preview(&record.args),
        });
        if ok {
            tracing::info!(audit = %audit, "tool");
        } else {
            tracing::warn!(audit = %audit, "tool");
        }

        if let Some(bus) = &self.bus {
            let event_type = if ok { TOOL_COMPLETED } else { TOOL_FAILED };
            bus.emit(
                event_type,
                json!({
                    "tool": record.tool_name,
                    "agent": record.agent_name,
                    "outcome": record.outcome.label(),
                    "duration_ms": record.duration_ms,
                }),
                "tool_executor",
            );
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, Tool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "counter"
        }

        fn description(&self) -> &str {
            "counts invocations"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("counted".into())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    fn executor_with(calls: Arc<AtomicUsize>, permissions: ToolPermissions) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(CountingTool { calls });
        registry.register(SlowTool);
        ToolExecutor::new(Arc::new(registry), permissions, 30)
    }

    #[tokio::test]
    async fn test_denied_call_never_invokes_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut permissions = ToolPermissions::new(vec!["*".into()]);
        permissions.set_agent("restricted", Vec::new());
        let bus = EventBus::new();
        let executor = executor_with(calls.clone(), permissions).with_event_bus(bus.clone());

        let record = executor
            .dispatch(&ToolCall::new("counter", json!({})), "restricted")
            .await;
        assert_eq!(record.outcome, ToolOutcome::PermissionDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.get_events(Some(TOOL_FAILED), None).len(), 1);
        assert!(executor.get_available_tools("restricted").is_empty());
    }

    #[tokio::test]
    async fn test_permitted_call_runs_and_emits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bus = EventBus::new();
        let executor = executor_with(calls.clone(), ToolPermissions::new(vec!["*".into()]))
            .with_event_bus(bus.clone());

        let record = executor
            .dispatch(&ToolCall::new("counter", json!({})), "worker")
            .await;
        assert!(record.outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let events = bus.get_events(Some(TOOL_COMPLETED), None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].str_field("tool"), Some("counter"));
        assert_eq!(events[0].str_field("outcome"), Some("success"));
    }

    #[tokio::test]
    async fn test_unknown_and_error_outcomes() {
        let executor = executor_with(
            Arc::new(AtomicUsize::new(0)),
            ToolPermissions::new(vec!["*".into()]),
        );
        let unknown = executor
            .dispatch(&ToolCall::new("nope", json!({})), "a")
            .await;
        assert_eq!(unknown.outcome, ToolOutcome::UnknownTool);

        let failed = executor.dispatch(&ToolCall::new("echo", json!({})), "a").await;
        assert!(matches!(failed.outcome, ToolOutcome::Error { .. }));
        assert!(matches!(
            failed.into_result(),
            Err(AgentError::ToolExecutionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_outcome() {
        let executor = executor_with(
            Arc::new(AtomicUsize::new(0)),
            ToolPermissions::new(vec!["*".into()]),
        )
        .with_timeout(Duration::from_millis(20));
        let record = executor.dispatch(&ToolCall::new("slow", json!({})), "a").await;
        assert_eq!(record.outcome, ToolOutcome::Timeout);
    }

    #[test]
    fn test_available_tools_sorted_and_filtered() {
        let mut permissions = ToolPermissions::new(vec!["echo".into()]);
        permissions.set_agent("reader", vec!["read_only".into(), "slow".into()]);
        let executor = executor_with(Arc::new(AtomicUsize::new(0)), permissions);
        assert_eq!(executor.get_available_tools("someone"), vec!["echo"]);
        assert_eq!(executor.get_available_tools("reader"), vec!["echo", "slow"]);
    }
}
