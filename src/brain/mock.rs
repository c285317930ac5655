//! Mock Brain（用于本地试跑与测试，无需 API）
//!
//! MockBrain：首轮若可用 echo 工具则请求一次 echo，之后宣布任务完成。
//! ScriptedBrain：按脚本依次返回预设回复或错误，并记录收到的消息，便于断言。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::brain::{Brain, BrainError, BrainResponse, Message, Role, TokenUsage, ToolCall, ToolSpec};

#[derive(Debug, Default)]
pub struct MockBrain;

#[async_trait]
impl Brain for MockBrain {
    async fn think(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
    ) -> Result<BrainResponse, BrainError> {
        let task = messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no task)");
        let has_echo = tools.is_some_and(|t| t.iter().any(|s| s.name == "echo"));
        let already_acted = messages.iter().any(|m| m.role == Role::Assistant);

        let mut response = if has_echo && !already_acted {
            BrainResponse::text("Echoing the task before finishing.").with_tool_call(ToolCall::new(
                "echo",
                json!({ "text": format!("Echo from Mock: {}", task) }),
            ))
        } else {
            BrainResponse::text("The task is complete.")
        };
        response.usage = TokenUsage::new(task.len() as u64 / 4, 8);
        Ok(response)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 按脚本回复的 Brain；脚本耗尽后返回 fallback 文本
pub struct ScriptedBrain {
    script: Mutex<VecDeque<Result<BrainResponse, BrainError>>>,
    fallback: String,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBrain {
    pub fn new(script: Vec<Result<BrainResponse, BrainError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: "Still working on it.".to_string(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 只回复文本的脚本
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            replies
                .into_iter()
                .map(|r| Ok(BrainResponse::text(r)))
                .collect(),
        )
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次 think 收到的消息列表
    pub fn seen_messages(&self) -> Vec<Vec<Message>> {
        self.seen
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Brain for ScriptedBrain {
    async fn think(
        &self,
        messages: &[Message],
        _tools: Option<&[ToolSpec]>,
    ) -> Result<BrainResponse, BrainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(BrainResponse::text(self.fallback.clone())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
