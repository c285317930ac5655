//! Brain 抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 Brain：把消息列表（及可选的工具清单）变成一次回复，
//! 回复中可能附带工具调用请求。传输或 API 失败返回 BrainError，由编排层视为可恢复错误。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Brain 请求的工具调用（简化 JSON：{"tool": "echo", "args": {"text": "..."}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// 提供给 Brain 的单个工具说明
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 单次调用的 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }
}

/// think 的返回：文本内容、工具调用请求与用量
#[derive(Debug, Clone, Default)]
pub struct BrainResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

impl BrainResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrainError {
    #[error("Brain transport error: {0}")]
    Transport(String),

    #[error("Brain API error: {0}")]
    Api(String),

    #[error("Brain returned an empty response")]
    EmptyResponse,
}

#[async_trait]
pub trait Brain: Send + Sync {
    /// 单轮思考：messages 已包含 system prompt；tools 为本轮该 agent 可用的工具
    async fn think(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
    ) -> Result<BrainResponse, BrainError>;

    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "brain"
    }
}
