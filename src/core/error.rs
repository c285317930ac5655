//! 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryTurn / PauseSession / FailSession / Abort。

use thiserror::Error;

use crate::brain::BrainError;
use crate::session::SessionStatus;

/// 编排、会话、工具各层共用的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Missing API key: set {0}")]
    MissingApiKey(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {id} is {status:?}, cannot {action}")]
    InvalidTransition {
        id: String,
        status: SessionStatus,
        action: &'static str,
    },

    #[error("Session {id} has used all {max_rounds} rounds")]
    RoundBudgetExhausted { id: String, max_rounds: u32 },

    #[error("Session {0} already has a turn in flight")]
    TurnInFlight(String),

    #[error(transparent)]
    Brain(#[from] BrainError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Permission denied: agent '{agent}' may not use tool '{tool}'")]
    PermissionDenied { tool: String, agent: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Persistence(format!("serialization: {e}"))
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 重新执行当前轮（会话状态未变）
    RetryTurn,
    /// 暂停会话，等待人工 resume
    PauseSession(String),
    /// 标记会话失败（终态）
    FailSession(String),
    /// 立即停止（用户取消），保持最后一次持久化的状态
    Abort,
}
