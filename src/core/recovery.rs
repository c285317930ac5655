//! 错误恢复引擎
//!
//! 根据 AgentError 与已重试次数返回 RecoveryAction，供 SessionRunner 决定重试、暂停、失败还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：Brain/超时类错误先重试，重试耗尽后暂停；配置/持久化错误直接失败
#[derive(Debug)]
pub struct RecoveryEngine {
    max_turn_retries: u32,
}

impl RecoveryEngine {
    pub fn new(max_turn_retries: u32) -> Self {
        Self { max_turn_retries }
    }

    pub fn max_turn_retries(&self) -> u32 {
        self.max_turn_retries
    }

    /// attempt 为该轮已经失败的次数（从 1 开始）
    pub fn handle(&self, err: &AgentError, attempt: u32) -> RecoveryAction {
        match err {
            AgentError::Cancelled => RecoveryAction::Abort,
            AgentError::Brain(_)
            | AgentError::Timeout(_)
            | AgentError::ToolTimeout(_)
            | AgentError::JsonParseError(_) => {
                if attempt <= self.max_turn_retries {
                    RecoveryAction::RetryTurn
                } else {
                    RecoveryAction::PauseSession(format!(
                        "turn failed {} times, last error: {}",
                        attempt, err
                    ))
                }
            }
            AgentError::TurnInFlight(_) => {
                RecoveryAction::PauseSession(format!("concurrent turn rejected: {err}"))
            }
            AgentError::ConfigError(_)
            | AgentError::MissingApiKey(_)
            | AgentError::Persistence(_)
            | AgentError::SessionNotFound(_) => RecoveryAction::FailSession(err.to_string()),
            _ => RecoveryAction::FailSession(err.to_string()),
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::BrainError;

    #[test]
    fn test_recovery_brain_error_retries_then_pauses() {
        let engine = RecoveryEngine::new(2);
        let err = AgentError::Brain(BrainError::Transport("reset".into()));
        assert_eq!(engine.handle(&err, 1), RecoveryAction::RetryTurn);
        assert_eq!(engine.handle(&err, 2), RecoveryAction::RetryTurn);
        match engine.handle(&err, 3) {
            RecoveryAction::PauseSession(msg) => assert!(msg.contains("reset")),
            other => panic!("Expected PauseSession, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_timeout_is_retryable() {
        let engine = RecoveryEngine::default();
        let err = AgentError::Timeout("brain call".into());
        assert_eq!(engine.handle(&err, 1), RecoveryAction::RetryTurn);
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::default();
        assert_eq!(engine.handle(&AgentError::Cancelled, 1), RecoveryAction::Abort);
    }

    #[test]
    fn test_recovery_persistence_fails_session() {
        let engine = RecoveryEngine::default();
        let err = AgentError::Persistence("disk full".into());
        assert!(matches!(engine.handle(&err, 1), RecoveryAction::FailSession(_)));
    }
}
