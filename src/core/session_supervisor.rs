//! 会话监管：在途轮次登记与中断管理
//!
//! 同一会话任意时刻最多一个在途 turn（编排步骤不可重入）；不同会话互不影响。
//! 持有根 CancellationToken，Ctrl+C 时取消所有运行；每次运行使用子 token。

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

#[derive(Debug)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// 在途登记凭证，Drop 时自动注销
#[derive(Debug)]
pub struct TurnGuard {
    session_id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session_id);
    }
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消（用户 Ctrl+C）
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// 创建子 token（用于单次运行）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// 登记一个在途 turn；该会话已有在途 turn 时返回 TurnInFlight
    pub fn begin_turn(&self, session_id: &str) -> Result<TurnGuard, AgentError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !set.insert(session_id.to_string()) {
            return Err(AgentError::TurnInFlight(session_id.to_string()));
        }
        Ok(TurnGuard {
            session_id: session_id.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_in_flight(&self, session_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(session_id)
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
