//! 会话数据模型
//!
//! TaskSession 是一次可持久化、可恢复的多 Agent 协作。状态只能单调前进
//! （Active ↔ Paused 除外），进入 Completed / Failed 后记录不再变化。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tools::ToolCallRecord;

/// 无团队配置时使用的 Agent 名
pub const DEFAULT_AGENT: &str = "assistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(SessionStatus::Active),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!(
                "unknown status '{}' (expected active, paused, completed or failed)",
                other
            )),
        }
    }
}

/// 一轮 Agent 发言
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub agent_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSession {
    pub id: String,
    pub description: String,
    pub status: SessionStatus,
    pub current_agent: String,
    pub round_count: u32,
    pub max_rounds: u32,
    #[serde(default)]
    pub history: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub config_path: Option<String>,
    /// 续跑来源（已结束的旧会话 id）
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_details: Option<String>,
    #[serde(default)]
    pub previous_summary: Option<String>,
}

/// 8 位十六进制短 id
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl TaskSession {
    pub fn new(
        description: impl Into<String>,
        current_agent: impl Into<String>,
        max_rounds: u32,
        config_path: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_session_id(),
            description: description.into(),
            status: SessionStatus::Active,
            current_agent: current_agent.into(),
            round_count: 0,
            max_rounds,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            config_path,
            parent_id: None,
            summary: None,
            error: None,
            error_details: None,
            previous_summary: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn budget_exhausted(&self) -> bool {
        self.round_count >= self.max_rounds
    }

    pub fn rounds_remaining(&self) -> u32 {
        self.max_rounds.saturating_sub(self.round_count)
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.history.last()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// list --compact 的一行
    pub fn compact_line(&self) -> String {
        let description: String = self.description.chars().take(60).collect();
        format!(
            "{}  {:<9}  {:>3}/{:<3}  {}  {}",
            self.id,
            self.status,
            self.round_count,
            self.max_rounds,
            self.updated_at.format("%Y-%m-%d %H:%M"),
            description
        )
    }
}
