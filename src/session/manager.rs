//! 任务管理器：会话的创建、加载、恢复、记录与检索
//!
//! 同一会话 id 的修改经由按 id 划分的异步互斥锁串行化：持锁后重新读取磁盘记录、修改、写回，
//! 再把结果同步给调用方持有的副本。不同 id 之间互不争用。
//! 锁一直持有到写入真正落盘；写入超时只让调用方提前返回，下一次修改仍排在它之后。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::core::AgentError;
use crate::events::types::{
    SESSION_COMPLETED, SESSION_CREATED, SESSION_FAILED, SESSION_HANDOFF, SESSION_PAUSED,
    SESSION_RESUMED, SESSION_TURN_RECORDED,
};
use crate::events::EventBus;
use crate::session::tokenizer::{overlap_score, tokenize_to_set};
use crate::session::{SessionStatus, SessionStore, TaskSession, Turn, DEFAULT_AGENT};
use crate::team::TeamRegistry;
use crate::tools::ToolCallRecord;

/// find_similar 的一条结果
#[derive(Debug, Clone)]
pub struct SimilarSession {
    pub session: TaskSession,
    pub score: usize,
}

pub struct TaskManager {
    store: SessionStore,
    teams: Arc<TeamRegistry>,
    bus: Option<EventBus>,
    write_timeout: Option<Duration>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TaskManager {
    pub fn new(store: SessionStore, teams: Arc<TeamRegistry>) -> Self {
        Self {
            store,
            teams,
            bus: None,
            write_timeout: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn teams(&self) -> &Arc<TeamRegistry> {
        &self.teams
    }

    /// 获取会话 id 的锁；顺带清理无人持有也无人等待的条目
    async fn lock_session(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|key, l| key == id || Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn emit(&self, event_type: &str, data: serde_json::Value) {
        if let Some(bus) = &self.bus {
            bus.emit(event_type, data, "task_manager");
        }
    }

    /// 写入在独立任务中完成并在结束后释放锁
    async fn persist(
        &self,
        session: &TaskSession,
        guard: OwnedMutexGuard<()>,
    ) -> Result<(), AgentError> {
        let store = self.store.clone();
        let snapshot = session.clone();
        let write = tokio::spawn(async move {
            let result = store.save(&snapshot).await;
            drop(guard);
            result
        });
        let joined = match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| AgentError::Timeout(format!("writing session {}", session.id)))?,
            None => write.await,
        };
        joined.map_err(|e| AgentError::Persistence(format!("write task failed: {e}")))?
    }

    /// 持锁状态下读取最新记录
    async fn fetch(&self, id: &str) -> Result<TaskSession, AgentError> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))
    }

    /// 入口 Agent：有团队配置时校验并取 entry_agent，否则为默认 Agent
    fn entry_agent_for(&self, config_path: Option<&str>) -> Result<String, AgentError> {
        match config_path {
            Some(path) => Ok(self.teams.load(path)?.entry_agent().to_string()),
            None => Ok(DEFAULT_AGENT.to_string()),
        }
    }

    /// 创建会话：团队配置错误立即失败；创建后立即落盘
    pub async fn create(
        &self,
        config_path: Option<&str>,
        description: &str,
        max_rounds: u32,
    ) -> Result<TaskSession, AgentError> {
        if description.trim().is_empty() {
            return Err(AgentError::ConfigError("task description is empty".into()));
        }
        if max_rounds == 0 {
            return Err(AgentError::ConfigError("max_rounds must be at least 1".into()));
        }
        let entry = self.entry_agent_for(config_path)?;
        let session = TaskSession::new(
            description.trim(),
            entry,
            max_rounds,
            config_path.map(str::to_string),
        );
        let guard = self.lock_session(&session.id).await;
        self.persist(&session, guard).await?;
        tracing::info!(session = %session.id, agent = %session.current_agent, max_rounds, "Session created");
        self.emit(
            SESSION_CREATED,
            json!({
                "session_id": session.id,
                "agent": session.current_agent,
                "max_rounds": max_rounds,
            }),
        );
        Ok(session)
    }

    pub async fn load(&self, id: &str) -> Result<TaskSession, AgentError> {
        self.fetch(id).await
    }

    /// 恢复会话
    ///
    /// - Active / Paused：追加轮数预算并置为 Active
    /// - Completed / Failed：旧记录保持不变，新建一个引用它的续跑会话，预算为 additional_rounds
    pub async fn resume(&self, id: &str, additional_rounds: u32) -> Result<TaskSession, AgentError> {
        if additional_rounds == 0 {
            return Err(AgentError::ConfigError(
                "additional rounds must be at least 1".into(),
            ));
        }
        let guard = self.lock_session(id).await;
        let mut session = self.fetch(id).await?;

        if session.is_terminal() {
            let entry = self.entry_agent_for(session.config_path.as_deref())?;
            let mut continuation = TaskSession::new(
                session.description.clone(),
                entry,
                additional_rounds,
                session.config_path.clone(),
            );
            continuation.parent_id = Some(session.id.clone());
            continuation.previous_summary = session
                .summary
                .clone()
                .or_else(|| session.error.as_ref().map(|e| format!("Previous attempt failed: {e}")));
            let continuation_guard = self.lock_session(&continuation.id).await;
            self.persist(&continuation, continuation_guard).await?;
            tracing::info!(
                parent = %session.id,
                session = %continuation.id,
                "Terminal session continued in a new session"
            );
            self.emit(
                SESSION_CREATED,
                json!({
                    "session_id": continuation.id,
                    "parent_id": session.id,
                    "agent": continuation.current_agent,
                    "max_rounds": additional_rounds,
                }),
            );
            return Ok(continuation);
        }

        session.max_rounds = session.max_rounds.saturating_add(additional_rounds);
        session.status = SessionStatus::Active;
        session.touch();
        self.persist(&session, guard).await?;
        tracing::info!(session = %session.id, max_rounds = session.max_rounds, "Session resumed");
        self.emit(
            SESSION_RESUMED,
            json!({ "session_id": session.id, "max_rounds": session.max_rounds }),
        );
        Ok(session)
    }

    /// 原子地追加一轮并递增轮数，然后落盘；预算耗尽或会话不可写时拒绝
    pub async fn record_turn(
        &self,
        session: &mut TaskSession,
        agent: &str,
        content: &str,
        tool_calls: Vec<ToolCallRecord>,
    ) -> Result<(), AgentError> {
        self.record_turn_with_handoff(session, agent, content, tool_calls, None)
            .await
    }

    /// 同 record_turn，并把下一位 Agent 写进同一个快照：崩溃后不会丢失交接
    pub async fn record_turn_with_handoff(
        &self,
        session: &mut TaskSession,
        agent: &str,
        content: &str,
        tool_calls: Vec<ToolCallRecord>,
        next_agent: Option<&str>,
    ) -> Result<(), AgentError> {
        let guard = self.lock_session(&session.id).await;
        let mut current = self.fetch(&session.id).await?;

        if current.status != SessionStatus::Active {
            return Err(AgentError::InvalidTransition {
                id: current.id,
                status: current.status,
                action: "record a turn",
            });
        }
        if current.budget_exhausted() {
            return Err(AgentError::RoundBudgetExhausted {
                id: current.id,
                max_rounds: current.max_rounds,
            });
        }

        let tool_count = tool_calls.len();
        current.history.push(Turn {
            agent_name: agent.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            tool_calls,
        });
        current.round_count += 1;
        let handoff = next_agent
            .filter(|next| *next != current.current_agent)
            .map(|next| std::mem::replace(&mut current.current_agent, next.to_string()));
        current.touch();
        self.persist(&current, guard).await?;

        tracing::debug!(session = %current.id, agent, round = current.round_count, "Turn recorded");
        self.emit(
            SESSION_TURN_RECORDED,
            json!({
                "session_id": current.id,
                "agent": agent,
                "round": current.round_count,
                "tool_calls": tool_count,
            }),
        );
        if let Some(from) = handoff {
            tracing::info!(session = %current.id, from = %from, to = %current.current_agent, "Handoff");
            self.emit(
                SESSION_HANDOFF,
                json!({ "session_id": current.id, "from": from, "to": current.current_agent }),
            );
        }
        *session = current;
        Ok(())
    }

    /// 切换当前 Agent（交接）
    pub async fn set_current_agent(
        &self,
        session: &mut TaskSession,
        agent: &str,
    ) -> Result<(), AgentError> {
        let guard = self.lock_session(&session.id).await;
        let mut current = self.fetch(&session.id).await?;
        if current.is_terminal() {
            return Err(AgentError::InvalidTransition {
                id: current.id,
                status: current.status,
                action: "change agent",
            });
        }
        if current.current_agent == agent {
            *session = current;
            return Ok(());
        }
        let from = std::mem::replace(&mut current.current_agent, agent.to_string());
        current.touch();
        self.persist(&current, guard).await?;
        tracing::info!(session = %current.id, from = %from, to = %agent, "Handoff");
        self.emit(
            SESSION_HANDOFF,
            json!({ "session_id": current.id, "from": from, "to": agent }),
        );
        *session = current;
        Ok(())
    }

    /// Active -> Paused；已暂停时不变
    pub async fn pause(&self, session: &mut TaskSession, reason: &str) -> Result<(), AgentError> {
        let guard = self.lock_session(&session.id).await;
        let mut current = self.fetch(&session.id).await?;
        match current.status {
            SessionStatus::Paused => {}
            SessionStatus::Active => {
                current.status = SessionStatus::Paused;
                current.touch();
                self.persist(&current, guard).await?;
                tracing::warn!(session = %current.id, reason, "Session paused");
                self.emit(
                    SESSION_PAUSED,
                    json!({ "session_id": current.id, "reason": reason }),
                );
            }
            status => {
                return Err(AgentError::InvalidTransition {
                    id: current.id,
                    status,
                    action: "pause",
                })
            }
        }
        *session = current;
        Ok(())
    }

    /// 标记完成；已处于终态时不做任何修改
    pub async fn mark_completed(
        &self,
        session: &mut TaskSession,
        summary: &str,
    ) -> Result<(), AgentError> {
        let guard = self.lock_session(&session.id).await;
        let mut current = self.fetch(&session.id).await?;
        if !current.is_terminal() {
            current.status = SessionStatus::Completed;
            current.summary = Some(summary.to_string());
            current.touch();
            self.persist(&current, guard).await?;
            tracing::info!(session = %current.id, rounds = current.round_count, "Session completed");
            self.emit(
                SESSION_COMPLETED,
                json!({
                    "session_id": current.id,
                    "rounds": current.round_count,
                    "summary": summary,
                }),
            );
        }
        *session = current;
        Ok(())
    }

    /// 标记失败；已处于终态时不做任何修改
    pub async fn mark_failed(
        &self,
        session: &mut TaskSession,
        error: &str,
        details: Option<&str>,
    ) -> Result<(), AgentError> {
        let guard = self.lock_session(&session.id).await;
        let mut current = self.fetch(&session.id).await?;
        if !current.is_terminal() {
            current.status = SessionStatus::Failed;
            current.error = Some(error.to_string());
            current.error_details = details.map(str::to_string);
            current.touch();
            self.persist(&current, guard).await?;
            tracing::error!(session = %current.id, error, "Session failed");
            self.emit(
                SESSION_FAILED,
                json!({ "session_id": current.id, "error": error }),
            );
        }
        *session = current;
        Ok(())
    }

    /// 按状态过滤，最新创建的在前
    pub async fn list_by_status(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<TaskSession>, AgentError> {
        let mut sessions: Vec<TaskSession> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(sessions)
    }

    /// 关键词重叠排序；同分按 updated_at 新者在前；无重叠的会话不返回
    pub async fn find_similar(&self, description: &str) -> Result<Vec<SimilarSession>, AgentError> {
        let wanted = tokenize_to_set(description);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let mut matches: Vec<SimilarSession> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter_map(|session| {
                let score = overlap_score(&wanted, &tokenize_to_set(&session.description));
                (score > 0).then_some(SimilarSession { session, score })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.session.updated_at.cmp(&a.session.updated_at))
        });
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::{AgentDefinition, TeamDefinition};

    fn manager(dir: &std::path::Path) -> TaskManager {
        TaskManager::new(SessionStore::new(dir), Arc::new(TeamRegistry::new()))
    }

    #[tokio::test]
    async fn test_create_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        let session = tm.create(None, "draft release notes", 3).await.unwrap();
        assert_eq!(session.current_agent, DEFAULT_AGENT);
        let loaded = tm.load(&session.id).await.unwrap();
        assert_eq!(loaded.max_rounds, 3);
        assert!(matches!(
            tm.load("00000000").await,
            Err(AgentError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_with_bad_team_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        let bad = dir.path().join("team.toml");
        std::fs::write(&bad, "name = \"empty\"\nagents = []\n").unwrap();
        let result = tm.create(bad.to_str(), "anything", 3).await;
        assert!(matches!(result, Err(AgentError::ConfigError(_))));
        assert!(tm.list_by_status(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_uses_team_entry_agent() {
        let dir = tempfile::tempdir().unwrap();
        let teams = Arc::new(TeamRegistry::new());
        let mut team = TeamDefinition::new(
            "pair",
            vec![AgentDefinition::new("a", ""), AgentDefinition::new("b", "")],
        );
        team.entry_agent = Some("b".into());
        teams.register("pair", team).unwrap();
        let tm = TaskManager::new(SessionStore::new(dir.path()), teams);
        let session = tm.create(Some("pair"), "task", 2).await.unwrap();
        assert_eq!(session.current_agent, "b");
    }

    #[tokio::test]
    async fn test_record_turn_respects_budget() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        let mut session = tm.create(None, "one shot", 1).await.unwrap();

        tm.record_turn(&mut session, "assistant", "hello", Vec::new())
            .await
            .unwrap();
        assert_eq!(session.round_count, 1);
        assert_eq!(session.history.len(), 1);

        let err = tm
            .record_turn(&mut session, "assistant", "again", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RoundBudgetExhausted { .. }));
        let stored = tm.load(&session.id).await.unwrap();
        assert_eq!(stored.round_count, 1);
        assert!(stored.round_count <= stored.max_rounds);
    }

    #[tokio::test]
    async fn test_concurrent_record_turns_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let tm = Arc::new(manager(dir.path()));
        let session = tm.create(None, "parallel", 10).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..5 {
            let tm = Arc::clone(&tm);
            let mut copy = session.clone();
            handles.push(tokio::spawn(async move {
                tm.record_turn(&mut copy, "assistant", &format!("turn {i}"), Vec::new())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let stored = tm.load(&session.id).await.unwrap();
        assert_eq!(stored.round_count, 5);
        assert_eq!(stored.history.len(), 5);
    }

    #[tokio::test]
    async fn test_mark_completed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        let mut session = tm.create(None, "finish me", 2).await.unwrap();

        tm.mark_completed(&mut session, "all done").await.unwrap();
        let first_update = session.updated_at;
        tm.mark_completed(&mut session, "again").await.unwrap();
        tm.mark_failed(&mut session, "late failure", None).await.unwrap();

        let stored = tm.load(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.updated_at, first_update);
        assert_eq!(stored.summary.as_deref(), Some("all done"));
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn test_mark_failed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        let mut session = tm.create(None, "break me", 2).await.unwrap();

        tm.mark_failed(&mut session, "boom", Some("stack")).await.unwrap();
        let first_update = session.updated_at;
        tm.mark_failed(&mut session, "boom again", None).await.unwrap();

        let stored = tm.load(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert_eq!(stored.updated_at, first_update);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert_eq!(stored.error_details.as_deref(), Some("stack"));
    }

    #[tokio::test]
    async fn test_resume_terminal_creates_continuation() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        let mut session = tm.create(None, "long task", 1).await.unwrap();
        tm.record_turn(&mut session, "assistant", "partial", Vec::new())
            .await
            .unwrap();
        tm.mark_completed(&mut session, "partial result").await.unwrap();
        let before = std::fs::read(tm.store().path_for(&session.id)).unwrap();

        let continuation = tm.resume(&session.id, 4).await.unwrap();
        assert_ne!(continuation.id, session.id);
        assert_eq!(continuation.parent_id.as_deref(), Some(session.id.as_str()));
        assert_eq!(continuation.max_rounds, 4);
        assert_eq!(continuation.round_count, 0);
        assert_eq!(continuation.previous_summary.as_deref(), Some("partial result"));

        let after = std::fs::read(tm.store().path_for(&session.id)).unwrap();
        assert_eq!(before, after);
        assert_eq!(tm.list_by_status(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_resume_failed_keeps_record_and_carries_error() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        let mut session = tm.create(None, "fragile task", 3).await.unwrap();
        tm.mark_failed(&mut session, "provider outage", Some("503 from upstream"))
            .await
            .unwrap();
        let before = std::fs::read(tm.store().path_for(&session.id)).unwrap();

        let continuation = tm.resume(&session.id, 2).await.unwrap();
        assert_ne!(continuation.id, session.id);
        assert_eq!(continuation.parent_id.as_deref(), Some(session.id.as_str()));
        assert_eq!(continuation.status, SessionStatus::Active);
        assert_eq!(continuation.max_rounds, 2);
        let previous = continuation.previous_summary.as_deref().unwrap();
        assert!(previous.starts_with("Previous attempt failed:"));
        assert!(previous.contains("provider outage"));

        let after = std::fs::read(tm.store().path_for(&session.id)).unwrap();
        assert_eq!(before, after);
        let stored = tm.load(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn test_turn_and_handoff_share_one_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let tm = manager(dir.path()).with_event_bus(bus.clone());
        let mut session = tm.create(None, "relay", 3).await.unwrap();

        tm.record_turn_with_handoff(&mut session, "assistant", "notes", Vec::new(), Some("writer"))
            .await
            .unwrap();
        assert_eq!(session.current_agent, "writer");

        let stored = tm.load(&session.id).await.unwrap();
        assert_eq!(stored.round_count, 1);
        assert_eq!(stored.current_agent, "writer");
        assert_eq!(stored.history[0].agent_name, "assistant");
        assert_eq!(bus.get_events(Some("session.handoff"), None).len(), 1);

        // 同一 Agent 继续时不产生交接
        tm.record_turn_with_handoff(&mut session, "writer", "draft", Vec::new(), Some("writer"))
            .await
            .unwrap();
        assert_eq!(bus.get_events(Some("session.handoff"), None).len(), 1);
    }

    #[tokio::test]
    async fn test_timed_out_write_still_lands_before_next_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path()).with_write_timeout(Duration::from_nanos(1));
        let session = TaskSession::new("slow disk", DEFAULT_AGENT, 3, None);
        tm.store().save(&session).await.unwrap();

        let mut copy = session.clone();
        let recorded = tm.record_turn(&mut copy, DEFAULT_AGENT, "turn one", Vec::new()).await;
        assert!(matches!(recorded, Ok(()) | Err(AgentError::Timeout(_))));
        let _ = tm.pause(&mut copy, "storage timeout").await;
        // 取锁即等待所有在途写入结束
        tm.set_current_agent(&mut copy, DEFAULT_AGENT).await.unwrap();

        let stored = tm.load(&session.id).await.unwrap();
        assert_eq!(stored.round_count, 1);
        assert_eq!(stored.history.len(), 1);
        assert_eq!(stored.status, SessionStatus::Paused);
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        for i in 0..5 {
            let mut session = tm.create(None, &format!("task {i}"), 2).await.unwrap();
            tm.record_turn(&mut session, DEFAULT_AGENT, "hi", Vec::new())
                .await
                .unwrap();
        }
        assert!(tm.tracked_locks() <= 1);
    }

    #[tokio::test]
    async fn test_pause_and_resume_extends_budget() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        let mut session = tm.create(None, "pausable", 2).await.unwrap();
        tm.pause(&mut session, "brain unavailable").await.unwrap();
        assert_eq!(session.status, SessionStatus::Paused);
        assert!(tm
            .record_turn(&mut session, "assistant", "nope", Vec::new())
            .await
            .is_err());

        let resumed = tm.resume(&session.id, 3).await.unwrap();
        assert_eq!(resumed.id, session.id);
        assert_eq!(resumed.status, SessionStatus::Active);
        assert_eq!(resumed.max_rounds, 5);
    }

    #[tokio::test]
    async fn test_list_by_status_and_find_similar() {
        let dir = tempfile::tempdir().unwrap();
        let tm = manager(dir.path());
        let mut done = tm.create(None, "benchmark rust http servers", 2).await.unwrap();
        tm.mark_completed(&mut done, "ok").await.unwrap();
        let _active = tm.create(None, "compare rust web frameworks", 2).await.unwrap();
        let _other = tm.create(None, "bake sourdough bread", 2).await.unwrap();

        let completed = tm
            .list_by_status(Some(SessionStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done.id);

        let found = tm.find_similar("rust http benchmark").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].session.id, done.id);
        assert_eq!(found[0].score, 3);
        assert!(found.iter().all(|m| !m.session.description.contains("bread")));
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let tm = manager(dir.path()).with_event_bus(bus.clone());
        let mut session = tm.create(None, "observe me", 2).await.unwrap();
        tm.record_turn(&mut session, "assistant", "hi", Vec::new())
            .await
            .unwrap();
        assert_eq!(bus.get_events(Some("session.*"), None).len(), 2);
    }
}
