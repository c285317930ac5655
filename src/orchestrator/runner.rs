//! 会话驱动循环
//!
//! step → 记录本轮（交接目标写入同一快照）→ 按决策继续或完成。每轮登记到 SessionSupervisor（同一会话不可重入），
//! 失败交给 RecoveryEngine：重试本轮、暂停、标记失败或在取消时直接返回（保留最后一次落盘的状态）。

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine, SessionSupervisor};
use crate::orchestrator::{Orchestrator, RoutingAction, TurnOutcome};
use crate::session::{SessionStatus, TaskManager, TaskSession};

/// 完成摘要最大字符数
const SUMMARY_CHARS: usize = 500;

pub struct SessionRunner<'a> {
    orchestrator: &'a Orchestrator,
    manager: &'a TaskManager,
    supervisor: &'a SessionSupervisor,
    recovery: RecoveryEngine,
    turn_timeout: Option<Duration>,
}

impl<'a> SessionRunner<'a> {
    pub fn new(
        orchestrator: &'a Orchestrator,
        manager: &'a TaskManager,
        supervisor: &'a SessionSupervisor,
    ) -> Self {
        Self {
            orchestrator,
            manager,
            supervisor,
            recovery: RecoveryEngine::default(),
            turn_timeout: None,
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryEngine) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    /// 运行到会话离开 Active 状态；取消时返回 Err(Cancelled)
    pub async fn run(&self, mut session: TaskSession) -> Result<TaskSession, AgentError> {
        let cancel = self.supervisor.child_token();
        tracing::info!(
            session = %session.id,
            agent = %session.current_agent,
            rounds_left = session.rounds_remaining(),
            "Running session"
        );

        while session.status == SessionStatus::Active {
            if session.budget_exhausted() {
                let last = session
                    .last_turn()
                    .map(|t| t.content.clone())
                    .unwrap_or_default();
                let decision = self
                    .orchestrator
                    .decide_next_step(&self.orchestrator.context_for(&session), &last)
                    .await;
                self.manager
                    .mark_completed(&mut session, &summarize(&last, &decision.reason))
                    .await?;
                break;
            }

            let outcome = {
                let _turn = self.supervisor.begin_turn(&session.id)?;
                match self.attempt_turn(&session, &cancel).await {
                    Ok(outcome) => outcome,
                    Err(action) => {
                        self.apply_recovery(&mut session, action).await?;
                        continue;
                    }
                }
            };

            let TurnOutcome {
                agent,
                content,
                tool_calls,
                decision,
                ..
            } = outcome;
            let next = match decision.action {
                RoutingAction::Complete => None,
                RoutingAction::Handoff | RoutingAction::Continue => Some(
                    decision.next_agent.clone().unwrap_or_else(|| {
                        self.orchestrator
                            .get_next_agent(&self.orchestrator.context_for(&session))
                    }),
                ),
            };
            if let Err(e) = self
                .manager
                .record_turn_with_handoff(&mut session, &agent, &content, tool_calls, next.as_deref())
                .await
            {
                let action = self.recovery.handle(&e, u32::MAX);
                self.apply_recovery(&mut session, (action, e)).await?;
                continue;
            }

            if decision.action == RoutingAction::Complete {
                tracing::info!(session = %session.id, reason = %decision.reason, "Routing completed the session");
                self.manager
                    .mark_completed(&mut session, &summarize(&content, &decision.reason))
                    .await?;
            }
        }

        tracing::info!(
            session = %session.id,
            status = %session.status,
            rounds = session.round_count,
            "Session run finished"
        );
        Ok(session)
    }

    /// 执行一轮，按恢复策略重试；无法继续时返回恢复动作与最后的错误
    async fn attempt_turn(
        &self,
        session: &TaskSession,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, (RecoveryAction, AgentError)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.turn_timeout {
                Some(limit) => tokio::time::timeout(limit, self.orchestrator.step(session, cancel))
                    .await
                    .unwrap_or_else(|_| {
                        Err(AgentError::Timeout(format!("turn of {}", session.current_agent)))
                    }),
                None => self.orchestrator.step(session, cancel).await,
            };
            let err = match result {
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };
            match self.recovery.handle(&err, attempt) {
                RecoveryAction::RetryTurn => {
                    tracing::warn!(
                        session = %session.id,
                        attempt,
                        max_retries = self.recovery.max_turn_retries(),
                        error = %err,
                        "Turn failed, retrying"
                    );
                }
                action => return Err((action, err)),
            }
        }
    }

    async fn apply_recovery(
        &self,
        session: &mut TaskSession,
        (action, err): (RecoveryAction, AgentError),
    ) -> Result<(), AgentError> {
        match action {
            RecoveryAction::RetryTurn => Ok(()),
            RecoveryAction::PauseSession(reason) => self.manager.pause(session, &reason).await,
            RecoveryAction::FailSession(reason) => {
                let details = format!("{:?}", err);
                self.manager
                    .mark_failed(session, &reason, Some(&details))
                    .await
            }
            RecoveryAction::Abort => {
                tracing::warn!(session = %session.id, "Run cancelled, keeping last persisted state");
                Err(err)
            }
        }
    }
}

fn summarize(content: &str, reason: &str) -> String {
    let mut summary: String = content.trim().chars().take(SUMMARY_CHARS).collect();
    if content.trim().chars().count() > SUMMARY_CHARS {
        summary.push_str("...");
    }
    if summary.is_empty() {
        reason.to_string()
    } else {
        format!("{} ({})", summary, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::brain::{Brain, BrainError, BrainResponse, ScriptedBrain};
    use crate::config::AppConfig;
    use crate::session::SessionStore;
    use crate::team::{AgentDefinition, TeamDefinition, TeamRegistry};
    use crate::tools::builtin_registry;

    struct Fixture {
        _dir: tempfile::TempDir,
        manager: TaskManager,
        supervisor: SessionSupervisor,
        team: Arc<TeamDefinition>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let teams = Arc::new(TeamRegistry::new());
        let team = teams
            .register(
                "duo",
                TeamDefinition::new(
                    "duo",
                    vec![
                        AgentDefinition::new("agent1", "You research."),
                        AgentDefinition::new("agent2", "You write."),
                    ],
                ),
            )
            .unwrap();
        Fixture {
            manager: TaskManager::new(SessionStore::new(dir.path()), teams),
            supervisor: SessionSupervisor::new(),
            team,
            _dir: dir,
        }
    }

    fn orchestrator(f: &Fixture, brain: Arc<dyn Brain>) -> Orchestrator {
        Orchestrator::from_config(
            &AppConfig::default(),
            brain,
            builtin_registry(),
            Some(Arc::clone(&f.team)),
        )
    }

    #[tokio::test]
    async fn test_handoff_then_complete() {
        let f = fixture();
        let brain = Arc::new(ScriptedBrain::replies([
            "Research notes attached, hand this off to agent2",
            "Report written. The task is now complete.",
        ]));
        let orch = orchestrator(&f, brain.clone());
        let session = f.manager.create(Some("duo"), "write a report", 5).await.unwrap();

        let done = SessionRunner::new(&orch, &f.manager, &f.supervisor)
            .run(session)
            .await
            .unwrap();

        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.round_count, 2);
        assert_eq!(done.history[0].agent_name, "agent1");
        assert_eq!(done.history[1].agent_name, "agent2");
        assert!(done.summary.unwrap().contains("complete"));
        assert!(!f.supervisor.is_in_flight(&done.id));
    }

    #[tokio::test]
    async fn test_handoff_is_persisted_with_the_turn() {
        let f = fixture();
        let brain = Arc::new(ScriptedBrain::new(vec![
            Ok(BrainResponse::text("Notes ready, hand off to agent2")),
            Err(BrainError::Transport("down".into())),
            Err(BrainError::Transport("down".into())),
            Err(BrainError::Transport("down".into())),
        ]));
        let orch = orchestrator(&f, brain);
        let session = f.manager.create(Some("duo"), "relay", 5).await.unwrap();

        let paused = SessionRunner::new(&orch, &f.manager, &f.supervisor)
            .with_recovery(RecoveryEngine::new(2))
            .run(session)
            .await
            .unwrap();
        assert_eq!(paused.status, SessionStatus::Paused);

        let stored = f.manager.load(&paused.id).await.unwrap();
        assert_eq!(stored.round_count, 1);
        assert_eq!(stored.current_agent, "agent2");
    }

    #[tokio::test]
    async fn test_budget_exhaustion_completes() {
        let f = fixture();
        let brain = Arc::new(ScriptedBrain::replies(Vec::<String>::new()));
        let orch = orchestrator(&f, brain.clone());
        let session = f.manager.create(Some("duo"), "never ends", 2).await.unwrap();

        let done = SessionRunner::new(&orch, &f.manager, &f.supervisor)
            .run(session)
            .await
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.round_count, 2);
        assert_eq!(brain.call_count(), 2);
        assert!(done.summary.unwrap().contains("maximum rounds reached"));
    }

    #[tokio::test]
    async fn test_brain_errors_retry_then_pause() {
        let f = fixture();
        let brain = Arc::new(ScriptedBrain::new(vec![
            Err(BrainError::Transport("reset".into())),
            Err(BrainError::Transport("reset".into())),
            Err(BrainError::Transport("reset".into())),
        ]));
        let orch = orchestrator(&f, brain.clone());
        let session = f.manager.create(Some("duo"), "flaky", 5).await.unwrap();

        let paused = SessionRunner::new(&orch, &f.manager, &f.supervisor)
            .with_recovery(RecoveryEngine::new(2))
            .run(session)
            .await
            .unwrap();
        assert_eq!(paused.status, SessionStatus::Paused);
        assert_eq!(paused.round_count, 0);
        assert_eq!(brain.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let f = fixture();
        let brain = Arc::new(ScriptedBrain::new(vec![
            Err(BrainError::EmptyResponse),
            Ok(BrainResponse::text("Task complete.")),
        ]));
        let orch = orchestrator(&f, brain);
        let session = f.manager.create(Some("duo"), "retry once", 5).await.unwrap();
        let done = SessionRunner::new(&orch, &f.manager, &f.supervisor)
            .run(session)
            .await
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.round_count, 1);
    }

    #[tokio::test]
    async fn test_cancel_keeps_persisted_state() {
        let f = fixture();
        let brain = Arc::new(ScriptedBrain::replies(Vec::<String>::new()));
        let orch = orchestrator(&f, brain);
        let session = f.manager.create(Some("duo"), "interrupt me", 5).await.unwrap();
        let id = session.id.clone();

        f.supervisor.cancel();
        let result = SessionRunner::new(&orch, &f.manager, &f.supervisor)
            .run(session)
            .await;
        assert!(matches!(result, Err(AgentError::Cancelled)));

        let stored = f.manager.load(&id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert_eq!(stored.round_count, 0);
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize("", "maximum rounds reached"), "maximum rounds reached");
        assert_eq!(summarize("done", "why"), "done (why)");
        assert!(summarize(&"x".repeat(600), "r").contains("..."));
    }
}
