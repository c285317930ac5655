//! 编排器
//!
//! step：为当前 Agent 组装消息（system prompt + 团队说明 + 任务 + 历史），在超时与取消下调用 Brain，
//! 按权限执行工具调用，最后给出路由决策。step 不落盘，持久化由 TaskManager 在本轮结束后完成。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::brain::{Brain, Message, TokenUsage, ToolCall};
use crate::config::{AppConfig, RoutingMode};
use crate::core::AgentError;
use crate::events::types::{
    BRAIN_THINKING_COMPLETED, BRAIN_THINKING_FAILED, BRAIN_THINKING_STARTED,
    ORCHESTRATOR_DECISION, ORCHESTRATOR_ROUTING_FALLBACK,
};
use crate::events::EventBus;
use crate::orchestrator::events::{send_update, OrchestratorUpdate, UpdateSender};
use crate::orchestrator::routing::{
    build_routing_prompt, parse_routing_reply, Decision, HeuristicRouter, RoutingAction,
    RoutingContext,
};
use crate::session::TaskSession;
use crate::team::{AgentDefinition, TeamDefinition};
use crate::tools::{ToolCallRecord, ToolExecutor, ToolPermissions, ToolRegistry};

/// 流式回复时每段字符数
const CHUNK_CHARS: usize = 48;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a capable assistant working through a task step by step. \
     Say \"The task is complete.\" once nothing is left to do.";

/// 一轮的结果
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub agent: String,
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub usage: TokenUsage,
    pub decision: Decision,
}

pub struct Orchestrator {
    brain: Arc<dyn Brain>,
    routing_brain: Option<Arc<dyn Brain>>,
    executor: ToolExecutor,
    team: Option<Arc<TeamDefinition>>,
    router: HeuristicRouter,
    bus: Option<EventBus>,
    updates: Option<UpdateSender>,
    brain_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        brain: Arc<dyn Brain>,
        executor: ToolExecutor,
        team: Option<Arc<TeamDefinition>>,
    ) -> Self {
        Self {
            brain,
            routing_brain: None,
            executor,
            team,
            router: HeuristicRouter::default(),
            bus: None,
            updates: None,
            brain_timeout: Duration::from_secs(60),
        }
    }

    /// 按配置组装：权限来自团队定义与 [tools].default_permissions，路由模式来自 [orchestrator]
    pub fn from_config(
        cfg: &AppConfig,
        brain: Arc<dyn Brain>,
        tools: Arc<ToolRegistry>,
        team: Option<Arc<TeamDefinition>>,
    ) -> Self {
        let default_set = cfg.tools.default_permissions.clone();
        let permissions = match &team {
            Some(team) => ToolPermissions::for_team(team, default_set),
            None => ToolPermissions::new(default_set),
        };
        let executor = ToolExecutor::new(tools, permissions, cfg.tools.tool_timeout_secs);
        let mut orchestrator = Self::new(Arc::clone(&brain), executor, team)
            .with_router(HeuristicRouter::new(
                cfg.orchestrator.completion_phrases.clone(),
                cfg.orchestrator.handoff_phrases.clone(),
            ))
            .with_brain_timeout(Duration::from_secs(cfg.llm.timeouts.request));
        if cfg.orchestrator.routing == RoutingMode::Brain {
            orchestrator = orchestrator.with_routing_brain(brain);
        }
        orchestrator
    }

    pub fn with_router(mut self, router: HeuristicRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_routing_brain(mut self, brain: Arc<dyn Brain>) -> Self {
        self.routing_brain = Some(brain);
        self
    }

    /// 同时接到工具执行器上
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.executor = self.executor.with_event_bus(bus.clone());
        self.bus = Some(bus);
        self
    }

    pub fn with_updates(mut self, tx: UpdateSender) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn with_brain_timeout(mut self, timeout: Duration) -> Self {
        self.brain_timeout = timeout;
        self
    }

    pub fn team(&self) -> Option<&Arc<TeamDefinition>> {
        self.team.as_ref()
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    fn emit(&self, event_type: &str, data: Value) {
        if let Some(bus) = &self.bus {
            bus.emit(event_type, data, "orchestrator");
        }
    }

    pub fn available_agents(&self) -> Vec<String> {
        self.team
            .as_ref()
            .map(|t| t.agent_names())
            .unwrap_or_default()
    }

    pub fn context_for(&self, session: &TaskSession) -> RoutingContext {
        RoutingContext {
            round_count: session.round_count,
            max_rounds: session.max_rounds,
            current_agent: session.current_agent.clone(),
            available_agents: self.available_agents(),
        }
    }

    /// 下一步：轮数上限最先检查，其次无团队、单 Agent，最后按路由策略
    pub async fn decide_next_step(&self, context: &RoutingContext, last_response: &str) -> Decision {
        let decision = self.route(context, last_response).await;
        tracing::debug!(
            action = %decision.action,
            next = ?decision.next_agent,
            reason = %decision.reason,
            "Routing decision"
        );
        self.emit(
            ORCHESTRATOR_DECISION,
            json!({
                "action": decision.action,
                "next_agent": decision.next_agent,
                "reason": decision.reason,
                "round": context.round_count,
                "agent": context.current_agent,
            }),
        );
        decision
    }

    async fn route(&self, context: &RoutingContext, last_response: &str) -> Decision {
        if context.round_count >= context.max_rounds {
            return Decision::complete("maximum rounds reached");
        }
        let team = match &self.team {
            Some(team) if !context.available_agents.is_empty() => team,
            _ => return Decision::complete("no team configured"),
        };
        if team.is_single_agent() {
            return if context.round_count >= 1 {
                Decision::complete("single agent task completed")
            } else {
                Decision::continue_with(self.get_next_agent(context), "single agent team")
            };
        }

        match &self.routing_brain {
            Some(brain) => {
                match self.route_with_brain(brain.as_ref(), context, last_response, team).await {
                    Ok(decision) => decision,
                    Err(reason) => {
                        tracing::warn!(reason = %reason, "Routing brain unusable, falling back to heuristic");
                        self.emit(
                            ORCHESTRATOR_ROUTING_FALLBACK,
                            json!({ "reason": reason, "agent": context.current_agent }),
                        );
                        self.router.decide(context, last_response, Some(team))
                    }
                }
            }
            None => self.router.decide(context, last_response, Some(team)),
        }
    }

    async fn route_with_brain(
        &self,
        brain: &dyn Brain,
        context: &RoutingContext,
        last_response: &str,
        team: &TeamDefinition,
    ) -> Result<Decision, String> {
        let messages = vec![
            Message::system("You are a routing controller. Reply with JSON only."),
            Message::user(build_routing_prompt(context, last_response, Some(team))),
        ];
        let reply = match tokio::time::timeout(self.brain_timeout, brain.think(&messages, None)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => return Err("routing brain timed out".to_string()),
        };
        parse_routing_reply(&reply.content, context)
    }

    /// 单 Agent 团队返回该 Agent，否则（包括无团队）返回当前 Agent
    pub fn get_next_agent(&self, context: &RoutingContext) -> String {
        match &self.team {
            Some(team) if team.is_single_agent() => team.entry_agent().to_string(),
            _ => context.current_agent.clone(),
        }
    }

    /// 依次执行工具调用；单个失败不影响其余调用
    pub async fn execute_tool_calls(&self, calls: &[ToolCall], agent: &str) -> Vec<ToolCallRecord> {
        let mut records = Vec::with_capacity(calls.len());
        for call in calls {
            let record = self.executor.dispatch(call, agent).await;
            send_update(
                &self.updates,
                OrchestratorUpdate::ToolResult {
                    agent: agent.to_string(),
                    tool: record.tool_name.clone(),
                    outcome: record.outcome.clone(),
                },
            );
            records.push(record);
        }
        records
    }

    pub async fn execute_single_tool(
        &self,
        name: &str,
        agent: &str,
        args: Value,
    ) -> Result<String, AgentError> {
        self.executor
            .dispatch(&ToolCall::new(name, args), agent)
            .await
            .into_result()
    }

    fn agent_definition(&self, name: &str) -> Result<Option<&AgentDefinition>, AgentError> {
        match &self.team {
            None => Ok(None),
            Some(team) => team.agent(name).map(Some).ok_or_else(|| {
                AgentError::ConfigError(format!(
                    "agent '{}' is not part of team '{}'",
                    name, team.name
                ))
            }),
        }
    }

    fn team_briefing(&self, agent: &str) -> Option<String> {
        let team = self.team.as_ref()?;
        if team.is_single_agent() {
            return None;
        }
        let teammates: Vec<&str> = team
            .agents
            .iter()
            .map(|a| a.name.as_str())
            .filter(|n| *n != agent)
            .collect();
        let mut briefing = format!(
            "You are {agent}, a member of team '{}'. Teammates: {}.\n\
             To pass the work on, say \"hand off to <agent name>\". \
             When the whole task is finished, say \"The task is complete.\"",
            team.name,
            teammates.join(", ")
        );
        for edge in team.edges_from(agent) {
            if !edge.condition.is_empty() {
                briefing.push_str(&format!("\nHand off to {} when: {}", edge.to, edge.condition));
            }
        }
        Some(briefing)
    }

    /// 组装当前 Agent 的消息列表
    pub fn build_messages(&self, session: &TaskSession) -> Result<Vec<Message>, AgentError> {
        let agent = session.current_agent.as_str();
        let definition = self.agent_definition(agent)?;

        let mut system = definition
            .map(|d| d.system_prompt.trim())
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .to_string();
        if let Some(briefing) = self.team_briefing(agent) {
            system.push_str("\n\n");
            system.push_str(&briefing);
        }

        let mut task = format!("Task: {}", session.description);
        if let Some(previous) = &session.previous_summary {
            task.push_str(&format!("\n\nSummary of the previous attempt:\n{}", previous));
        }

        let mut messages = vec![Message::system(system), Message::user(task)];
        for turn in &session.history {
            if turn.agent_name == agent {
                messages.push(Message::assistant(turn.content.clone()));
            } else {
                messages.push(Message::user(format!("[{}] {}", turn.agent_name, turn.content)));
            }
            if !turn.tool_calls.is_empty() {
                let observations: Vec<String> =
                    turn.tool_calls.iter().map(|r| r.observation()).collect();
                messages.push(Message::user(format!(
                    "Tool results:\n{}",
                    observations.join("\n")
                )));
            }
        }
        Ok(messages)
    }

    /// 执行当前 Agent 的一轮；决策基于本轮记录之后的轮数
    pub async fn step(
        &self,
        session: &TaskSession,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AgentError> {
        let agent = session.current_agent.clone();
        let round = session.round_count + 1;
        let messages = self.build_messages(session)?;
        let specs = self.executor.tool_specs(&agent);
        let tools = (!specs.is_empty()).then_some(specs.as_slice());

        send_update(
            &self.updates,
            OrchestratorUpdate::AgentStart {
                agent: agent.clone(),
                round,
            },
        );
        self.emit(
            BRAIN_THINKING_STARTED,
            json!({ "agent": agent, "session_id": session.id, "round": round }),
        );

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            r = tokio::time::timeout(self.brain_timeout, self.brain.think(&messages, tools)) => match r {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(AgentError::Brain(e)),
                Err(_) => Err(AgentError::Timeout(format!("brain call for {}", agent))),
            },
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.emit(
                    BRAIN_THINKING_FAILED,
                    json!({
                        "agent": agent,
                        "session_id": session.id,
                        "duration_ms": duration_ms,
                        "error": e.to_string(),
                    }),
                );
                send_update(
                    &self.updates,
                    OrchestratorUpdate::Error {
                        agent: agent.clone(),
                        text: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        self.emit(
            BRAIN_THINKING_COMPLETED,
            json!({
                "agent": agent,
                "session_id": session.id,
                "duration_ms": duration_ms,
                "prompt_tokens": response.usage.prompt_tokens,
                "completion_tokens": response.usage.completion_tokens,
                "total_tokens": response.usage.total_tokens,
            }),
        );

        let chars: Vec<char> = response.content.chars().collect();
        for chunk in chars.chunks(CHUNK_CHARS) {
            send_update(
                &self.updates,
                OrchestratorUpdate::ContentChunk {
                    agent: agent.clone(),
                    text: chunk.iter().collect(),
                },
            );
        }

        let tool_calls = if response.tool_calls.is_empty() {
            Vec::new()
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                records = self.execute_tool_calls(&response.tool_calls, &agent) => records,
            }
        };

        let context = RoutingContext {
            round_count: round,
            max_rounds: session.max_rounds,
            current_agent: agent.clone(),
            available_agents: self.available_agents(),
        };
        let decision = self.decide_next_step(&context, &response.content).await;

        send_update(
            &self.updates,
            OrchestratorUpdate::AgentComplete {
                agent: agent.clone(),
                content: response.content.clone(),
            },
        );
        if let (RoutingAction::Handoff, Some(next)) =
            (decision.action, decision.next_agent.as_ref())
        {
            send_update(
                &self.updates,
                OrchestratorUpdate::Handoff {
                    from: agent.clone(),
                    to: next.clone(),
                    reason: decision.reason.clone(),
                },
            );
        }

        Ok(TurnOutcome {
            agent,
            content: response.content,
            tool_calls,
            usage: response.usage,
            decision,
        })
    }
}
