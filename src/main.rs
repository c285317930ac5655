//! Hive CLI
//!
//! 入口：解析命令行、初始化日志、加载配置；run / resume 在创建或改动任何会话前构造 Brain（含 API Key 检查）。
//! 任何顶层失败（缺少 Key、错误、Ctrl+C）以退出码 1 结束。

mod cli;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use cli::{Cli, Commands};
use hive::brain::{create_brain_from_config, Brain};
use hive::config::{load_config, AppConfig};
use hive::core::{AgentError, RecoveryEngine, SessionSupervisor};
use hive::events::EventBus;
use hive::metrics::MetricsCollector;
use hive::observability;
use hive::orchestrator::{Orchestrator, OrchestratorUpdate, SessionRunner};
use hive::session::{SessionStatus, SessionStore, TaskManager, TaskSession};
use hive::team::TeamRegistry;
use hive::tools::{builtin_registry, ToolOutcome};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    observability::init(cli.verbose);
    let code = match run_cli(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            tracing::error!(error = %err, "command failed");
            1
        }
    };
    std::process::exit(code);
}

/// 进程级组件：显式构造一次，按引用传递
struct Runtime {
    cfg: AppConfig,
    teams: Arc<TeamRegistry>,
    bus: EventBus,
    metrics: Arc<MetricsCollector>,
    manager: TaskManager,
}

impl Runtime {
    fn new(cfg: AppConfig) -> Self {
        let teams = Arc::new(TeamRegistry::new());
        let bus = EventBus::with_max_history(cfg.events.max_history);
        let metrics = Arc::new(MetricsCollector::with_defaults(cfg.metrics.max_series_len));
        metrics.attach(&bus);
        let manager = TaskManager::new(
            SessionStore::new(cfg.app.sessions_dir()),
            Arc::clone(&teams),
        )
        .with_event_bus(bus.clone())
        .with_write_timeout(Duration::from_secs(cfg.storage.write_timeout_secs));
        Self {
            cfg,
            teams,
            bus,
            metrics,
            manager,
        }
    }
}

async fn run_cli(cli: Cli) -> Result<i32> {
    let cfg = load_config(cli.config.clone()).context("Failed to load configuration")?;
    let rt = Runtime::new(cfg);

    match cli.command {
        Commands::Run {
            description,
            team,
            max_rounds,
        } => {
            let (brain, session) = prepare_run(&rt, team, &description, max_rounds).await?;
            println!("Session {} created ({} rounds)", session.id, session.max_rounds);
            drive(&rt, brain, session).await
        }
        Commands::Resume { id, max_rounds } => {
            let (brain, session) = prepare_resume(&rt, &id, max_rounds).await?;
            if session.id != id {
                println!("Session {} is finished; continuing as {}", id, session.id);
            } else {
                println!("Session {} resumed ({} rounds left)", id, session.rounds_remaining());
            }
            drive(&rt, brain, session).await
        }
        Commands::List { compact, status } => {
            let sessions = rt.manager.list_by_status(status).await?;
            if sessions.is_empty() {
                println!("No sessions.");
            }
            for session in &sessions {
                if compact {
                    println!("{}", session.compact_line());
                } else {
                    print_summary(session);
                }
            }
            Ok(0)
        }
        Commands::Details { id } => {
            let session = rt.manager.load(&id).await?;
            print_details(&session);
            Ok(0)
        }
        Commands::Find { description } => {
            let found = rt.manager.find_similar(&description).await?;
            if found.is_empty() {
                println!("No similar sessions.");
            }
            for m in found {
                println!(
                    "{:>3}  {}  {:<9}  {}",
                    m.score, m.session.id, m.session.status, m.session.description
                );
            }
            Ok(0)
        }
    }
}

/// Brain 先于会话落盘构造：provider 或 Key 有误时不留下孤儿会话
async fn prepare_run(
    rt: &Runtime,
    team: Option<PathBuf>,
    description: &str,
    max_rounds: Option<u32>,
) -> Result<(Arc<dyn Brain>, TaskSession)> {
    let brain = create_brain_from_config(&rt.cfg)?;
    let team = team
        .or_else(|| rt.cfg.app.default_team.clone())
        .map(|p| p.to_string_lossy().to_string());
    let max_rounds = max_rounds.unwrap_or(rt.cfg.app.default_max_rounds);
    let session = rt
        .manager
        .create(team.as_deref(), description, max_rounds)
        .await?;
    Ok((brain, session))
}

async fn prepare_resume(
    rt: &Runtime,
    id: &str,
    max_rounds: Option<u32>,
) -> Result<(Arc<dyn Brain>, TaskSession)> {
    let brain = create_brain_from_config(&rt.cfg)?;
    let extra = max_rounds.unwrap_or(rt.cfg.app.default_max_rounds);
    let session = rt.manager.resume(id, extra).await?;
    Ok((brain, session))
}

/// 驱动会话直到离开 Active；Ctrl+C 取消根 token
async fn drive(rt: &Runtime, brain: Arc<dyn Brain>, session: TaskSession) -> Result<i32> {
    let team = session
        .config_path
        .as_deref()
        .map(|p| rt.teams.load(p))
        .transpose()
        .map_err(AgentError::from)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_updates(rx));
    let orchestrator = Orchestrator::from_config(&rt.cfg, brain, builtin_registry(), team)
        .with_event_bus(rt.bus.clone())
        .with_updates(tx);

    let supervisor = SessionSupervisor::new();
    let token = supervisor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received, cancelling");
            token.cancel();
        }
    });

    let id = session.id.clone();
    let result = SessionRunner::new(&orchestrator, &rt.manager, &supervisor)
        .with_recovery(RecoveryEngine::new(rt.cfg.orchestrator.max_turn_retries))
        .with_turn_timeout(Duration::from_secs(rt.cfg.orchestrator.turn_timeout_secs))
        .run(session)
        .await;
    drop(orchestrator);
    let _ = printer.await;

    let stats = rt.bus.get_stats();
    tracing::debug!(events = stats.total_events, metrics = ?rt.metrics.get_summary(), "Run statistics");

    match result {
        Ok(session) => {
            println!("Session {}: {}", session.id, session.status);
            match session.status {
                SessionStatus::Completed => {
                    if let Some(summary) = &session.summary {
                        println!("Summary: {}", summary);
                    }
                    Ok(0)
                }
                SessionStatus::Paused => {
                    println!("Resume with: hive resume {}", session.id);
                    Ok(0)
                }
                SessionStatus::Failed => {
                    if let Some(error) = &session.error {
                        println!("Error: {}", error);
                    }
                    Ok(1)
                }
                SessionStatus::Active => Ok(0),
            }
        }
        Err(AgentError::Cancelled) => {
            println!("Session {}: interrupted (last saved state kept)", id);
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}

async fn print_updates(mut rx: mpsc::UnboundedReceiver<OrchestratorUpdate>) {
    let mut out = std::io::stdout();
    while let Some(update) = rx.recv().await {
        match update {
            OrchestratorUpdate::AgentStart { agent, round } => {
                println!("\n--- [{}] round {} ---", agent, round);
            }
            OrchestratorUpdate::ContentChunk { text, .. } => {
                print!("{}", text);
                let _ = out.flush();
            }
            OrchestratorUpdate::ToolResult { tool, outcome, .. } => {
                let detail: String = match &outcome {
                    ToolOutcome::Success { result } => result.chars().take(120).collect(),
                    ToolOutcome::Error { message } => message.clone(),
                    other => other.label().to_string(),
                };
                println!("\n  > {} [{}] {}", tool, outcome.label(), detail);
            }
            OrchestratorUpdate::AgentComplete { .. } => println!(),
            OrchestratorUpdate::Handoff { from, to, reason } => {
                println!("  handoff {} -> {} ({})", from, to, reason);
            }
            OrchestratorUpdate::Error { agent, text } => {
                eprintln!("  [{}] error: {}", agent, text);
            }
        }
    }
}

fn print_summary(session: &TaskSession) {
    println!("{}  [{}]", session.id, session.status);
    println!("  task:    {}", session.description);
    println!(
        "  agent:   {}  rounds {}/{}",
        session.current_agent, session.round_count, session.max_rounds
    );
    println!(
        "  created: {}  updated: {}",
        session.created_at.format("%Y-%m-%d %H:%M:%S"),
        session.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_details(session: &TaskSession) {
    print_summary(session);
    if let Some(path) = &session.config_path {
        println!("  team:    {}", path);
    }
    if let Some(parent) = &session.parent_id {
        println!("  continues: {}", parent);
    }
    if let Some(previous) = &session.previous_summary {
        println!("  previous summary: {}", previous);
    }
    if let Some(summary) = &session.summary {
        println!("  summary: {}", summary);
    }
    if let Some(error) = &session.error {
        println!("  error:   {}", error);
    }
    if let Some(details) = &session.error_details {
        println!("  details: {}", details);
    }
    if session.history.is_empty() {
        return;
    }
    println!("  history:");
    for (i, turn) in session.history.iter().enumerate() {
        println!(
            "   {:>2}. [{}] {}  {}",
            i + 1,
            turn.agent_name,
            turn.timestamp.format("%H:%M:%S"),
            turn.content.replace('\n', " ")
        );
        for call in &turn.tool_calls {
            println!(
                "       tool {} -> {} ({} ms)",
                call.tool_name,
                call.outcome.label(),
                call.duration_ms
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(provider: &str, dir: &tempfile::TempDir) -> Runtime {
        let mut cfg = AppConfig::default();
        cfg.app.data_dir = dir.path().to_path_buf();
        cfg.llm.provider = provider.to_string();
        Runtime::new(cfg)
    }

    #[tokio::test]
    async fn test_bad_provider_creates_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime("carrier-pigeon", &dir);
        assert!(prepare_run(&rt, None, "write docs", Some(3)).await.is_err());
        assert!(rt.manager.list_by_status(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_provider_leaves_resumed_session_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (_, session) = prepare_run(&runtime("mock", &dir), None, "write docs", Some(3))
            .await
            .unwrap();

        let rt = runtime("carrier-pigeon", &dir);
        assert!(prepare_resume(&rt, &session.id, Some(5)).await.is_err());
        let stored = rt.manager.load(&session.id).await.unwrap();
        assert_eq!(stored.max_rounds, 3);
        assert_eq!(rt.manager.list_by_status(None).await.unwrap().len(), 1);
    }
}
