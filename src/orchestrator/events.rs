//! 编排过程更新：供任意展示层（CLI、前端）消费的类型化流，核心不阻塞在控制台上

use serde::Serialize;

use crate::tools::ToolOutcome;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorUpdate {
    /// Agent 开始本轮
    AgentStart { agent: String, round: u32 },
    /// 回复的一小段
    ContentChunk { agent: String, text: String },
    /// 工具调用完成
    ToolResult {
        agent: String,
        tool: String,
        outcome: ToolOutcome,
    },
    /// 本轮结束
    AgentComplete { agent: String, content: String },
    /// 交接
    Handoff {
        from: String,
        to: String,
        reason: String,
    },
    Error { agent: String, text: String },
}

pub type UpdateSender = tokio::sync::mpsc::UnboundedSender<OrchestratorUpdate>;

pub(crate) fn send_update(tx: &Option<UpdateSender>, update: OrchestratorUpdate) {
    if let Some(t) = tx {
        let _ = t.send(update);
    }
}
