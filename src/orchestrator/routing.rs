//! 路由决策
//!
//! 启发式：大小写不敏感的子串匹配，完成短语优先于交接短语；只有 Agent 名按单词边界匹配。
//! Brain 辅助：结构化 prompt，回复解析为 JSON `{action, next_agent?, reason}`；
//! 解析失败或点名未知 Agent 时由调用方回退到启发式。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::brain::extract_json;
use crate::team::TeamDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum RoutingAction {
    Continue,
    Handoff,
    Complete,
}

impl FromStr for RoutingAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONTINUE" => Ok(RoutingAction::Continue),
            "HANDOFF" | "HAND_OFF" => Ok(RoutingAction::Handoff),
            "COMPLETE" => Ok(RoutingAction::Complete),
            other => Err(format!("unknown routing action '{}'", other)),
        }
    }
}

impl TryFrom<String> for RoutingAction {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for RoutingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutingAction::Continue => "CONTINUE",
            RoutingAction::Handoff => "HANDOFF",
            RoutingAction::Complete => "COMPLETE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: RoutingAction,
    #[serde(default)]
    pub next_agent: Option<String>,
    #[serde(default)]
    pub reason: String,
}

impl Decision {
    pub fn complete(reason: impl Into<String>) -> Self {
        Self {
            action: RoutingAction::Complete,
            next_agent: None,
            reason: reason.into(),
        }
    }

    pub fn continue_with(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: RoutingAction::Continue,
            next_agent: Some(agent.into()),
            reason: reason.into(),
        }
    }

    pub fn handoff(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: RoutingAction::Handoff,
            next_agent: Some(agent.into()),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingContext {
    pub round_count: u32,
    pub max_rounds: u32,
    pub current_agent: String,
    pub available_agents: Vec<String>,
}

/// 单词边界内的子串匹配（两侧不能紧贴字母或数字），用于 Agent 名；haystack 与 phrase 均已小写
fn find_word(haystack: &str, phrase: &str) -> Option<usize> {
    if phrase.is_empty() {
        return None;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(phrase) {
        let start = from + pos;
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some(start);
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

/// 短语后紧跟的 Agent 名（允许 "the"、"agent" 等修饰词与引号），取最长匹配
fn agent_named_after<'a>(rest: &str, agents: &'a [String]) -> Option<&'a String> {
    let mut rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '`');
    for filler in ["the ", "agent "] {
        if let Some(stripped) = rest.strip_prefix(filler) {
            rest = stripped.trim_start();
        }
    }
    agents
        .iter()
        .filter(|name| find_word(rest, &name.to_lowercase()) == Some(0))
        .max_by_key(|name| name.len())
}

/// 启发式路由器
#[derive(Debug, Clone)]
pub struct HeuristicRouter {
    completion_phrases: Vec<String>,
    handoff_phrases: Vec<String>,
}

impl HeuristicRouter {
    pub fn new(completion_phrases: Vec<String>, handoff_phrases: Vec<String>) -> Self {
        let lower = |v: Vec<String>| -> Vec<String> {
            v.into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };
        Self {
            completion_phrases: lower(completion_phrases),
            handoff_phrases: lower(handoff_phrases),
        }
    }

    /// 完成短语 → 点名交接 → 交接边条件 → 未点名交接走默认边 → 继续
    pub fn decide(
        &self,
        context: &RoutingContext,
        last_response: &str,
        team: Option<&TeamDefinition>,
    ) -> Decision {
        let text = last_response.to_lowercase();

        if let Some(phrase) = self
            .completion_phrases
            .iter()
            .find(|p| text.contains(p.as_str()))
        {
            return Decision::complete(format!("completion phrase '{}' detected", phrase));
        }

        let candidates: Vec<String> = context
            .available_agents
            .iter()
            .filter(|a| **a != context.current_agent)
            .cloned()
            .collect();

        let mut generic_handoff: Option<&str> = None;
        for phrase in &self.handoff_phrases {
            let mut from = 0;
            while let Some(pos) = text[from..].find(phrase.as_str()) {
                let after = from + pos + phrase.len();
                if let Some(agent) = agent_named_after(&text[after..], &candidates) {
                    return Decision::handoff(
                        agent.clone(),
                        format!("handoff phrase '{}' names {}", phrase, agent),
                    );
                }
                generic_handoff.get_or_insert(phrase.as_str());
                from = after;
            }
        }

        if let Some(team) = team {
            for edge in team.edges_from(&context.current_agent) {
                let condition = edge.condition.trim().to_lowercase();
                if !condition.is_empty()
                    && text.contains(condition.as_str())
                    && candidates.contains(&edge.to)
                {
                    return Decision::handoff(
                        edge.to.clone(),
                        format!("handoff condition '{}' matched", edge.condition),
                    );
                }
            }
            if let Some(phrase) = generic_handoff {
                if let Some(edge) = team.default_edge(&context.current_agent) {
                    return Decision::handoff(
                        edge.to.clone(),
                        format!("handoff phrase '{}' without a named agent, using default edge", phrase),
                    );
                }
            }
        }

        Decision::continue_with(context.current_agent.clone(), "no routing signal")
    }
}

impl Default for HeuristicRouter {
    fn default() -> Self {
        Self::new(
            crate::config::default_completion_phrases(),
            crate::config::default_handoff_phrases(),
        )
    }
}

/// Brain 辅助路由的 prompt
pub fn build_routing_prompt(
    context: &RoutingContext,
    last_response: &str,
    team: Option<&TeamDefinition>,
) -> String {
    let mut conditions = String::new();
    if let Some(team) = team {
        for edge in team.edges_from(&context.current_agent) {
            conditions.push_str(&format!(
                "- to {}{}: {}\n",
                edge.to,
                if edge.default { " (default)" } else { "" },
                if edge.condition.is_empty() { "(no condition)" } else { edge.condition.as_str() }
            ));
        }
    }
    if conditions.is_empty() {
        conditions.push_str("- (none declared)\n");
    }
    format!(
        "You route work between agents of a team.\n\
         Round {round} of {max}. Current agent: {current}.\n\
         Available agents: {agents}\n\
         Handoff conditions for {current}:\n{conditions}\n\
         Last response from {current}:\n\"\"\"\n{last}\n\"\"\"\n\n\
         Reply with JSON only: {{\"action\": \"CONTINUE\" | \"HANDOFF\" | \"COMPLETE\", \
         \"next_agent\": \"<name, required for HANDOFF>\", \"reason\": \"<short reason>\"}}",
        round = context.round_count,
        max = context.max_rounds,
        current = context.current_agent,
        agents = context.available_agents.join(", "),
        conditions = conditions,
        last = last_response,
    )
}

/// 解析 Brain 的路由回复；非法时返回原因字符串
pub fn parse_routing_reply(reply: &str, context: &RoutingContext) -> Result<Decision, String> {
    let json = extract_json(reply).ok_or_else(|| "routing reply contains no JSON".to_string())?;
    let mut decision: Decision =
        serde_json::from_str(json).map_err(|e| format!("malformed routing reply: {e}"))?;
    match decision.action {
        RoutingAction::Handoff => {
            let next = decision
                .next_agent
                .as_deref()
                .ok_or_else(|| "HANDOFF without next_agent".to_string())?;
            if !context.available_agents.iter().any(|a| a == next) {
                return Err(format!("routing reply names unknown agent '{}'", next));
            }
        }
        RoutingAction::Continue => {
            decision.next_agent = Some(context.current_agent.clone());
        }
        RoutingAction::Complete => {
            decision.next_agent = None;
        }
    }
    if decision.reason.is_empty() {
        decision.reason = "routing brain decision".to_string();
    }
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::{AgentDefinition, HandoffEdge};

    fn ctx(current: &str) -> RoutingContext {
        RoutingContext {
            round_count: 1,
            max_rounds: 10,
            current_agent: current.into(),
            available_agents: vec!["agent1".into(), "agent2".into(), "reviewer".into()],
        }
    }

    fn team() -> TeamDefinition {
        TeamDefinition::new(
            "t",
            vec![
                AgentDefinition::new("agent1", ""),
                AgentDefinition::new("agent2", ""),
                AgentDefinition::new("reviewer", ""),
            ],
        )
        .with_handoff(HandoffEdge::new("agent1", "reviewer", "ready for review"))
        .with_handoff(HandoffEdge::new("agent1", "agent2", "").as_default())
    }

    #[test]
    fn test_completion_phrase() {
        let router = HeuristicRouter::default();
        let d = router.decide(&ctx("agent1"), "The task is now complete.", None);
        assert_eq!(d.action, RoutingAction::Complete);
    }

    #[test]
    fn test_completion_beats_handoff() {
        let router = HeuristicRouter::default();
        let d = router.decide(
            &ctx("agent1"),
            "Task complete. I could also hand this off to agent2.",
            None,
        );
        assert_eq!(d.action, RoutingAction::Complete);
    }

    #[test]
    fn test_named_handoff() {
        let router = HeuristicRouter::default();
        let d = router.decide(&ctx("agent1"), "I'll hand this off to agent2", None);
        assert_eq!(d.action, RoutingAction::Handoff);
        assert_eq!(d.next_agent.as_deref(), Some("agent2"));
    }

    #[test]
    fn test_handoff_to_unknown_agent_continues() {
        let router = HeuristicRouter::default();
        let d = router.decide(&ctx("agent1"), "Let me transfer to agent9 now", None);
        assert_eq!(d.action, RoutingAction::Continue);
        assert_eq!(d.next_agent.as_deref(), Some("agent1"));
    }

    #[test]
    fn test_neutral_text_continues() {
        let router = HeuristicRouter::default();
        let d = router.decide(&ctx("agent1"), "Here are my notes on the data so far.", None);
        assert_eq!(d.action, RoutingAction::Continue);
    }

    #[test]
    fn test_completion_is_plain_substring() {
        let router = HeuristicRouter::default();
        let d = router.decide(&ctx("agent1"), "The task is completed.", None);
        assert_eq!(d.action, RoutingAction::Complete);
        let d = router.decide(&ctx("agent1"), "EVERYTHING IS FINISHED", None);
        assert_eq!(d.action, RoutingAction::Complete);
    }

    #[test]
    fn test_agent_name_needs_word_boundary() {
        let router = HeuristicRouter::default();
        let mut c = ctx("agent1");
        c.available_agents.push("agent10".into());
        let d = router.decide(&c, "Please transfer to agent10.", None);
        assert_eq!(d.next_agent.as_deref(), Some("agent10"));
        let d = router.decide(&ctx("agent1"), "Please transfer to agent20.", None);
        assert_eq!(d.action, RoutingAction::Continue);
    }

    #[test]
    fn test_edge_condition_and_default_edge() {
        let router = HeuristicRouter::default();
        let team = team();
        let d = router.decide(&ctx("agent1"), "Draft is ready for review.", Some(&team));
        assert_eq!(d.next_agent.as_deref(), Some("reviewer"));

        let d = router.decide(&ctx("agent1"), "I will hand off to the next person.", Some(&team));
        assert_eq!(d.action, RoutingAction::Handoff);
        assert_eq!(d.next_agent.as_deref(), Some("agent2"));
    }

    #[test]
    fn test_parse_routing_reply() {
        let c = ctx("agent1");
        let d = parse_routing_reply(
            "```json\n{\"action\": \"HANDOFF\", \"next_agent\": \"reviewer\", \"reason\": \"ready\"}\n```",
            &c,
        )
        .unwrap();
        assert_eq!(d, Decision::handoff("reviewer", "ready"));

        assert!(parse_routing_reply("no idea", &c).is_err());
        assert!(parse_routing_reply("{\"action\": \"HANDOFF\", \"next_agent\": \"ghost\"}", &c).is_err());
        assert!(parse_routing_reply("{\"action\": \"JUMP\"}", &c).is_err());

        let d = parse_routing_reply("{\"action\": \"CONTINUE\"}", &c).unwrap();
        assert_eq!(d.next_agent.as_deref(), Some("agent1"));
    }

    #[test]
    fn test_routing_action_case_insensitive() {
        let c = ctx("agent1");
        let d = parse_routing_reply("{\"action\": \"handoff\", \"next_agent\": \"agent2\"}", &c)
            .unwrap();
        assert_eq!(d.action, RoutingAction::Handoff);
        let d = parse_routing_reply("{\"action\": \"Complete\", \"reason\": \"ok\"}", &c).unwrap();
        assert_eq!(d.action, RoutingAction::Complete);
        assert_eq!(
            serde_json::to_string(&RoutingAction::Handoff).unwrap(),
            "\"HANDOFF\""
        );
    }
}
