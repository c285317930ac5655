//! 团队定义：Agent 列表 + 显式交接边
//!
//! 交接按名称查找 HandoffEdge，不依赖 system prompt 中的字符串。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::AgentError;

#[derive(Error, Debug)]
pub enum TeamError {
    #[error("cannot read team file {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid team file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid team '{team}': {message}")]
    Invalid { team: String, message: String },
}

impl From<TeamError> for AgentError {
    fn from(e: TeamError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}

/// 单个 Agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    /// None：使用 "default" 权限集；Some(空)：不允许任何工具
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            allowed_tools: None,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }
}

/// 交接边：from 在满足 condition 时把回合交给 to；default 边用于未点名的交接
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub default: bool,
}

impl HandoffEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: condition.into(),
            default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 未设置时为第一个 Agent
    #[serde(default)]
    pub entry_agent: Option<String>,
    pub agents: Vec<AgentDefinition>,
    #[serde(default)]
    pub handoffs: Vec<HandoffEdge>,
}

impl TeamDefinition {
    pub fn new(name: impl Into<String>, agents: Vec<AgentDefinition>) -> Self {
        Self {
            name: name.into(),
            description: None,
            entry_agent: None,
            agents,
            handoffs: Vec::new(),
        }
    }

    pub fn with_handoff(mut self, edge: HandoffEdge) -> Self {
        self.handoffs.push(edge);
        self
    }

    pub fn from_toml_str(s: &str, origin: &str) -> Result<Self, TeamError> {
        let team: TeamDefinition = toml::from_str(s).map_err(|e| TeamError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        team.validate()?;
        Ok(team)
    }

    /// 结构校验：Agent 非空且不重名、入口存在、边引用已知 Agent、每个 Agent 至多一条默认边
    pub fn validate(&self) -> Result<(), TeamError> {
        let invalid = |message: String| TeamError::Invalid {
            team: self.name.clone(),
            message,
        };
        if self.agents.is_empty() {
            return Err(invalid("team has no agents".into()));
        }
        let mut names = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(invalid("agent with empty name".into()));
            }
            if !names.insert(agent.name.as_str()) {
                return Err(invalid(format!("duplicate agent '{}'", agent.name)));
            }
        }
        if let Some(entry) = &self.entry_agent {
            if !names.contains(entry.as_str()) {
                return Err(invalid(format!("entry agent '{}' is not defined", entry)));
            }
        }
        let mut defaults = HashSet::new();
        for edge in &self.handoffs {
            for end in [&edge.from, &edge.to] {
                if !names.contains(end.as_str()) {
                    return Err(invalid(format!(
                        "handoff {} -> {} references unknown agent '{}'",
                        edge.from, edge.to, end
                    )));
                }
            }
            if edge.from == edge.to {
                return Err(invalid(format!(
                    "handoff {} -> {} loops back to itself",
                    edge.from, edge.to
                )));
            }
            if edge.default && !defaults.insert(edge.from.as_str()) {
                return Err(invalid(format!(
                    "agent '{}' has more than one default handoff",
                    edge.from
                )));
            }
        }
        Ok(())
    }

    pub fn entry_agent(&self) -> &str {
        self.entry_agent
            .as_deref()
            .or_else(|| self.agents.first().map(|a| a.name.as_str()))
            .unwrap_or_default()
    }

    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    pub fn is_single_agent(&self) -> bool {
        self.agents.len() == 1
    }

    pub fn edges_from<'a>(&'a self, agent: &'a str) -> impl Iterator<Item = &'a HandoffEdge> + 'a {
        self.handoffs.iter().filter(move |e| e.from == agent)
    }

    pub fn default_edge<'a>(&'a self, agent: &'a str) -> Option<&'a HandoffEdge> {
        self.edges_from(agent).find(|e| e.default)
    }
}
