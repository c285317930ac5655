//! 工具权限策略
//!
//! 每个 Agent 有一个允许集合；未声明的 Agent 使用 "default" 集合。
//! 集合条目可以是工具名、工具声明的权限标签，或通配 `*`。

use std::collections::HashMap;

use crate::team::TeamDefinition;
use crate::tools::Tool;

#[derive(Debug, Clone, Default)]
pub struct ToolPermissions {
    default_set: Vec<String>,
    per_agent: HashMap<String, Vec<String>>,
}

impl ToolPermissions {
    pub fn new(default_set: Vec<String>) -> Self {
        Self {
            default_set,
            per_agent: HashMap::new(),
        }
    }

    /// 以团队定义填充：声明了 allowed_tools 的 Agent 使用自己的集合（可以为空）
    pub fn for_team(team: &TeamDefinition, default_set: Vec<String>) -> Self {
        let mut permissions = Self::new(default_set);
        for agent in &team.agents {
            if let Some(allowed) = &agent.allowed_tools {
                permissions.set_agent(&agent.name, allowed.clone());
            }
        }
        permissions
    }

    pub fn set_agent(&mut self, agent: &str, allowed: Vec<String>) {
        self.per_agent.insert(agent.to_string(), allowed);
    }

    /// 该 Agent 的允许条目
    pub fn allowed_entries(&self, agent: &str) -> &[String] {
        self.per_agent
            .get(agent)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_set)
    }

    pub fn is_permitted(&self, agent: &str, tool: &dyn Tool) -> bool {
        self.allowed_entries(agent)
            .iter()
            .any(|entry| entry == "*" || entry == tool.name() || entry == tool.permission())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    #[test]
    fn test_default_set_applies_to_undeclared_agents() {
        let permissions = ToolPermissions::new(vec!["echo".into()]);
        assert!(permissions.is_permitted("anyone", &EchoTool));
    }

    #[test]
    fn test_empty_set_denies_everything() {
        let mut permissions = ToolPermissions::new(vec!["*".into()]);
        permissions.set_agent("locked", Vec::new());
        assert!(!permissions.is_permitted("locked", &EchoTool));
        assert!(permissions.is_permitted("other", &EchoTool));
    }

    #[test]
    fn test_label_and_wildcard_match() {
        let mut permissions = ToolPermissions::new(Vec::new());
        permissions.set_agent("reader", vec!["read_only".into()]);
        permissions.set_agent("admin", vec!["*".into()]);
        assert!(permissions.is_permitted("reader", &EchoTool));
        assert!(permissions.is_permitted("admin", &EchoTool));
        assert!(!permissions.is_permitted("nobody", &EchoTool));
    }
}
