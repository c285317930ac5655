//! 团队注册表
//!
//! 进程启动时构造一次，显式传给 Orchestrator / TaskManager；测试可各自构造互不干扰的实例。
//! 从 TOML 文件加载的团队按路径缓存。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::team::{TeamDefinition, TeamError};

#[derive(Debug, Default)]
pub struct TeamRegistry {
    teams: RwLock<HashMap<String, Arc<TeamDefinition>>>,
}

impl TeamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以任意 key（通常是团队名或文件路径）登记一个团队；校验失败则拒绝
    pub fn register(
        &self,
        key: impl Into<String>,
        team: TeamDefinition,
    ) -> Result<Arc<TeamDefinition>, TeamError> {
        team.validate()?;
        let team = Arc::new(team);
        self.teams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::clone(&team));
        Ok(team)
    }

    pub fn get(&self, key: &str) -> Option<Arc<TeamDefinition>> {
        self.teams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// 按 key 查找；未命中时把 key 当作 TOML 路径加载并缓存
    pub fn load(&self, path: &str) -> Result<Arc<TeamDefinition>, TeamError> {
        if let Some(team) = self.get(path) {
            return Ok(team);
        }
        let content = std::fs::read_to_string(Path::new(path)).map_err(|e| TeamError::Io {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        let team = TeamDefinition::from_toml_str(&content, path)?;
        tracing::info!(team = %team.name, path = %path, agents = team.agents.len(), "Team loaded");
        self.register(path, team)
    }

    pub fn len(&self) -> usize {
        self.teams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::AgentDefinition;

    #[test]
    fn test_register_and_get() {
        let registry = TeamRegistry::new();
        let team = TeamDefinition::new("solo", vec![AgentDefinition::new("a", "")]);
        registry.register("solo", team).unwrap();
        assert_eq!(registry.get("solo").unwrap().name, "solo");
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn test_load_from_file_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("team.toml");
        std::fs::write(
            &path,
            "name = \"pair\"\n[[agents]]\nname = \"a\"\n[[agents]]\nname = \"b\"\n",
        )
        .unwrap();
        let key = path.to_string_lossy().to_string();

        let registry = TeamRegistry::new();
        let first = registry.load(&key).unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = registry.load(&key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let registry = TeamRegistry::new();
        assert!(matches!(
            registry.load("/definitely/not/here.toml"),
            Err(TeamError::Io { .. })
        ));
    }
}
