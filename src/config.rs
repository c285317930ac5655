//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub tools: ToolsSection,
    pub events: EventsSection,
    pub metrics: MetricsSection,
    pub storage: StorageSection,
}

/// [app] 段：数据目录、默认团队文件、默认轮数预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 会话 JSON 存放在 `<data_dir>/sessions`
    pub data_dir: PathBuf,
    /// `run` 未指定 --team 时使用的团队 TOML
    pub default_team: Option<PathBuf>,
    pub default_max_rounds: u32,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".hive"),
            default_team: None,
            default_max_rounds: 10,
        }
    }
}

impl AppSection {
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    pub provider: String,
    /// 未设置时使用各后端的默认模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次 think 调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// 路由策略
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    #[default]
    Heuristic,
    Brain,
}

/// [orchestrator] 段：路由与轮次重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub routing: RoutingMode,
    pub completion_phrases: Vec<String>,
    pub handoff_phrases: Vec<String>,
    /// Brain/超时类错误的单轮重试次数
    pub max_turn_retries: u32,
    /// 整轮（think + 工具）超时（秒）
    pub turn_timeout_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            routing: RoutingMode::Heuristic,
            completion_phrases: default_completion_phrases(),
            handoff_phrases: default_handoff_phrases(),
            max_turn_retries: 2,
            turn_timeout_secs: 300,
        }
    }
}

pub fn default_completion_phrases() -> Vec<String> {
    [
        "task is complete",
        "is now complete",
        "task complete",
        "task completed",
        "finished",
        "done",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_handoff_phrases() -> Vec<String> {
    [
        "hand off to",
        "hand this off to",
        "handoff to",
        "transfer to",
        "delegate to",
        "pass this to",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// [tools] 段：工具超时与默认权限集
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 未声明 allowed_tools 的 Agent 使用的 "default" 权限集
    pub default_permissions: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            default_permissions: vec!["echo".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    pub max_history: usize,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            max_history: crate::events::DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub max_series_len: usize,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            max_series_len: crate::metrics::DEFAULT_MAX_SERIES_LEN,
        }
    }
}

/// [storage] 段：会话写盘超时（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub write_timeout_secs: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            write_timeout_secs: 10,
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if !path.exists() {
            return Err(config::ConfigError::NotFound(path.display().to_string()));
        }
        builder = builder.add_source(config::File::from(path.clone()));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("orchestrator.completion_phrases")
            .with_list_parse_key("orchestrator.handoff_phrases")
            .with_list_parse_key("tools.default_permissions")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
