//! Brain 层：LLM 能力抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod parse;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_brain, DEEPSEEK_CHAT};
pub use mock::{MockBrain, ScriptedBrain};
pub use openai::{render_tool_instructions, OpenAiBrain};
pub use parse::{extract_json, parse_tool_calls};
pub use traits::{Brain, BrainError, BrainResponse, Message, Role, TokenUsage, ToolCall, ToolSpec};

use crate::config::AppConfig;
use crate::core::AgentError;

/// 某个 provider 需要的 API Key 环境变量（按优先级）
pub fn required_api_keys(provider: &str) -> &'static [&'static str] {
    match provider {
        "openai" => &["OPENAI_API_KEY"],
        "deepseek" => &["DEEPSEEK_API_KEY", "OPENAI_API_KEY"],
        _ => &[],
    }
}

/// 启动时检查 API Key：所选 provider 的候选变量全部缺失即为致命错误（mock 不需要）
pub fn check_api_keys(cfg: &AppConfig) -> Result<(), AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    let keys = required_api_keys(&provider);
    if keys.is_empty() || keys.iter().any(|k| std::env::var(k).is_ok()) {
        return Ok(());
    }
    Err(AgentError::MissingApiKey(keys.join(" or ")))
}

fn first_key(provider: &str) -> Option<String> {
    required_api_keys(provider)
        .iter()
        .find_map(|k| std::env::var(k).ok())
}

/// 根据配置创建 Brain；未知 provider 为配置错误
pub fn create_brain_from_config(cfg: &AppConfig) -> Result<Arc<dyn Brain>, AgentError> {
    check_api_keys(cfg)?;
    let provider = cfg.llm.provider.to_lowercase();
    match provider.as_str() {
        "mock" => {
            tracing::warn!("Using Mock brain, replies are canned");
            Ok(Arc::new(MockBrain))
        }
        "deepseek" => {
            let key = first_key(&provider).unwrap_or_default();
            let brain = create_deepseek_brain(cfg.llm.model.as_deref(), &key);
            tracing::info!("Using DeepSeek brain ({})", brain.model());
            Ok(Arc::new(brain))
        }
        "openai" => {
            let key = first_key(&provider).unwrap_or_default();
            let model = cfg.llm.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
            tracing::info!("Using OpenAI brain ({})", model);
            Ok(Arc::new(OpenAiBrain::new(
                cfg.llm.base_url.as_deref(),
                &model,
                &key,
            )))
        }
        other => Err(AgentError::ConfigError(format!(
            "unknown llm provider '{}' (expected openai, deepseek or mock)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_needs_no_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        assert!(check_api_keys(&cfg).is_ok());
        assert!(create_brain_from_config(&cfg).is_ok());
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "carrier-pigeon".into();
        assert!(matches!(
            create_brain_from_config(&cfg),
            Err(AgentError::ConfigError(_))
        ));
    }
}
