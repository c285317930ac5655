//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 默认模型: deepseek-chat；其他模型经 `[llm].model` 或 `DEEPSEEK_MODEL` 指定

use crate::brain::OpenAiBrain;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端；model 未指定时读 `DEEPSEEK_MODEL`，再退回 deepseek-chat
pub fn create_deepseek_brain(model: Option<&str>, api_key: &str) -> OpenAiBrain {
    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiBrain::new(Some(DEEPSEEK_BASE_URL), &model, api_key)
}
