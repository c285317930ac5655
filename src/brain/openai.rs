//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 工具清单以 JSON Schema 形式拼入 system prompt，工具调用从回复文本中解析。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::brain::{
    parse_tool_calls, Brain, BrainError, BrainResponse, Message, Role, TokenUsage, ToolSpec,
};
use crate::tools::tool_call_schema_json;

/// 把工具清单渲染成 system prompt 附加段
pub fn render_tool_instructions(tools: &[ToolSpec]) -> String {
    let listing = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
    format!(
        "## Available tools\n{listing}\n\n\
         To call tools, reply with a JSON object matching this schema \
         (or {{\"tool_calls\": [...]}} for several calls):\n{}",
        tool_call_schema_json()
    )
}

pub struct OpenAiBrain {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiBrain {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
    ) -> Result<Vec<ChatCompletionRequestMessage>, BrainError> {
        let tool_block = tools
            .filter(|t| !t.is_empty())
            .map(render_tool_instructions);
        let mut injected = false;
        let mut out = Vec::with_capacity(messages.len() + 1);

        for m in messages {
            let msg = match m.role {
                Role::System => {
                    let content = match (&tool_block, injected) {
                        (Some(block), false) => {
                            injected = true;
                            format!("{}\n\n{}", m.content, block)
                        }
                        _ => m.content.clone(),
                    };
                    ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(content)
                            .build()
                            .map_err(|e| BrainError::Api(e.to_string()))?,
                    )
                }
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| BrainError::Api(e.to_string()))?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| BrainError::Api(e.to_string()))?,
                ),
            };
            out.push(msg);
        }

        if let (Some(block), false) = (tool_block, injected) {
            out.insert(
                0,
                ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(block)
                        .build()
                        .map_err(|e| BrainError::Api(e.to_string()))?,
                ),
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl Brain for OpenAiBrain {
    async fn think(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
    ) -> Result<BrainResponse, BrainError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages, tools)?)
            .build()
            .map_err(|e| BrainError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| BrainError::Transport(e.to_string()))?;

        let usage = response
            .usage
            .as_ref()
            .map(|u| TokenUsage::new(u.prompt_tokens as u64, u.completion_tokens as u64))
            .unwrap_or_default();

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or(BrainError::EmptyResponse)?;

        let tool_calls = if tools.is_some() {
            parse_tool_calls(&content)
        } else {
            Vec::new()
        };

        Ok(BrainResponse {
            content,
            tool_calls,
            usage,
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}
