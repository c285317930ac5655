//! 从 Brain 文本输出中提取 JSON
//!
//! 支持 ```json ... ``` 代码块与裸 JSON；工具调用可以是单个对象、数组或 {"tool_calls": [...]}。

use serde_json::Value;

use crate::brain::ToolCall;

/// 提取文本中第一个 JSON 片段（```json 块优先，其次最外层 {...} 或 [...]）
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(block.trim());
    }

    let obj = trimmed.find('{').zip(trimmed.rfind('}'));
    let arr = trimmed.find('[').zip(trimmed.rfind(']'));
    let span = match (obj, arr) {
        (Some(o), Some(a)) => Some(if a.0 < o.0 { a } else { o }),
        (o, a) => o.or(a),
    };
    span.filter(|(s, e)| s < e).map(|(s, e)| &trimmed[s..=e])
}

fn calls_from_value(value: Value) -> Vec<ToolCall> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value::<ToolCall>(v).ok())
            .filter(|c| !c.tool.is_empty())
            .collect(),
        Value::Object(mut map) => {
            if let Some(inner) = map.remove("tool_calls") {
                return calls_from_value(inner);
            }
            serde_json::from_value::<ToolCall>(Value::Object(map))
                .ok()
                .filter(|c| !c.tool.is_empty())
                .into_iter()
                .collect()
        }
        _ => Vec::new(),
    }
}

/// 解析回复中的工具调用；无法解析时视为纯文本回复，返回空列表
pub fn parse_tool_calls(content: &str) -> Vec<ToolCall> {
    let Some(json) = extract_json(content) else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(json) {
        Ok(value) => calls_from_value(value),
        Err(e) => {
            tracing::debug!("reply contains non-JSON braces, treating as text: {}", e);
            Vec::new()
        }
    }
}
