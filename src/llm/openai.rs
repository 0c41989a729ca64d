//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；默认用于 Gemini 的 OpenAI 兼容层。
//! 请求体由内部消息的线上格式直接构造（消息本身已是 OpenAI 结构），
//! 响应中的 tool_calls 也按线上格式读回，避免在多个类型体系之间逐字段搬运。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::CreateChatCompletionRequest;
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::llm::{LlmClient, LlmError, ModelReply, TokenStream, ToolSchema};
use crate::session::{Message, ToolCall};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
            body["tool_choice"] = json!("auto");
        }
        if stream {
            body["stream"] = json!(true);
        }
        serde_json::from_value(body).map_err(|e| LlmError::Malformed(format!("request: {e}")))
    }
}

/// 单条消息的请求格式；空的 tool_calls 列表不发送给供应商
fn wire_message(m: &Message) -> Value {
    let mut v = serde_json::to_value(m).unwrap_or_else(|_| json!({"role": m.role.as_str(), "content": m.content}));
    if m.tool_calls.as_ref().is_some_and(|c| c.is_empty()) {
        if let Some(obj) = v.as_object_mut() {
            obj.remove("tool_calls");
        }
    }
    v
}

/// 从响应消息的 JSON 形式中读出 content 与 function 类型的工具调用
fn parse_reply(message: &Value) -> Result<ModelReply, LlmError> {
    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();
    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
        for call in calls {
            let kind = call.get("type").and_then(|t| t.as_str()).unwrap_or("function");
            if kind != "function" {
                tracing::warn!(kind, "ignoring non-function tool call");
                continue;
            }
            let parsed: ToolCall = serde_json::from_value(call.clone())
                .map_err(|e| LlmError::Malformed(format!("tool_call: {e}")))?;
            tool_calls.push(parsed);
        }
    }
    Ok(ModelReply { content, tool_calls })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<ModelReply, LlmError> {
        let request = self.build_request(messages, tools, false)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Provider(e.to_string()))?;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage.add(
                usage.prompt_tokens as u64,
                usage.completion_tokens as u64,
            );
        }

        let choice = response
            .choices
            .first()
            .ok_or_else(|| LlmError::Malformed("no choices in response".to_string()))?;
        let message = serde_json::to_value(&choice.message)
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        parse_reply(&message)
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let request = self.build_request(messages, &[], true)?;
        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| LlmError::Provider(e.to_string()))?;

        let tokens = stream.filter_map(|item| async move {
            match item {
                Ok(chunk) => {
                    let text: String = chunk
                        .choices
                        .iter()
                        .filter_map(|c| c.delta.content.clone())
                        .collect();
                    (!text.is_empty()).then_some(Ok(text))
                }
                Err(e) => Some(Err(LlmError::Provider(e.to_string()))),
            }
        });
        Ok(Box::pin(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_accumulates() {
        let client = OpenAiClient::new(None, "gpt-4o-mini", Some("sk-test"));
        client.usage.add(120, 30);
        client.usage.add(80, 20);
        assert_eq!(client.token_usage(), (200, 50, 250));
    }

    #[test]
    fn test_parse_reply_with_tool_calls() {
        let message = json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [
                {"id": "call_a", "type": "function", "function": {"name": "search_linkedin", "arguments": "{\"keywords\":\"Rust\"}"}}
            ]
        });
        let reply = parse_reply(&message).unwrap();
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls, vec![ToolCall::new("call_a", "search_linkedin", "{\"keywords\":\"Rust\"}")]);
    }

    #[test]
    fn test_parse_reply_text_only() {
        let reply = parse_reply(&json!({"role": "assistant", "content": "Which city?"})).unwrap();
        assert_eq!(reply, ModelReply::text("Which city?"));
    }

    #[test]
    fn test_wire_message_drops_empty_tool_calls() {
        let m = Message::assistant_with_tool_calls("ok", vec![]);
        let v = wire_message(&m);
        assert!(v.get("tool_calls").is_none());
        assert_eq!(v["role"], "assistant");
    }
}
