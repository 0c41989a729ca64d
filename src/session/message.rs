//! 会话消息模型
//!
//! 与 OpenAI 兼容的消息结构（system / user / assistant / tool）。
//! 序列化约定：`tool_calls` / `tool_call_id` 的「缺省」与「存在（即使为空）」必须往返保持一致，
//! 因为 assistant 消息上 `tool_calls` 的存在本身就表示「本条消息请求了工具」。

use serde::{Deserialize, Deserializer, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// assistant 消息中的一次原生工具调用请求
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireToolCall", into = "WireToolCall")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// 原始 JSON 参数文本（模型给什么就存什么，不在此处解析）
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// 线上格式：`{"id": "...", "type": "function", "function": {"name": "...", "arguments": "..."}}`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<WireToolCall> for ToolCall {
    fn from(w: WireToolCall) -> Self {
        Self {
            id: w.id,
            name: w.function.name,
            arguments: w.function.arguments,
        }
    }
}

impl From<ToolCall> for WireToolCall {
    fn from(c: ToolCall) -> Self {
        Self {
            id: c.id,
            kind: function_kind(),
            function: WireFunction {
                name: c.name,
                arguments: c.arguments,
            },
        }
    }
}

/// 合成的恢复结果消息前缀
pub const RECOVERY_NOTE_PREFIX: &str = "SYSTEM: ";

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// 仅请求工具的 assistant 消息可以为空；`null` 反序列化为空串
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// 请求工具的 assistant 消息
    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// 回应某次工具调用的 tool 消息
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// 文本恢复出的工具调用结果：以 user 角色告知模型该调用是从其文本中截获的
    pub fn recovery_note(tool_name: &str, result_json: &str) -> Self {
        Self::user(format!(
            "{RECOVERY_NOTE_PREFIX}Manually intercepted tool {tool_name} from your text (it was not a native function call). RESULT: {result_json}"
        ))
    }

    pub fn is_recovery_note(&self) -> bool {
        self.role == Role::User && self.content.starts_with(RECOVERY_NOTE_PREFIX)
    }

    /// 是否为请求了工具的 assistant 消息
    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// 按 (role, content) 判断是否为同一条用户可见消息（用于去重）
    pub fn same_turn_as(&self, other: &Message) -> bool {
        self.role == other.role && self.content == other.content
    }
}

/// 返回尚未被 tool 消息回应的工具调用 id（按请求顺序）
///
/// 下一次调用模型之前该列表必须为空；tool 消息若找不到待回应的同 id 调用则视为不一致，
/// 以 `Err(id)` 返回。不同轮次复用同一个 id 是允许的。
pub fn pending_tool_calls(messages: &[Message]) -> Result<Vec<String>, String> {
    let mut pending: Vec<String> = Vec::new();
    for m in messages {
        match m.role {
            Role::Assistant => {
                if let Some(calls) = &m.tool_calls {
                    pending.extend(calls.iter().map(|c| c.id.clone()));
                }
            }
            Role::Tool => {
                let id = m.tool_call_id.clone().unwrap_or_default();
                match pending.iter().position(|p| p == &id) {
                    Some(idx) => {
                        pending.remove(idx);
                    }
                    None => return Err(id),
                }
            }
            _ => {}
        }
    }
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Vec<Message> {
        vec![
            Message::system("You are a recruiter assistant."),
            Message::user("Find Java developers in Toronto"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new(
                    "call_1",
                    "search_linkedin",
                    r#"{"keywords":"\"Java\" AND \"Developer\""}"#,
                )],
            ),
            Message::tool_result("call_1", r#"{"count":0,"candidates":[]}"#),
            Message::assistant("No candidates matched."),
        ]
    }

    #[test]
    fn test_session_round_trip() {
        let messages = sample_session();
        let json = serde_json::to_string(&messages).unwrap();
        let back: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, messages);
    }

    #[test]
    fn test_absent_and_empty_tool_calls_stay_distinct() {
        let absent = Message::assistant("hi");
        let empty = Message::assistant_with_tool_calls("hi", vec![]);

        let absent_json = serde_json::to_value(&absent).unwrap();
        assert!(absent_json.get("tool_calls").is_none());
        assert!(absent_json.get("tool_call_id").is_none());

        let empty_json = serde_json::to_value(&empty).unwrap();
        assert_eq!(empty_json["tool_calls"], serde_json::json!([]));

        let absent_back: Message = serde_json::from_value(absent_json).unwrap();
        let empty_back: Message = serde_json::from_value(empty_json).unwrap();
        assert_eq!(absent_back.tool_calls, None);
        assert_eq!(empty_back.tool_calls, Some(vec![]));
        assert!(!empty_back.requests_tools());
    }

    #[test]
    fn test_tool_call_wire_format() {
        let call = ToolCall::new("call_9", "resolve_linkedin_location", r#"{"location_name":"Paris"}"#);
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "resolve_linkedin_location");
        assert_eq!(v["function"]["arguments"], r#"{"location_name":"Paris"}"#);
    }

    #[test]
    fn test_null_content_decodes_as_empty() {
        let m: Message = serde_json::from_str(
            r#"{"role":"assistant","content":null,"tool_calls":[{"id":"a","type":"function","function":{"name":"x","arguments":"{}"}}]}"#,
        )
        .unwrap();
        assert_eq!(m.content, "");
        assert!(m.requests_tools());
    }

    #[test]
    fn test_pending_tool_calls() {
        let mut messages = sample_session();
        assert_eq!(pending_tool_calls(&messages).unwrap(), Vec::<String>::new());

        messages.truncate(3);
        assert_eq!(pending_tool_calls(&messages).unwrap(), vec!["call_1".to_string()]);

        messages.push(Message::tool_result("call_unknown", "{}"));
        assert_eq!(pending_tool_calls(&messages), Err("call_unknown".to_string()));
    }

    #[test]
    fn test_pending_tool_calls_reused_id_across_rounds() {
        let mut messages = sample_session();
        messages.truncate(4);
        messages.push(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("call_1", "search_linkedin", "{}")],
        ));
        assert_eq!(pending_tool_calls(&messages).unwrap(), vec!["call_1".to_string()]);
        messages.push(Message::tool_result("call_1", "{}"));
        assert!(pending_tool_calls(&messages).unwrap().is_empty());
        // 同一调用被回应两次
        messages.push(Message::tool_result("call_1", "{}"));
        assert_eq!(pending_tool_calls(&messages), Err("call_1".to_string()));
    }
}
