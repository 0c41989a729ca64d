//! 工具调用：原生（模型 function calling）或从文本中恢复

use serde_json::{Map, Value};

/// 调用来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// 模型通过 tool_calls 字段正式发起
    Native,
    /// 从模型文本中的伪调用恢复而来
    Recovered,
}

/// 一次待执行的工具调用
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub provenance: Provenance,
}

impl ToolInvocation {
    pub fn recovered(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            provenance: Provenance::Recovered,
        }
    }

    /// 原生调用：arguments 为模型给出的 JSON 文本，解析失败或非对象时视为空参数
    pub fn native(tool_name: impl Into<String>, arguments_json: &str) -> Self {
        let arguments = match serde_json::from_str::<Value>(arguments_json) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            tool_name: tool_name.into(),
            arguments,
            provenance: Provenance::Native,
        }
    }

    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }

    pub fn arguments_json(&self) -> String {
        self.arguments_value().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_parses_arguments() {
        let inv = ToolInvocation::native("search_linkedin", r#"{"keywords":"\"Rust\""}"#);
        assert_eq!(inv.provenance, Provenance::Native);
        assert_eq!(inv.arguments["keywords"], "\"Rust\"");
    }

    #[test]
    fn test_native_malformed_arguments_become_empty() {
        let inv = ToolInvocation::native("search_linkedin", "not json");
        assert!(inv.arguments.is_empty());
        assert_eq!(inv.arguments_json(), "{}");
    }
}
