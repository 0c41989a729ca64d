//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / aliases / parameters_schema / execute），
//! 由 ToolRegistry 按名注册与分发；执行故障在 dispatch 内被转换为错误结果，不会中断回合。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::ToolSchema;
use crate::tools::ToolResult;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（原生 function calling 使用的名字）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 模型在文本中可能使用的别名（如 `search`），用于幻觉调用恢复
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 是否为主检索工具（仅凭 `keywords = "..."` 赋值即可推断调用）
    fn is_primary_search(&self) -> bool {
        false
    }

    /// 执行工具；Err 会在 dispatch 中降级为 `{error: ...}` 结果
    async fn execute(&self, args: Value) -> Result<ToolResult, AgentError>;
}

/// 工具注册表：按注册顺序保存 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名重复注册返回 DuplicateTool
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        self.order.push(name.clone());
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 按注册顺序返回工具
    pub fn tools(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.order.iter().filter_map(|n| self.tools.get(n))
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// 供模型使用的工具声明（按注册顺序）
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// 分发一次调用：未知工具返回 UnknownTool；工具自身的故障转为错误结果
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<ToolResult, AgentError> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        match tool.execute(args).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool execution fault");
                Ok(ToolResult::error(e.to_string()))
            }
        }
    }
}
