//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(invocation) 在超时内调用 registry.dispatch；
//! 超时转为错误结果，未知工具仍以 UnknownTool 返回；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolSchema;
use crate::tools::{Provenance, ToolInvocation, ToolRegistry, ToolResult};

/// 工具执行器：对每次调用施加超时并记录审计日志
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一次调用；超时返回错误结果（不是 Err），只有未知工具返回 Err
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult, AgentError> {
        let start = Instant::now();
        let tool_name = invocation.tool_name.as_str();
        let result = timeout(
            self.timeout,
            self.registry.dispatch(tool_name, invocation.arguments_value()),
        )
        .await;

        let outcome = match &result {
            Ok(Ok(r)) if r.is_error() => "error",
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "unknown_tool",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "provenance": match invocation.provenance {
                Provenance::Native => "native",
                Provenance::Recovered => "recovered",
            },
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&invocation.arguments_json()),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(r) => r,
            Err(_) => Ok(ToolResult::error(
                AgentError::ToolTimeout(format!("{} after {}s", tool_name, self.timeout.as_secs())).to_string(),
            )),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

fn args_preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
