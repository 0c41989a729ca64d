//! Agent 错误类型
//!
//! 工具与恢复层的故障会被转成数据（工具结果里的 error 字段）交给模型叙述；
//! 这里列出的是需要传播到回合边界的结构性错误。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 缺少外部凭据（Unipile DSN / API Key / 账号 ID 等）
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// Prompt 模板中找不到预期的步骤块（模板与组装逻辑不同步）
    #[error("Prompt template mismatch: expected block `{0}` not found")]
    TemplateMismatch(String),

    #[error("Model call failed: {0}")]
    ModelCall(#[from] LlmError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AgentError {
    /// 是否由调用方输入导致（HTTP 层映射为 4xx）
    pub fn is_caller_error(&self) -> bool {
        matches!(self, AgentError::SessionNotFound(_) | AgentError::InvalidRequest(_))
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Storage(format!("serialization: {e}"))
    }
}
