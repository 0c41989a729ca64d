//! Scout - 招聘检索对话智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 回合编排、流式片段输出、错误类型与构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）
//! - **observability**: tracing 初始化
//! - **prompt**: 系统提示词模板与按开关组装
//! - **recovery**: 从模型文本中恢复未以原生方式发出的工具调用
//! - **session**: 消息模型、会话存储与按会话加锁
//! - **tools**: 工具注册表、执行器与 LinkedIn 检索工具

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod prompt;
pub mod recovery;
pub mod session;
pub mod tools;
