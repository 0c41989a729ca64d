//! 核心编排层：错误类型、片段输出、回合状态机与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod stream;

pub use builder::{create_llm_from_config, AgentBuilder};
pub use error::AgentError;
pub use orchestrator::{
    loop_limit_notice, ChatRequest, Orchestrator, OrchestratorSettings, TurnEnd, TurnHandle, TurnOutcome,
};
pub use stream::{FragmentSink, SYSTEM_ERROR_PREFIX};
