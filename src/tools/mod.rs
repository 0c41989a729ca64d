//! 工具层：注册表、执行器、结果类型与 Unipile 检索工具

pub mod executor;
pub mod invocation;
pub mod location;
pub mod registry;
pub mod result;
pub mod schema;
pub mod search;
pub mod spec_fetch;
pub mod unipile;

use std::sync::Arc;

pub use executor::ToolExecutor;
pub use invocation::{Provenance, ToolInvocation};
pub use location::{ResolveLocationTool, LOCATION_TOOL};
pub use registry::{Tool, ToolRegistry};
pub use result::{Candidate, CandidatePage, LocationMatch, LocationMatches, ToolErrorPayload, ToolResult};
pub use schema::parameters_schema_for;
pub use search::{SearchArgs, SearchLinkedinTool, SEARCH_TOOL};
pub use spec_fetch::{FetchSpecTool, SPEC_TOOL};
pub use unipile::{UnipileClient, UnipileSettings};

use crate::core::AgentError;

/// 注册招聘检索的三个工具（共享同一个 Unipile 客户端）
pub fn recruiter_registry(settings: UnipileSettings) -> Result<ToolRegistry, AgentError> {
    let client = Arc::new(UnipileClient::new(settings)?);
    let mut registry = ToolRegistry::new();
    registry.register(SearchLinkedinTool::new(client.clone()))?;
    registry.register(ResolveLocationTool::new(client.clone()))?;
    registry.register(FetchSpecTool::new(client))?;
    Ok(registry)
}
