//! fetch_unipile_spec：抓取 Unipile 搜索接口文档（markdown）

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::registry::Tool;
use crate::tools::unipile::UnipileClient;
use crate::tools::ToolResult;

pub const SPEC_TOOL: &str = "fetch_unipile_spec";

pub struct FetchSpecTool {
    client: Arc<UnipileClient>,
}

impl FetchSpecTool {
    pub fn new(client: Arc<UnipileClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for FetchSpecTool {
    fn name(&self) -> &str {
        SPEC_TOOL
    }

    fn description(&self) -> &str {
        "Fetch the Unipile LinkedIn search API documentation. Use only when unsure about filter syntax."
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, AgentError> {
        Ok(self.client.fetch_spec().await)
    }
}
