//! resolve_linkedin_location：地点名称 -> LinkedIn 地点 ID

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::registry::Tool;
use crate::tools::schema::parameters_schema_for;
use crate::tools::unipile::UnipileClient;
use crate::tools::ToolResult;

pub const LOCATION_TOOL: &str = "resolve_linkedin_location";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LocationArgs {
    /// City or region to resolve, e.g. "Toronto" or "GTA"
    pub location_name: String,
}

pub struct ResolveLocationTool {
    client: Arc<UnipileClient>,
}

impl ResolveLocationTool {
    pub fn new(client: Arc<UnipileClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ResolveLocationTool {
    fn name(&self) -> &str {
        LOCATION_TOOL
    }

    fn description(&self) -> &str {
        "Resolve a city or region name to LinkedIn location ids (top 3 matches)."
    }

    fn aliases(&self) -> &[&'static str] {
        &["resolve"]
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<LocationArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, AgentError> {
        let args: LocationArgs = serde_json::from_value(args)
            .map_err(|e| AgentError::ToolExecution(format!("invalid arguments for {LOCATION_TOOL}: {e}")))?;
        self.client.resolve_location(&args.location_name).await
    }
}
