//! search_linkedin：Unipile recruiter 人才搜索

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::tools::registry::Tool;
use crate::tools::schema::parameters_schema_for;
use crate::tools::unipile::{UnipileClient, MUST_HAVE};
use crate::tools::ToolResult;

pub const SEARCH_TOOL: &str = "search_linkedin";

fn must_have() -> String {
    MUST_HAVE.to_string()
}

/// 地点过滤条件（LinkedIn 地点 ID + 优先级）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocationFilter {
    /// LinkedIn location id, e.g. "100025096"
    pub id: String,
    /// MUST_HAVE / CAN_HAVE / DOESNT_HAVE
    #[serde(default = "must_have")]
    pub priority: String,
}

/// search_linkedin 参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// Boolean keyword query; quote every term, e.g. "\"Java\" AND \"Developer\""
    pub keywords: String,
    /// City or region name; resolved to a LinkedIn location id before searching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    /// Explicit location filters (takes precedence over location_name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Vec<LocationFilter>>,
    /// Number of candidates to return (default 20, max 50)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// 其余 recruiter 过滤条件原样透传
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

pub struct SearchLinkedinTool {
    client: Arc<UnipileClient>,
}

impl SearchLinkedinTool {
    pub fn new(client: Arc<UnipileClient>) -> Self {
        Self { client }
    }

    /// 把 location_name 解析为地点过滤；解析失败时交给默认地点
    async fn location_filter(&self, args: &SearchArgs) -> Option<Vec<LocationFilter>> {
        if let Some(loc) = args.location.as_ref().filter(|l| !l.is_empty()) {
            return Some(loc.clone());
        }
        let name = args.location_name.as_deref()?.trim();
        if name.is_empty() {
            return None;
        }
        match self.client.resolve_location(name).await {
            Ok(ToolResult::Locations(found)) => found.matches.into_iter().next().map(|m| {
                tracing::debug!(location = name, id = %m.id, "location resolved for search");
                vec![LocationFilter {
                    id: m.id,
                    priority: must_have(),
                }]
            }),
            Ok(other) => {
                tracing::warn!(location = name, result = %other.to_json_string(), "location not resolved, using default");
                None
            }
            Err(e) => {
                tracing::warn!(location = name, error = %e, "location not resolved, using default");
                None
            }
        }
    }
}

#[async_trait]
impl Tool for SearchLinkedinTool {
    fn name(&self) -> &str {
        SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search LinkedIn Recruiter for people. Returns condensed candidate profiles \
         (name, headline, location, skills, experience, education, certifications)."
    }

    fn aliases(&self) -> &[&'static str] {
        &["search"]
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<SearchArgs>()
    }

    fn is_primary_search(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, AgentError> {
        let args: SearchArgs = serde_json::from_value(args)
            .map_err(|e| AgentError::ToolExecution(format!("invalid arguments for {SEARCH_TOOL}: {e}")))?;
        if args.keywords.trim().is_empty() {
            return Err(AgentError::ToolExecution("keywords must not be empty".to_string()));
        }
        let location = self.location_filter(&args).await;

        let mut body = args.extra.clone();
        body.insert("keywords".to_string(), Value::String(args.keywords.clone()));
        if let Some(loc) = location {
            body.insert("location".to_string(), serde_json::to_value(loc)?);
        }
        self.client.search_people(Value::Object(body), args.limit).await
    }
}
