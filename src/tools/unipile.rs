//! Unipile LinkedIn API 客户端
//!
//! 封装 recruiter 人才搜索、地点参数解析、接口文档抓取三个 HTTP 调用，
//! 并把搜索结果精简为候选人档案（控制进入模型上下文的 token 数）。

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::tools::result::{
    ApiSpec, Candidate, CandidatePage, CertificationEntry, EducationEntry, ExperienceEntry, LocationMatch,
    LocationMatches, SearchInfo, ToolResult,
};

pub const DEFAULT_DSN: &str = "https://api1.unipile.com:13200";
pub const DEFAULT_LOCATION_ID: &str = "100025096";
pub const DEFAULT_SPEC_URL: &str = "https://developer.unipile.com/reference/linkedincontroller_search.md";
pub const MUST_HAVE: &str = "MUST_HAVE";

const MISSING_CONFIG: &str =
    "Missing configuration. Please set LINKEDIN_ACCOUNT_ID, UNIPILE_DSN, and UNIPILE_API_KEY";

/// Unipile 连接与检索参数
#[derive(Debug, Clone)]
pub struct UnipileSettings {
    pub dsn: String,
    pub api_key: Option<String>,
    pub account_id: Option<String>,
    pub default_location_id: String,
    pub default_limit: u32,
    pub max_limit: u32,
    pub spec_url: String,
    pub request_timeout_secs: u64,
    pub spec_timeout_secs: u64,
}

impl Default for UnipileSettings {
    fn default() -> Self {
        Self {
            dsn: DEFAULT_DSN.to_string(),
            api_key: None,
            account_id: None,
            default_location_id: DEFAULT_LOCATION_ID.to_string(),
            default_limit: 20,
            max_limit: 50,
            spec_url: DEFAULT_SPEC_URL.to_string(),
            request_timeout_secs: 30,
            spec_timeout_secs: 10,
        }
    }
}

impl UnipileSettings {
    /// 实际使用的条数：缺省取默认值，并截断到上限
    pub fn effective_limit(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}

struct Credentials<'a> {
    dsn: &'a str,
    api_key: &'a str,
    account_id: &'a str,
}

/// Unipile HTTP 客户端（reqwest），三个工具共享同一实例
#[derive(Debug, Clone)]
pub struct UnipileClient {
    http: Client,
    settings: UnipileSettings,
}

impl UnipileClient {
    pub fn new(settings: UnipileSettings) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| AgentError::Configuration(format!("http client: {e}")))?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &UnipileSettings {
        &self.settings
    }

    fn credentials(&self) -> Result<Credentials<'_>, AgentError> {
        let s = &self.settings;
        match (s.dsn.trim(), s.api_key.as_deref(), s.account_id.as_deref()) {
            (dsn, Some(key), Some(account)) if !dsn.is_empty() && !key.is_empty() && !account.is_empty() => {
                Ok(Credentials {
                    dsn: dsn.trim_end_matches('/'),
                    api_key: key,
                    account_id: account,
                })
            }
            _ => Err(AgentError::Configuration(MISSING_CONFIG.to_string())),
        }
    }

    /// recruiter 人才搜索；body 为已规范化的检索条件（不含 limit）
    pub async fn search_people(&self, mut body: Value, limit: Option<u32>) -> Result<ToolResult, AgentError> {
        let creds = self.credentials()?;
        let limit = self.settings.effective_limit(limit);
        if let Some(obj) = body.as_object_mut() {
            obj.remove("limit");
            obj.insert("api".to_string(), json!("recruiter"));
            obj.insert("category".to_string(), json!("people"));
            let has_location = obj
                .get("location")
                .map(|l| !l.is_null() && l.as_array().map(|a| !a.is_empty()).unwrap_or(true))
                .unwrap_or(false);
            if !has_location {
                obj.insert(
                    "location".to_string(),
                    json!([{ "id": self.settings.default_location_id, "priority": MUST_HAVE }]),
                );
            }
        }

        let url = format!("{}/api/v1/linkedin/search", creds.dsn);
        tracing::info!(limit, "unipile search");
        let response = self
            .http
            .post(&url)
            .header("X-API-KEY", creds.api_key)
            .query(&[("account_id", creds.account_id.to_string()), ("limit", limit.to_string())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("An error occurred: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("An error occurred: {e}")))?;
        if !status.is_success() {
            return Ok(http_error(status.as_u16(), &text));
        }
        let data: Value = serde_json::from_str(&text)
            .map_err(|e| AgentError::ToolExecution(format!("An error occurred: {e}")))?;
        Ok(condense_search_response(&data))
    }

    /// 地点名称 -> LinkedIn 地点 ID，最多返回 3 个匹配
    pub async fn resolve_location(&self, location_name: &str) -> Result<ToolResult, AgentError> {
        let creds = self.credentials()?;
        let keywords = normalize_location_name(location_name);
        let url = format!("{}/api/v1/linkedin/search/parameters", creds.dsn);
        let response = self
            .http
            .get(&url)
            .header("X-API-KEY", creds.api_key)
            .query(&[
                ("account_id", creds.account_id),
                ("api", "linkedin"),
                ("type", "LOCATION"),
                ("keywords", keywords.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("Location resolution failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(ToolResult::error(format!(
                "Location resolution failed: HTTP Error {}",
                status.as_u16()
            )));
        }
        let data: Value = response
            .json()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("Location resolution failed: {e}")))?;
        Ok(ToolResult::Locations(location_matches(&data, 3)))
    }

    /// 抓取 Unipile 搜索接口文档；失败时返回错误结果并提示模型使用已知结构
    pub async fn fetch_spec(&self) -> ToolResult {
        let fetched = async {
            let resp = self
                .http
                .get(&self.settings.spec_url)
                .timeout(Duration::from_secs(self.settings.spec_timeout_secs))
                .send()
                .await?
                .error_for_status()?;
            Ok::<String, reqwest::Error>(resp.text().await?)
        }
        .await;
        match fetched {
            Ok(spec) => ToolResult::ApiSpec(ApiSpec {
                success: true,
                spec,
                message: "API specification fetched successfully".to_string(),
            }),
            Err(e) => ToolResult::error_with_details(
                format!("Failed to fetch API spec: {e}"),
                json!("Using cached knowledge of Unipile API structure"),
            ),
        }
    }
}

/// 地点别名（GTA -> Greater Toronto Area）
pub fn normalize_location_name(name: &str) -> String {
    if name.to_uppercase().contains("GTA") {
        "Greater Toronto Area".to_string()
    } else {
        name.trim().to_string()
    }
}

fn http_error(status: u16, body: &str) -> ToolResult {
    let details = serde_json::from_str::<Value>(body).unwrap_or_else(|_| Value::String(body.to_string()));
    ToolResult::error_with_details(format!("HTTP Error {status}"), details)
}

/// 从参数搜索响应中取前 n 个地点
pub fn location_matches(data: &Value, n: usize) -> LocationMatches {
    let matches = data
        .get("items")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let id = match item.get("id")? {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        _ => return None,
                    };
                    let title = item
                        .get("title")
                        .or_else(|| item.get("name"))
                        .and_then(|t| t.as_str())
                        .map(String::from);
                    Some(LocationMatch { id, title })
                })
                .take(n)
                .collect()
        })
        .unwrap_or_default();
    LocationMatches { matches }
}

/// 精简搜索响应：items（或 matches）逐条转为 Candidate；未知结构返回摘要
pub fn condense_search_response(data: &Value) -> ToolResult {
    let raw = data.get("items").or_else(|| data.get("matches"));
    let items: &[Value] = match raw {
        Some(Value::Array(items)) => items.as_slice(),
        None => &[],
        Some(_) => {
            return ToolResult::SearchInfo(SearchInfo {
                info: "Search completed".to_string(),
                count: data.get("count").and_then(|c| c.as_u64()).unwrap_or(0),
                message: "Raw data too large to display debug.".to_string(),
            })
        }
    };
    let candidates: Vec<Candidate> = items.iter().map(condense_candidate).collect();
    ToolResult::Candidates(CandidatePage {
        count: candidates.len(),
        candidates,
    })
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn names(list: Option<&Value>) -> Vec<String> {
    list.and_then(|l| l.as_array())
        .map(|items| items.iter().filter_map(|x| str_field(x, "name")).collect())
        .unwrap_or_default()
}

/// `start-end`，缺失结束年份记为 Present
fn date_range(entry: &Value) -> Option<String> {
    let date = entry.get("date")?;
    let year = |part: &str| date.get(part).and_then(|p| p.get("year")).and_then(|y| match y {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    });
    Some(format!(
        "{}-{}",
        year("start").unwrap_or_default(),
        year("end").unwrap_or_else(|| "Present".to_string())
    ))
}

fn entries<T>(list: Option<&Value>, build: impl Fn(&Value) -> T) -> Vec<T> {
    list.and_then(|l| l.as_array())
        .map(|items| items.iter().map(build).collect())
        .unwrap_or_default()
}

/// 单条搜索结果 -> Candidate（profile 字段优先，缺失时退回条目本身）
pub fn condense_candidate(item: &Value) -> Candidate {
    let profile = item.get("profile").filter(|p| p.is_object()).unwrap_or(item);

    let experience = entries(item.get("work_experience"), |x| ExperienceEntry {
        role: str_field(x, "role"),
        company: str_field(x, "company"),
        description: str_field(x, "description"),
        location: str_field(x, "location"),
        date_range: date_range(x),
    });
    let education = entries(item.get("education"), |x| EducationEntry {
        school: str_field(x, "school"),
        degree: str_field(x, "degree"),
        field_of_study: str_field(x, "field_of_study"),
        description: str_field(x, "description"),
        date_range: date_range(x),
    });
    let certifications = entries(item.get("certifications"), |x| CertificationEntry {
        name: str_field(x, "name"),
        authority: str_field(x, "authority"),
        date_range: date_range(x),
    });

    let current_role = experience
        .first()
        .map(|e| {
            format!(
                "{} at {}",
                e.role.as_deref().unwrap_or("Unknown"),
                e.company.as_deref().unwrap_or("Unknown")
            )
        })
        .unwrap_or_else(|| "Unknown".to_string());

    Candidate {
        name: str_field(profile, "name").unwrap_or_else(|| "Unknown".to_string()),
        headline: str_field(profile, "headline").unwrap_or_default(),
        location: str_field(profile, "location").unwrap_or_default(),
        public_identifier: str_field(profile, "public_identifier").unwrap_or_default(),
        summary: str_field(profile, "summary").unwrap_or_default(),
        skills: names(item.get("skills")),
        languages: names(profile.get("languages")),
        experience,
        education,
        certifications,
        current_role,
    }
}
