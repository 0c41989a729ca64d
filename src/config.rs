//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCOUT__*` 覆盖（双下划线表示嵌套，如 `SCOUT__LLM__MODEL=gemini-2.5-flash`）。
//! 凭据另外支持常规环境变量：GEMINI_API_KEY / OPENAI_API_KEY、UNIPILE_DSN、UNIPILE_API_KEY、LINKEDIN_ACCOUNT_ID。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::GEMINI_FLASH;
use crate::tools::unipile::{UnipileSettings, DEFAULT_DSN, DEFAULT_LOCATION_ID, DEFAULT_SPEC_URL};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub unipile: UnipileSection,
    pub orchestrator: OrchestratorSection,
    pub session: SessionSection,
    pub server: ServerSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 系统提示词文件，未设置时查找 config/prompts/system.md
    pub prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "scout".to_string(),
            prompt_path: None,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// gemini / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: GEMINI_FLASH.to_string(),
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 120,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self { tool_timeout_secs: 30 }
    }
}

/// [unipile] 段：凭据缺省时回退到 UNIPILE_DSN / UNIPILE_API_KEY / LINKEDIN_ACCOUNT_ID
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UnipileSection {
    pub dsn: Option<String>,
    pub api_key: Option<String>,
    pub account_id: Option<String>,
    pub default_location_id: String,
    pub default_limit: u32,
    pub max_limit: u32,
    pub spec_url: String,
    pub request_timeout_secs: u64,
    pub spec_timeout_secs: u64,
}

impl Default for UnipileSection {
    fn default() -> Self {
        Self {
            dsn: None,
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

impl UnipileSection {
    pub fn settings(&self) -> UnipileSettings {
        UnipileSettings {
            dsn: self.dsn.clone().unwrap_or_else(|| DEFAULT_DSN.to_string()),
            api_key: self.api_key.clone(),
            account_id: self.account_id.clone(),
            default_location_id: self.default_location_id.clone(),
            default_limit: self.default_limit,
            max_limit: self.max_limit,
            spec_url: self.spec_url.clone(),
            request_timeout_secs: self.request_timeout_secs,
            spec_timeout_secs: self.spec_timeout_secs,
        }
    }
}

/// [orchestrator] 段：工具轮数上限与流式输出参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_tool_rounds: usize,
    /// 每个输出片段的字符数
    pub fragment_chars: usize,
    /// 片段通道容量（满时生产端等待）
    pub fragment_buffer: usize,
    /// 工具轮之后的叙述调用是否直接使用供应商流式接口
    pub stream_narration: bool,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_tool_rounds: 5,
            fragment_chars: 24,
            fragment_buffer: 32,
            stream_narration: false,
        }
    }
}

/// [session] 段：未设置 db_path 时使用内存存储
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub db_path: Option<PathBuf>,
}

/// [server] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// 用常规环境变量补齐未配置的凭据
    pub fn with_env_fallbacks(mut self) -> Self {
        if self.llm.api_key.is_none() {
            self.llm.api_key = match self.llm.provider.to_lowercase().as_str() {
                "openai" => env_nonempty("OPENAI_API_KEY"),
                _ => env_nonempty("GEMINI_API_KEY").or_else(|| env_nonempty("OPENAI_API_KEY")),
            };
        }
        if self.unipile.dsn.is_none() {
            self.unipile.dsn = env_nonempty("UNIPILE_DSN");
        }
        if self.unipile.api_key.is_none() {
            self.unipile.api_key = env_nonempty("UNIPILE_API_KEY");
        }
        if self.unipile.account_id.is_none() {
            self.unipile.account_id = env_nonempty("LINKEDIN_ACCOUNT_ID");
        }
        self
    }
}

/// 从 config 目录加载配置，环境变量 SCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 SCOUT__*（双下划线表示嵌套键）
/// 4. 用常规环境变量补齐凭据
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCOUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let cfg: AppConfig = c.try_deserialize()?;
    Ok(cfg.with_env_fallbacks())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_tool_rounds, 5);
        assert!(!cfg.orchestrator.stream_narration);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.unipile.settings().dsn, DEFAULT_DSN);
        assert_eq!(cfg.llm.model, GEMINI_FLASH);
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scout.toml");
        std::fs::write(
            &path,
            r#"
[orchestrator]
max_tool_rounds = 2

[unipile]
account_id = "acc-1"
default_limit = 10
"#,
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.orchestrator.max_tool_rounds, 2);
        // 未写出的键保持默认
        assert_eq!(cfg.orchestrator.fragment_buffer, 32);
        assert_eq!(cfg.unipile.account_id.as_deref(), Some("acc-1"));
        assert_eq!(cfg.unipile.settings().default_limit, 10);
        assert_eq!(cfg.unipile.settings().max_limit, 50);
    }
}
