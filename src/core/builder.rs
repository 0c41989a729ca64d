//! 编排器构建：由 AppConfig 统一创建 LLM、工具注册表、提示词组装器与会话存储
//!
//! 命令行与 Web 两种入口共用同一套初始化逻辑。

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator, OrchestratorSettings};
use crate::llm::{create_gemini_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::prompt::PromptComposer;
use crate::session::{InMemoryBackend, SessionBackend, SessionStore};
use crate::tools::{recruiter_registry, ToolExecutor, ToolRegistry};

/// 根据配置选择 LLM 后端（Gemini OpenAI 兼容端点 / 任意 OpenAI 兼容端点 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let key = cfg.llm.api_key.as_deref();
    match (provider.as_str(), key) {
        ("mock", _) | (_, None) => {
            tracing::warn!("No API key set or provider is mock, using Mock LLM");
            Arc::new(MockLlmClient)
        }
        ("openai", Some(key)) => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, Some(key)))
        }
        (_, Some(key)) => {
            if let Some(base) = cfg.llm.base_url.as_deref() {
                tracing::info!("Using Gemini model {} via {}", cfg.llm.model, base);
                Arc::new(OpenAiClient::new(Some(base), &cfg.llm.model, Some(key)))
            } else {
                tracing::info!("Using Gemini LLM ({})", cfg.llm.model);
                Arc::new(create_gemini_client(Some(&cfg.llm.model), Some(key)))
            }
        }
    }
}

#[cfg(feature = "async-sqlite")]
async fn open_persistent(path: &Path) -> Result<Arc<dyn SessionBackend>, AgentError> {
    tracing::info!("Session store: sqlite {}", path.display());
    let backend = crate::session::SqliteBackend::new(path).await?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "async-sqlite"))]
async fn open_persistent(path: &Path) -> Result<Arc<dyn SessionBackend>, AgentError> {
    tracing::warn!(
        "session.db_path {} is set but the async-sqlite feature is off, using memory store",
        path.display()
    );
    Ok(Arc::new(InMemoryBackend::new()))
}

/// 编排器构建器
pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    registry: Option<ToolRegistry>,
    backend: Option<Arc<dyn SessionBackend>>,
    composer: Option<PromptComposer>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            registry: None,
            backend: None,
            composer: None,
        }
    }

    /// 指定 LLM 客户端（测试时注入脚本客户端）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 会话后端：配置了 db_path 时使用持久化存储，否则内存
    async fn build_backend(&self) -> Result<Arc<dyn SessionBackend>, AgentError> {
        match &self.config.session.db_path {
            Some(path) => open_persistent(path).await,
            None => Ok(Arc::new(InMemoryBackend::new())),
        }
    }

    pub async fn build(self) -> Result<Arc<Orchestrator>, AgentError> {
        let backend = match &self.backend {
            Some(b) => b.clone(),
            None => self.build_backend().await?,
        };
        let composer = match self.composer {
            Some(c) => c,
            None => PromptComposer::load(self.config.app.prompt_path.as_deref())?,
        };
        composer.validate()?;

        let registry = match self.registry {
            Some(r) => r,
            None => recruiter_registry(self.config.unipile.settings())?,
        };
        let llm = match self.llm {
            Some(l) => l,
            None => create_llm_from_config(&self.config),
        };
        let executor = Arc::new(ToolExecutor::new(registry, self.config.tools.tool_timeout_secs));
        let settings = OrchestratorSettings::from_config(&self.config);
        tracing::info!(
            tools = ?executor.tool_names(),
            max_tool_rounds = settings.max_tool_rounds,
            "orchestrator ready"
        );
        Ok(Arc::new(Orchestrator::new(
            llm,
            executor,
            composer,
            Arc::new(SessionStore::new(backend)),
            settings,
        )))
    }
}
