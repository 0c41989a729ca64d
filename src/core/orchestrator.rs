//! 编排器：一次对话回合的状态机
//!
//! AwaitingModel -> (ToolsRequested | Recovered | ReadyToStream)；工具轮结束后回到 AwaitingModel；
//! ReadyToStream -> Done。整个回合持有会话锁；每个工具轮在全部结果产生后整体提交，
//! 模型故障时未完成的轮次不会写入存储。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::Instrument;

use crate::config::AppConfig;
use crate::core::stream::FragmentSink;
use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError, ModelReply};
use crate::prompt::{PromptComposer, RuntimeFlags};
use crate::recovery::{self, ToolCatalog};
use crate::session::{pending_tool_calls, AppendOutcome, Message, Role, SessionLock, SessionStore};
use crate::tools::{ToolExecutor, ToolInvocation, ToolResult};

/// 编排参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_tool_rounds: usize,
    pub fragment_chars: usize,
    pub fragment_buffer: usize,
    pub stream_narration: bool,
    pub request_timeout: Duration,
    pub stream_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_tool_rounds: cfg.orchestrator.max_tool_rounds,
            fragment_chars: cfg.orchestrator.fragment_chars,
            fragment_buffer: cfg.orchestrator.fragment_buffer.max(1),
            stream_narration: cfg.orchestrator.stream_narration,
            request_timeout: Duration::from_secs(cfg.llm.timeouts.request),
            stream_timeout: Duration::from_secs(cfg.llm.timeouts.stream),
        }
    }
}

/// 一次对话请求
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// 为空时新建会话
    pub session_id: Option<String>,
    pub owner_id: String,
    /// 本轮新增的用户消息（工具轮与回复只由编排器写入）
    pub messages: Vec<Message>,
    pub flags: RuntimeFlags,
}

impl ChatRequest {
    pub fn user(owner_id: impl Into<String>, session_id: Option<String>, text: impl Into<String>) -> Self {
        Self {
            session_id,
            owner_id: owner_id.into(),
            messages: vec![Message::user(text)],
            flags: RuntimeFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: RuntimeFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// 回合如何结束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    Completed,
    /// 工具轮数达到上限
    LoopLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub session_id: String,
    pub content: String,
    pub tool_rounds: usize,
    pub end: TurnEnd,
}

/// start_turn 的返回：片段接收端 + 回合结果
pub struct TurnHandle {
    pub session_id: String,
    pub fragments: mpsc::Receiver<String>,
    pub done: JoinHandle<Result<TurnOutcome, AgentError>>,
}

impl TurnHandle {
    /// 收集全部片段并等待回合结束
    pub async fn collect(mut self) -> (String, Result<TurnOutcome, AgentError>) {
        let mut text = String::new();
        while let Some(fragment) = self.fragments.recv().await {
            text.push_str(&fragment);
        }
        let outcome = match self.done.await {
            Ok(r) => r,
            Err(e) => Err(AgentError::Storage(format!("turn task failed: {e}"))),
        };
        (text, outcome)
    }
}

enum TurnState {
    AwaitingModel,
    ToolsRequested(ModelReply),
    Recovered { raw: String, invocation: ToolInvocation },
    Narrating,
    ReadyToStream(String, TurnEnd),
    Done(String, TurnEnd),
}

pub fn loop_limit_notice(rounds: usize) -> String {
    format!(
        "[Tool loop limit reached: stopped after {rounds} tool rounds without a final answer. \
         Please refine the request and try again.]"
    )
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    catalog: ToolCatalog,
    composer: PromptComposer,
    store: Arc<SessionStore>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        composer: PromptComposer,
        store: Arc<SessionStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let catalog = ToolCatalog::from_registry(executor.registry());
        Self {
            llm,
            executor,
            catalog,
            composer,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// 校验请求、组装提示词并在后台任务中运行回合；提示词模板不同步时直接返回错误
    pub fn start_turn(self: &Arc<Self>, request: ChatRequest) -> Result<TurnHandle, AgentError> {
        validate(&request)?;
        let system_prompt = self.composer.compose(&request.flags)?;
        let session_id = request
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let (tx, rx) = mpsc::channel(self.settings.fragment_buffer);
        let this = Arc::clone(self);
        let sid = session_id.clone();
        let span = tracing::info_span!("turn", session_id = %session_id, owner_id = %request.owner_id);
        let done = tokio::spawn(
            async move {
                let sink = FragmentSink::new(tx, this.settings.fragment_chars);
                this.run_turn(&sid, request, system_prompt, sink).await
            }
            .instrument(span),
        );
        Ok(TurnHandle {
            session_id,
            fragments: rx,
            done,
        })
    }

    /// 执行一个完整回合（调用方负责提供片段发送端）；任何错误都会以一个错误片段告知调用方
    pub async fn run_turn(
        &self,
        session_id: &str,
        request: ChatRequest,
        system_prompt: String,
        mut sink: FragmentSink,
    ) -> Result<TurnOutcome, AgentError> {
        match self.drive_turn(session_id, request, system_prompt, &mut sink).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, "turn aborted");
                sink.send_error(&e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn drive_turn(
        &self,
        session_id: &str,
        request: ChatRequest,
        system_prompt: String,
        sink: &mut FragmentSink,
    ) -> Result<TurnOutcome, AgentError> {
        let owner = request.owner_id.as_str();
        let lock = self.store.lock(session_id).await;
        self.store
            .create_if_absent(&lock, owner, Message::system(system_prompt.clone()))
            .await?;
        if self.store.replace_system(&lock, owner, &system_prompt).await? {
            tracing::debug!("system prompt refreshed");
        }

        if self.store.append_merge(&lock, owner, request.messages).await? == AppendOutcome::Duplicate {
            tracing::info!("resubmitted user message, answering the stored turn");
        }
        let mut history = self.store.get(&lock, owner).await?.messages;

        let mut rounds = 0usize;
        let mut state = TurnState::AwaitingModel;
        let (content, end) = loop {
            state = match state {
                TurnState::AwaitingModel => {
                    ensure_answered(&history)?;
                    if rounds >= self.settings.max_tool_rounds {
                        tracing::warn!(rounds, "tool loop limit reached");
                        TurnState::ReadyToStream(loop_limit_notice(rounds), TurnEnd::LoopLimit)
                    } else if rounds > 0 && self.settings.stream_narration {
                        TurnState::Narrating
                    } else {
                        self.classify(self.call_model(&history).await?)
                    }
                }
                TurnState::ToolsRequested(reply) => {
                    rounds += 1;
                    let round = self.run_native_round(reply).await;
                    self.store.append(&lock, owner, round.clone()).await?;
                    history.extend(round);
                    TurnState::AwaitingModel
                }
                TurnState::Recovered { raw, invocation } => {
                    rounds += 1;
                    let result = self.dispatch(&invocation).await;
                    let round = vec![
                        Message::assistant(raw),
                        Message::recovery_note(&invocation.tool_name, &result.to_json_string()),
                    ];
                    self.store.append(&lock, owner, round.clone()).await?;
                    history.extend(round);
                    TurnState::AwaitingModel
                }
                TurnState::Narrating => TurnState::Done(self.narrate(&history, sink).await?, TurnEnd::Completed),
                TurnState::ReadyToStream(text, end) => {
                    sink.send_chunked(&text).await;
                    TurnState::Done(text, end)
                }
                TurnState::Done(text, end) => break (text, end),
            };
        };

        self.persist_final(&lock, owner, &content).await?;
        let (_, _, total_tokens) = self.llm.token_usage();
        tracing::info!(
            rounds,
            fragments = sink.emitted(),
            caller_connected = sink.is_open(),
            total_tokens,
            "turn done"
        );
        Ok(TurnOutcome {
            session_id: session_id.to_string(),
            content,
            tool_rounds: rounds,
            end,
        })
    }

    fn classify(&self, reply: ModelReply) -> TurnState {
        if reply.has_tool_calls() {
            // 原生调用优先，同一回复里的文本不再扫描
            return TurnState::ToolsRequested(reply);
        }
        match recovery::recover(&reply.content, &self.catalog) {
            Some(invocation) => TurnState::Recovered {
                raw: reply.content,
                invocation,
            },
            None => TurnState::ReadyToStream(reply.content, TurnEnd::Completed),
        }
    }

    async fn call_model(&self, history: &[Message]) -> Result<ModelReply, LlmError> {
        let schemas = self.executor.schemas();
        let secs = self.settings.request_timeout.as_secs();
        match timeout(self.settings.request_timeout, self.llm.complete(history, &schemas)).await {
            Ok(r) => r,
            Err(_) => Err(LlmError::Timeout(secs)),
        }
    }

    /// 工具轮后的叙述：使用供应商流式接口、不带工具，逐 token 转发
    async fn narrate(&self, history: &[Message], sink: &mut FragmentSink) -> Result<String, LlmError> {
        let secs = self.settings.stream_timeout.as_secs();
        let mut stream = match timeout(self.settings.request_timeout, self.llm.complete_stream(history)).await {
            Ok(s) => s?,
            Err(_) => return Err(LlmError::Timeout(self.settings.request_timeout.as_secs())),
        };
        let mut text = String::new();
        loop {
            match timeout(self.settings.stream_timeout, stream.next()).await {
                Ok(Some(Ok(token))) => {
                    text.push_str(&token);
                    sink.send(token).await;
                }
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) => break,
                Err(_) => return Err(LlmError::Timeout(secs)),
            }
        }
        Ok(text)
    }

    /// 执行一轮原生调用；结果按调用顺序、以 tool_call_id 关联
    async fn run_native_round(&self, reply: ModelReply) -> Vec<Message> {
        let invocations: Vec<ToolInvocation> = reply
            .tool_calls
            .iter()
            .map(|c| ToolInvocation::native(&c.name, &c.arguments))
            .collect();
        let results = join_all(invocations.iter().map(|inv| self.dispatch(inv))).await;

        let mut round = Vec::with_capacity(reply.tool_calls.len() + 1);
        round.push(Message::assistant_with_tool_calls(reply.content, reply.tool_calls.clone()));
        for (call, result) in reply.tool_calls.iter().zip(results) {
            round.push(Message::tool_result(call.id.clone(), result.to_json_string()));
        }
        round
    }

    /// 分发调用；未知工具名转为错误结果
    async fn dispatch(&self, invocation: &ToolInvocation) -> ToolResult {
        match self.executor.execute(invocation).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %invocation.tool_name, error = %e, "dispatch failed");
                ToolResult::error(e.to_string())
            }
        }
    }

    async fn persist_final(&self, lock: &SessionLock, owner: &str, content: &str) -> Result<(), AgentError> {
        self.store.append(lock, owner, vec![Message::assistant(content)]).await
    }
}

/// 调用方只能提交用户消息：工具调用与工具结果由编排器成对写入，否则会话会留下未回应的调用
fn validate(request: &ChatRequest) -> Result<(), AgentError> {
    if request.owner_id.trim().is_empty() {
        return Err(AgentError::InvalidRequest("owner id is required".to_string()));
    }
    if let Some(m) = request
        .messages
        .iter()
        .find(|m| m.role != Role::User || m.tool_calls.is_some() || m.tool_call_id.is_some())
    {
        return Err(AgentError::InvalidRequest(format!(
            "only user messages may be submitted, got {:?}",
            m.role
        )));
    }
    match request.messages.last() {
        Some(m) if !m.content.trim().is_empty() => Ok(()),
        Some(_) => Err(AgentError::InvalidRequest("last message must be a non-empty user message".to_string())),
        None => Err(AgentError::InvalidRequest("messages must not be empty".to_string())),
    }
}

/// 历史中不允许存在未回应的工具调用
fn ensure_answered(history: &[Message]) -> Result<(), AgentError> {
    match pending_tool_calls(history) {
        Ok(pending) if pending.is_empty() => Ok(()),
        Ok(pending) => Err(AgentError::Storage(format!("unanswered tool calls in transcript: {pending:?}"))),
        Err(id) => Err(AgentError::Storage(format!("tool result without matching call: {id}"))),
    }
}
