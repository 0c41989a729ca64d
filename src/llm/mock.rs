//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! - MockLlmClient：回显最后一条用户消息，不请求工具
//! - ScriptedLlmClient：按脚本依次返回文本 / 工具调用 / 故障，并记录每次收到的历史

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, LlmError, ModelReply, TokenStream, ToolSchema};
use crate::session::{Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], _tools: &[ToolSchema]) -> Result<ModelReply, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(ModelReply::text(format!("Echo from Mock: {last_user}")))
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let reply = self.complete(messages, &[]).await?;
        Ok(Box::pin(stream::iter(vec![Ok(reply.content)])))
    }
}

/// 脚本中的一步
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Reply(ModelReply),
    /// 流式调用时按给定分片逐个返回
    Tokens(Vec<String>),
    /// 先返回若干分片，再在流中途失败
    TokensThenFail(Vec<String>, LlmError),
    Fail(LlmError),
}

/// 脚本化客户端：complete / complete_stream 共用同一脚本队列；
/// 队列耗尽后重复最后一步（便于模拟「永远请求工具」的模型）
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<ScriptedReply>>,
    last: Mutex<Option<ScriptedReply>>,
    seen: Mutex<Vec<Vec<Message>>>,
    latency: Option<Duration>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// 每次调用前先等待一段时间（用于并发测试）
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 追加脚本
    pub fn push(&self, reply: ScriptedReply) {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).push_back(reply);
    }

    /// 每次调用收到的完整历史
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn next(&self, messages: &[Message]) -> ScriptedReply {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        let popped = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match popped {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last
                .clone()
                .unwrap_or_else(|| ScriptedReply::Fail(LlmError::Provider("script exhausted".to_string()))),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message], _tools: &[ToolSchema]) -> Result<ModelReply, LlmError> {
        match self.next(messages).await {
            ScriptedReply::Reply(reply) => Ok(reply),
            ScriptedReply::Tokens(tokens) => Ok(ModelReply::text(tokens.concat())),
            ScriptedReply::TokensThenFail(_, e) | ScriptedReply::Fail(e) => Err(e),
        }
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        let items: Vec<Result<String, LlmError>> = match self.next(messages).await {
            ScriptedReply::Reply(reply) => vec![Ok(reply.content)],
            ScriptedReply::Tokens(tokens) => tokens.into_iter().map(Ok).collect(),
            ScriptedReply::TokensThenFail(tokens, e) => {
                tokens.into_iter().map(Ok).chain(std::iter::once(Err(e))).collect()
            }
            ScriptedReply::Fail(e) => return Err(e),
        };
        Ok(Box::pin(stream::iter(items)))
    }
}
