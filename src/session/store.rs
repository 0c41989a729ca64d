//! 会话存储：后端之上的会话级互斥与幂等追加
//!
//! 同一 session_id 的读写都必须先拿到 `SessionLock`（锁表中的 tokio Mutex），
//! 操作方法以锁为参数，保证调用方在锁内；不同会话之间互不阻塞。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::core::AgentError;
use crate::session::backend::{InMemoryBackend, Session, SessionBackend, SessionSummary};
use crate::session::{Message, Role};

/// 锁表超过该规模时清理无人持有的条目
const LOCK_TABLE_PRUNE_AT: usize = 1024;

/// 某个会话的独占锁；析构即释放
pub struct SessionLock {
    session_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl SessionLock {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// append_merge 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended(usize),
    /// 与最近的消息重复（重复提交），整批跳过
    Duplicate,
}

/// 回放给前端的消息（不含 system / tool / 合成恢复消息）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMessage {
    pub role: Role,
    pub content: String,
}

pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 获取会话锁；同一会话的第二个调用者会在此等待
    pub async fn lock(&self, session_id: &str) -> SessionLock {
        let mutex = {
            let mut table = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if table.len() >= LOCK_TABLE_PRUNE_AT {
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            table
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        SessionLock {
            session_id: session_id.to_string(),
            _guard: mutex.lock_owned().await,
        }
    }

    pub async fn get(&self, lock: &SessionLock, owner_id: &str) -> Result<Session, AgentError> {
        self.backend
            .get(owner_id, lock.session_id())
            .await?
            .ok_or_else(|| AgentError::SessionNotFound(lock.session_id().to_string()))
    }

    /// 会话不存在时以给定 system 消息创建
    pub async fn create_if_absent(
        &self,
        lock: &SessionLock,
        owner_id: &str,
        system: Message,
    ) -> Result<Session, AgentError> {
        if let Some(existing) = self.backend.get(owner_id, lock.session_id()).await? {
            return Ok(existing);
        }
        tracing::info!(session_id = lock.session_id(), owner_id, "session created");
        self.backend
            .create(Session::new(lock.session_id(), owner_id, system))
            .await
    }

    /// 追加消息；新批次末尾与最近一条存储消息 (role, content) 相同时视为重复提交，整批跳过。
    /// 已有回复之后再说一遍同样的话是新的一轮，照常追加。
    /// 带工具关联（tool_calls / tool_call_id）的消息以 id 区分，不参与去重。
    pub async fn append_merge(
        &self,
        lock: &SessionLock,
        owner_id: &str,
        incoming: Vec<Message>,
    ) -> Result<AppendOutcome, AgentError> {
        let Some(tail) = incoming.last() else {
            return Ok(AppendOutcome::Appended(0));
        };
        let session = self.get(lock, owner_id).await?;

        let linked = tail.tool_calls.is_some() || tail.tool_call_id.is_some();
        if !linked {
            let last = session.messages.last();
            if last
                .filter(|m| m.tool_calls.is_none() && m.tool_call_id.is_none())
                .is_some_and(|m| m.same_turn_as(tail))
            {
                tracing::debug!(session_id = lock.session_id(), "duplicate resubmission skipped");
                return Ok(AppendOutcome::Duplicate);
            }
        }

        let n = incoming.len();
        Self::commit(&*self.backend, session, incoming).await?;
        Ok(AppendOutcome::Appended(n))
    }

    /// 无去重的追加：编排器提交自己生成的整轮消息时使用
    pub async fn append(&self, lock: &SessionLock, owner_id: &str, messages: Vec<Message>) -> Result<(), AgentError> {
        if messages.is_empty() {
            return Ok(());
        }
        let session = self.get(lock, owner_id).await?;
        Self::commit(&*self.backend, session, messages).await
    }

    async fn commit(backend: &dyn SessionBackend, mut session: Session, messages: Vec<Message>) -> Result<(), AgentError> {
        session.messages.extend(messages);
        session.refresh_title();
        session.updated_at = Utc::now();
        backend.replace(&session).await
    }

    /// 整体替换 messages[0]；内容未变化时不写入，返回是否发生替换
    pub async fn replace_system(
        &self,
        lock: &SessionLock,
        owner_id: &str,
        content: &str,
    ) -> Result<bool, AgentError> {
        let mut session = self.get(lock, owner_id).await?;
        match session.messages.first_mut() {
            Some(first) if first.role == Role::System => {
                if first.content == content {
                    return Ok(false);
                }
                first.content = content.to_string();
            }
            _ => session.messages.insert(0, Message::system(content)),
        }
        session.updated_at = Utc::now();
        self.backend.replace(&session).await?;
        Ok(true)
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<SessionSummary>, AgentError> {
        self.backend.list(owner_id).await
    }

    /// 前端回放：去掉 system、tool 与合成的恢复消息，以及只请求工具的空 assistant 消息
    pub async fn replay(&self, lock: &SessionLock, owner_id: &str) -> Result<Vec<ReplayMessage>, AgentError> {
        let session = self.get(lock, owner_id).await?;
        Ok(session
            .messages
            .into_iter()
            .filter(|m| !matches!(m.role, Role::System | Role::Tool))
            .filter(|m| !m.is_recovery_note())
            .filter(|m| !(m.requests_tools() && m.content.trim().is_empty()))
            .map(|m| ReplayMessage {
                role: m.role,
                content: m.content,
            })
            .collect())
    }

    /// 加锁读取一次（不在回合内时使用）
    pub async fn snapshot(&self, session_id: &str, owner_id: &str) -> Result<Session, AgentError> {
        let lock = self.lock(session_id).await;
        self.get(&lock, owner_id).await
    }
}
