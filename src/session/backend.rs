//! 会话持久化后端
//!
//! 以 (owner_id, session_id) 为键，对整条消息列表做原子的 get / create / replace。
//! 内存后端用于测试与默认运行，SQLite 后端见 `sqlite.rs`。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::AgentError;
use crate::session::{Message, Role};

const TITLE_CHARS: usize = 50;

/// 一个会话：有序消息列表 + 归属用户 + 列表展示元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub owner_id: String,
    pub messages: Vec<Message>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, system: Message) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            messages: vec![system],
            title: "New Chat".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 标题取第一条用户消息（截断），没有则为 New Chat
    pub fn refresh_title(&mut self) {
        self.title = self
            .messages
            .iter()
            .find(|m| m.role == Role::User && !m.is_recovery_note())
            .map(|m| {
                let text = m.content.trim();
                if text.chars().count() > TITLE_CHARS {
                    format!("{}...", text.chars().take(TITLE_CHARS).collect::<String>())
                } else {
                    text.to_string()
                }
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "New Chat".to_string());
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }
}

/// 会话列表项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.clone(),
            title: s.title.clone(),
            updated_at: s.updated_at,
        }
    }
}

/// 持久化后端接口
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn get(&self, owner_id: &str, session_id: &str) -> Result<Option<Session>, AgentError>;

    /// 键不存在时写入并返回该会话；已存在时原样返回已有会话
    async fn create(&self, session: Session) -> Result<Session, AgentError>;

    /// 整体替换（键必须已存在）
    async fn replace(&self, session: &Session) -> Result<(), AgentError>;

    /// 用户的会话列表，最近更新在前
    async fn list(&self, owner_id: &str) -> Result<Vec<SessionSummary>, AgentError>;
}

/// 内存后端
#[derive(Default)]
pub struct InMemoryBackend {
    sessions: RwLock<HashMap<(String, String), Session>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(owner_id: &str, session_id: &str) -> (String, String) {
    (owner_id.to_string(), session_id.to_string())
}

#[async_trait]
impl SessionBackend for InMemoryBackend {
    async fn get(&self, owner_id: &str, session_id: &str) -> Result<Option<Session>, AgentError> {
        Ok(self.sessions.read().await.get(&key(owner_id, session_id)).cloned())
    }

    async fn create(&self, session: Session) -> Result<Session, AgentError> {
        let mut guard = self.sessions.write().await;
        let entry = guard
            .entry(key(&session.owner_id, &session.id))
            .or_insert(session);
        Ok(entry.clone())
    }

    async fn replace(&self, session: &Session) -> Result<(), AgentError> {
        let mut guard = self.sessions.write().await;
        match guard.get_mut(&key(&session.owner_id, &session.id)) {
            Some(slot) => {
                *slot = session.clone();
                Ok(())
            }
            None => Err(AgentError::SessionNotFound(session.id.clone())),
        }
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<SessionSummary>, AgentError> {
        let guard = self.sessions.read().await;
        let mut out: Vec<SessionSummary> = guard
            .values()
            .filter(|s| s.owner_id == owner_id)
            .map(SessionSummary::from)
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_is_if_absent() {
        let backend = InMemoryBackend::new();
        let first = backend.create(Session::new("s1", "alice", Message::system("a"))).await.unwrap();
        let second = backend.create(Session::new("s1", "alice", Message::system("b"))).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.system_prompt(), Some("a"));
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_by_owner() {
        let backend = InMemoryBackend::new();
        backend.create(Session::new("s1", "alice", Message::system("a"))).await.unwrap();
        assert!(backend.get("bob", "s1").await.unwrap().is_none());
        assert!(backend.list("bob").await.unwrap().is_empty());
        let missing = Session::new("s1", "bob", Message::system("x"));
        assert!(matches!(backend.replace(&missing).await, Err(AgentError::SessionNotFound(_))));
    }

    #[test]
    fn test_title_from_first_user_message() {
        let mut s = Session::new("s1", "alice", Message::system("sys"));
        s.refresh_title();
        assert_eq!(s.title, "New Chat");
        s.messages.push(Message::user("Find senior Rust engineers in Toronto with fintech background please"));
        s.refresh_title();
        assert_eq!(s.title, "Find senior Rust engineers in Toronto with fintech...");
    }
}
