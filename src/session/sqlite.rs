//! SQLite 会话后端（sqlx）
//!
//! 每个会话一行，消息列表以 JSON 存于 history 列；主键 (user_id, id)。

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::core::AgentError;
use crate::session::backend::{Session, SessionBackend, SessionSummary};
use crate::session::Message;

pub struct SqliteBackend {
    pool: sqlx::sqlite::SqlitePool,
}

fn storage(e: sqlx::Error) -> AgentError {
    AgentError::Storage(e.to_string())
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, AgentError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AgentError::Storage(format!("bad timestamp {s}: {e}")))
}

impl SqliteBackend {
    /// 打开（必要时创建）数据库文件并建表
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(storage)?;
        let backend = Self { pool };
        backend.init_tables().await?;
        Ok(backend)
    }

    async fn init_tables(&self) -> Result<(), AgentError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chat_sessions (
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                history TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_sessions_updated ON chat_sessions(user_id, updated_at)")
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, AgentError> {
        let history: String = row.get("history");
        let messages: Vec<Message> = serde_json::from_str(&history)?;
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");
        Ok(Session {
            id: row.get("id"),
            owner_id: row.get("user_id"),
            messages,
            title: row.get("title"),
            created_at: parse_time(&created_at)?,
            updated_at: parse_time(&updated_at)?,
        })
    }
}

#[async_trait]
impl SessionBackend for SqliteBackend {
    async fn get(&self, owner_id: &str, session_id: &str) -> Result<Option<Session>, AgentError> {
        let row = sqlx::query(
            "SELECT id, user_id, history, title, created_at, updated_at
             FROM chat_sessions WHERE user_id = ? AND id = ?",
        )
        .bind(owner_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn create(&self, session: Session) -> Result<Session, AgentError> {
        let history = serde_json::to_string(&session.messages)?;
        sqlx::query(
            "INSERT OR IGNORE INTO chat_sessions (id, user_id, history, title, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.owner_id)
        .bind(&history)
        .bind(&session.title)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        self.get(&session.owner_id, &session.id)
            .await?
            .ok_or_else(|| AgentError::Storage(format!("session {} vanished after insert", session.id)))
    }

    async fn replace(&self, session: &Session) -> Result<(), AgentError> {
        let history = serde_json::to_string(&session.messages)?;
        let result = sqlx::query(
            "UPDATE chat_sessions SET history = ?, title = ?, updated_at = ?
             WHERE user_id = ? AND id = ?",
        )
        .bind(&history)
        .bind(&session.title)
        .bind(session.updated_at.to_rfc3339())
        .bind(&session.owner_id)
        .bind(&session.id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(AgentError::SessionNotFound(session.id.clone()));
        }
        Ok(())
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<SessionSummary>, AgentError> {
        let rows = sqlx::query(
            "SELECT id, title, updated_at FROM chat_sessions WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                let updated_at: String = row.get("updated_at");
                Ok(SessionSummary {
                    id: row.get("id"),
                    title: row.get("title"),
                    updated_at: parse_time(&updated_at)?,
                })
            })
            .collect()
    }
}
