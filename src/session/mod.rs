//! 会话：消息模型、持久化后端与带会话锁的存储

pub mod backend;
pub mod message;
#[cfg(feature = "async-sqlite")]
pub mod sqlite;
pub mod store;

pub use backend::{InMemoryBackend, Session, SessionBackend, SessionSummary};
pub use message::{pending_tool_calls, Message, Role, ToolCall, RECOVERY_NOTE_PREFIX};
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteBackend;
pub use store::{AppendOutcome, ReplayMessage, SessionLock, SessionStore};
