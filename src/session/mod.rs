//! 会话：数据模型、文件存储、任务管理器与关键词分词

pub mod manager;
pub mod store;
pub mod tokenizer;
pub mod types;

pub use manager::{SimilarSession, TaskManager};
pub use store::SessionStore;
pub use types::{new_session_id, SessionStatus, TaskSession, Turn, DEFAULT_AGENT};
